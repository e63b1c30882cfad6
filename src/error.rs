//! 에러 타입 정의

use thiserror::Error;

/// RFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("유효하지 않은 인자: {0}")]
    InvalidArgument(String),

    #[error("전송할 세그먼트 없음")]
    EmptyTransfer,

    #[error("ACK 채널 종료: send_base={send_base}, total={total}")]
    AckChannelClosed { send_base: usize, total: usize },

    #[error("태스크 실패: {0}")]
    TaskFailed(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::TaskFailed(e.to_string())
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
