//! # RFT (Reliable File Transfer)
//!
//! UDP 위에서 동작하는 Go-Back-N 기반 순서 보장 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **고정 20바이트 헤더**: TCP 모양의 헤더, 헤더 필드 + 길이만 덮는 체크섬
//! - **Go-Back-N 송신**: 슬라이딩 윈도우, 타임아웃 시 윈도우 전체 재전송
//! - **적응형 타임아웃**: Jacobson/Karels EWMA 기반 RTT 추정
//! - **순서 수신**: 기대 시퀀스만 수락, 순서 밖 세그먼트는 폐기
//! - **ACK 백채널**: 별도 TCP 스트림으로 텍스트 ACK 전달
//!
//! ```text
//!  File ─▶ ChunkSplitter ─▶ Segment codec ─▶ Sender ──UDP──▶ Receiver ─▶ sink
//!                                              ▲                 │
//!                                              └────TCP (ACK)────┘
//! ```

pub mod chunk;
pub mod config;
pub mod error;
pub mod event_log;
pub mod message;
pub mod receiver;
pub mod rtt;
pub mod segment;
pub mod sender;
pub mod seq;
pub mod simulator;
pub mod stats;
pub mod transport;

pub use chunk::ChunkSplitter;
pub use config::Config;
pub use error::{Error, Result};
pub use event_log::{Direction, EventLog, FileEventLog, NullEventLog, SegmentEvent, TracingEventLog};
pub use message::AckMessage;
pub use receiver::{DiscardReason, Receiver, Verdict};
pub use rtt::RttEstimator;
pub use segment::{Segment, SegmentError, SegmentHeader};
pub use sender::Sender;
pub use seq::SequenceSpace;
pub use stats::{ReceiveStats, TransferStats};
pub use transport::{AckConnector, AckSource, DatagramRecv, DatagramSend, Endpoints};

/// 헤더 크기 (바이트)
pub const HEADER_SIZE: usize = 20;

/// 최대 세그먼트 크기 (헤더 포함)
pub const MAX_SEGMENT_SIZE: usize = 576;

/// 세그먼트당 최대 페이로드
pub const MAX_PAYLOAD: usize = MAX_SEGMENT_SIZE - HEADER_SIZE;

/// data offset/reserved 바이트에 고정되는 값 (5 words)
pub const DATA_OFFSET_MARKER: u8 = 0x50;

/// 기본 윈도우 크기
pub const DEFAULT_WINDOW_SIZE: usize = 1;

/// 첫 RTT 샘플 전 재전송 타임아웃 (밀리초)
pub const INITIAL_TIMEOUT_MS: u64 = 1000;
