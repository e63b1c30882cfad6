//! 프로토콜 설정

use std::time::Duration;

use crate::{Error, Result, DEFAULT_WINDOW_SIZE, INITIAL_TIMEOUT_MS, MAX_PAYLOAD, MAX_SEGMENT_SIZE};

/// RFT 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 윈도우 크기 (동시 전송 세그먼트 수)
    /// 시퀀스 범위는 항상 2 × window_size
    pub window_size: usize,

    /// 세그먼트당 최대 페이로드 (바이트)
    pub max_payload: usize,

    /// 첫 RTT 샘플 전 타임아웃 (밀리초)
    pub initial_timeout_ms: u64,

    /// 재전송 타임아웃 하한 (밀리초)
    pub min_timeout_ms: u64,

    /// 재전송 타임아웃 상한 (밀리초)
    pub max_timeout_ms: u64,

    /// estimatedRTT EWMA 가중치
    pub rtt_alpha: f64,

    /// devRTT EWMA 가중치
    pub rtt_beta: f64,

    /// 수신 버퍼 크기 (바이트)
    pub recv_buffer_size: usize,

    /// ACK 이벤트 채널 용량
    pub ack_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            max_payload: MAX_PAYLOAD,
            initial_timeout_ms: INITIAL_TIMEOUT_MS, // 1초
            min_timeout_ms: 10,
            max_timeout_ms: 60_000,
            rtt_alpha: 0.125, // Jacobson/Karels
            rtt_beta: 0.25,
            recv_buffer_size: MAX_SEGMENT_SIZE,
            ack_channel_capacity: 1024,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 윈도우 크기만 지정한 설정
    pub fn with_window(window_size: usize) -> Self {
        Self {
            window_size,
            ..Self::default()
        }
    }

    /// 루프백/테스트용 설정 (짧은 타임아웃)
    pub fn loopback() -> Self {
        Self {
            initial_timeout_ms: 50,
            min_timeout_ms: 5,
            max_timeout_ms: 1000,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            window_size: 8,
            initial_timeout_ms: 2000,
            min_timeout_ms: 200,
            max_timeout_ms: 120_000,
            ..Self::default()
        }
    }

    /// 시퀀스 범위 (윈도우의 2배)
    pub fn sequence_range(&self) -> u32 {
        (self.window_size * 2) as u32
    }

    /// 헤더에 광고할 윈도우 크기
    pub fn advertised_window(&self) -> u16 {
        self.window_size as u16
    }

    pub fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms)
    }

    /// 실제 대기에 쓰는 타임아웃 (상/하한 적용)
    pub fn clamp_timeout(&self, timeout: Duration) -> Duration {
        timeout.clamp(
            Duration::from_millis(self.min_timeout_ms),
            Duration::from_millis(self.max_timeout_ms),
        )
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::InvalidConfig("window_size는 1 이상이어야 함".into()));
        }
        // 광고 필드가 16비트, 시퀀스 범위는 그 2배
        if self.window_size > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "window_size {} 가 헤더 필드 범위를 초과",
                self.window_size
            )));
        }
        if self.max_payload == 0 || self.max_payload > MAX_PAYLOAD {
            return Err(Error::InvalidConfig(format!(
                "max_payload는 1..={} 범위여야 함: {}",
                MAX_PAYLOAD, self.max_payload
            )));
        }
        if self.min_timeout_ms > self.max_timeout_ms {
            return Err(Error::InvalidConfig(format!(
                "min_timeout_ms({}) > max_timeout_ms({})",
                self.min_timeout_ms, self.max_timeout_ms
            )));
        }
        if self.recv_buffer_size < MAX_SEGMENT_SIZE {
            return Err(Error::InvalidConfig(format!(
                "recv_buffer_size는 {} 이상이어야 함",
                MAX_SEGMENT_SIZE
            )));
        }
        if self.ack_channel_capacity == 0 {
            return Err(Error::InvalidConfig("ack_channel_capacity는 1 이상이어야 함".into()));
        }
        Ok(())
    }
}
