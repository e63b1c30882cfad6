//! 전송 통계

use std::time::Duration;

/// 송신측 전송 통계
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// 파일을 이루는 세그먼트 수
    pub total_segments: u64,

    /// 전송한 바이트 (헤더 포함, 재전송 포함)
    pub bytes_sent: u64,

    /// 전송한 세그먼트 수 (재전송 포함)
    pub segments_sent: u64,

    /// 재전송된 세그먼트 수
    pub retransmissions: u64,

    /// 타임아웃 발생 횟수
    pub timeouts: u64,

    /// 수락된 ACK 수
    pub acks_accepted: u64,

    /// 무시된 ACK 줄 수 (형식 오류 포함)
    pub acks_ignored: u64,

    /// 최종 추정 RTT
    pub estimated_rtt: Duration,

    /// 최종 재전송 타임아웃 (상/하한 적용 전)
    pub timeout: Duration,

    /// 전송 소요 시간
    pub elapsed: Duration,
}

impl TransferStats {
    pub fn new(total_segments: u64) -> Self {
        Self {
            total_segments,
            ..Self::default()
        }
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed.as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_sent as f64 / elapsed
    }

    /// 재전송 비율
    pub fn retransmission_ratio(&self) -> f64 {
        if self.segments_sent == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.segments_sent as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Segments: {} (sent {}) | Bytes: {} | Retransmissions: {} | Timeouts: {} | Throughput: {:.2} KB/s | RTT: {:.2}ms",
            self.elapsed.as_secs_f64(),
            self.total_segments,
            self.segments_sent,
            self.bytes_sent,
            self.retransmissions,
            self.timeouts,
            self.throughput() / 1_000.0,
            self.estimated_rtt.as_secs_f64() * 1000.0,
        )
    }
}

/// 수신측 통계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    /// 싱크에 기록한 페이로드 바이트
    pub bytes_written: u64,

    /// 수락한 세그먼트 수
    pub segments_accepted: u64,

    /// 길이 복원 실패로 폐기
    pub discarded_invalid_length: u64,

    /// 체크섬 불일치로 폐기 (현재 코덱에서는 항상 0)
    pub discarded_checksum: u64,

    /// 기대 시퀀스가 아니라서 폐기
    pub discarded_out_of_order: u64,

    /// 보낸 ACK 수
    pub acks_sent: u64,
}

impl ReceiveStats {
    /// 전체 폐기 수
    pub fn discarded(&self) -> u64 {
        self.discarded_invalid_length + self.discarded_checksum + self.discarded_out_of_order
    }

    pub fn summary(&self) -> String {
        format!(
            "Bytes: {} | Accepted: {} | Discarded: {} (length {}, checksum {}, order {}) | ACKs: {}",
            self.bytes_written,
            self.segments_accepted,
            self.discarded(),
            self.discarded_invalid_length,
            self.discarded_checksum,
            self.discarded_out_of_order,
            self.acks_sent,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput() {
        let stats = TransferStats {
            bytes_sent: 10_000,
            elapsed: Duration::from_secs(2),
            ..TransferStats::new(20)
        };
        assert_eq!(stats.throughput(), 5_000.0);
        assert_eq!(TransferStats::new(1).throughput(), 0.0);
    }

    #[test]
    fn test_retransmission_ratio() {
        let stats = TransferStats {
            segments_sent: 14,
            retransmissions: 4,
            ..TransferStats::new(10)
        };
        assert!((stats.retransmission_ratio() - 4.0 / 14.0).abs() < 1e-12);
        assert!(stats.summary().contains("Retransmissions: 4"));
    }

    #[test]
    fn test_receive_discard_total() {
        let stats = ReceiveStats {
            discarded_invalid_length: 1,
            discarded_checksum: 2,
            discarded_out_of_order: 3,
            ..ReceiveStats::default()
        };
        assert_eq!(stats.discarded(), 6);
        assert!(stats.summary().contains("Discarded: 6"));
    }
}
