//! 세그먼트 이벤트 기록
//!
//! 엔진은 구조화된 [`SegmentEvent`]만 넘기고 포맷은 싱크가 정한다.
//! [`FileEventLog`]는 사람이 읽는 한 줄 포맷을 파일(또는 `stdout`)에 추가한다.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::segment::flags;

/// 이벤트 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Sent => "Sent",
            Direction::Received => "Received",
        }
    }
}

/// 세그먼트/ACK 한 건에 대한 이벤트
#[derive(Debug, Clone)]
pub struct SegmentEvent {
    pub direction: Direction,
    pub source: String,
    pub destination: String,
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
    /// 송신측만 기록
    pub estimated_rtt_ms: Option<f64>,
    pub timestamp: DateTime<Local>,
}

impl SegmentEvent {
    pub fn new(
        direction: Direction,
        source: impl Into<String>,
        destination: impl Into<String>,
        seq: u32,
        ack: u32,
        flags: u8,
    ) -> Self {
        Self {
            direction,
            source: source.into(),
            destination: destination.into(),
            seq,
            ack,
            flags,
            estimated_rtt_ms: None,
            timestamp: Local::now(),
        }
    }

    pub fn with_estimated_rtt(mut self, estimated_rtt_ms: f64) -> Self {
        self.estimated_rtt_ms = Some(estimated_rtt_ms);
        self
    }

    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    /// 한 줄 포맷
    ///
    /// `Sent: 2024-01-01:12:00:00, Source: a, Destination: b, Sequence Number: 0,
    /// Ack Number: 0, Ack: 1, Fin: 0[, Estimated RTT: 3 ms]`
    pub fn format_line(&self) -> String {
        let mut line = format!(
            "{}: {}, Source: {}, Destination: {}, Sequence Number: {}, Ack Number: {}, Ack: {}, Fin: {}",
            self.direction.label(),
            self.timestamp.format("%Y-%m-%d:%H:%M:%S"),
            self.source,
            self.destination,
            self.seq,
            self.ack,
            u8::from(self.flags & flags::ACK != 0),
            u8::from(self.is_fin()),
        );
        if let Some(rtt) = self.estimated_rtt_ms {
            line.push_str(&format!(", Estimated RTT: {} ms", rtt.round() as u64));
        }
        line
    }
}

/// 이벤트 싱크
pub trait EventLog: Send + Sync {
    fn record(&self, event: &SegmentEvent);
}

/// 아무것도 기록하지 않음
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventLog;

impl EventLog for NullEventLog {
    fn record(&self, _event: &SegmentEvent) {}
}

/// tracing으로 전달
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn record(&self, event: &SegmentEvent) {
        debug!(
            direction = event.direction.label(),
            source = %event.source,
            destination = %event.destination,
            seq = event.seq,
            ack = event.ack,
            flags = event.flags,
            estimated_rtt_ms = ?event.estimated_rtt_ms,
            "segment event"
        );
    }
}

/// 파일/표준출력 싱크 (추가 모드, 줄마다 flush)
pub struct FileEventLog {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl FileEventLog {
    /// 경로가 `stdout`이면 표준출력에 기록
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if path == Path::new("stdout") {
            return Ok(Self::from_writer(io::stdout()));
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

impl EventLog for FileEventLog {
    fn record(&self, event: &SegmentEvent) {
        let mut writer = self.writer.lock();
        let result = writeln!(writer, "{}", event.format_line()).and_then(|_| writer.flush());
        if let Err(e) = result {
            warn!("로그 기록 실패: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_receiver_line() {
        let event = SegmentEvent::new(Direction::Received, "10.0.0.1:5000", "10.0.0.2:9000", 3, 3, flags::ACK);
        let line = event.format_line();
        assert!(line.starts_with("Received: "));
        assert!(line.ends_with(
            "Source: 10.0.0.1:5000, Destination: 10.0.0.2:9000, Sequence Number: 3, Ack Number: 3, Ack: 1, Fin: 0"
        ));
    }

    #[test]
    fn test_format_sender_line_with_rtt() {
        let event = SegmentEvent::new(Direction::Sent, "a", "b", 1, 1, flags::ACK_FIN).with_estimated_rtt(12.4);
        let line = event.format_line();
        assert!(line.starts_with("Sent: "));
        assert!(line.contains("Fin: 1"));
        assert!(line.ends_with(", Estimated RTT: 12 ms"));
    }

    #[test]
    fn test_file_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");

        {
            let log = FileEventLog::open(&path).unwrap();
            log.record(&SegmentEvent::new(Direction::Sent, "a", "b", 0, 0, flags::ACK));
        }
        {
            let log = FileEventLog::open(&path).unwrap();
            log.record(&SegmentEvent::new(Direction::Received, "b", "a", 1, 0, flags::ACK_FIN));
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Sent: "));
        assert!(lines[1].starts_with("Received: "));
        assert!(lines[1].contains("Fin: 1"));
    }
}
