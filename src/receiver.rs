//! 수신자 (순서 보장)
//!
//! 기대 시퀀스와 일치하는 세그먼트만 싱크에 기록하고 ACK를 보낸다.
//! 순서 밖/중복/손상 세그먼트는 버퍼링 없이 폐기하며 ACK도 보내지 않는다.
//! 복구는 송신측 Go-Back-N 재전송에 전적으로 맡긴다.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace};

use crate::event_log::{Direction, EventLog, NullEventLog, SegmentEvent};
use crate::message::AckMessage;
use crate::segment::{Segment, SegmentError};
use crate::seq::SequenceSpace;
use crate::stats::ReceiveStats;
use crate::transport::{AckConnector, DatagramRecv, Endpoints};
use crate::{Config, Result};

/// 폐기 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// 체크섬에서 복원한 길이가 유효하지 않음
    InvalidLength,
    /// 체크섬 불일치 (길이 복원이 체크섬을 역산하므로 현재 코덱에서는 발생하지 않음)
    Checksum,
    /// 기대 시퀀스가 아님 (중복 포함)
    OutOfOrder,
}

/// 데이터그램 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted { fin: bool },
    Discarded(DiscardReason),
}

/// 수신자
pub struct Receiver<R, C: AckConnector, W> {
    config: Config,
    socket: R,
    connector: C,
    ack_stream: Option<C::Stream>,
    sink: W,
    space: SequenceSpace,
    expected: u32,
    finished: bool,
    stats: ReceiveStats,
    event_log: Arc<dyn EventLog>,
    local: String,
    remote: String,
}

impl<R, C, W> Receiver<R, C, W>
where
    R: DatagramRecv,
    C: AckConnector,
    W: AsyncWrite + Unpin + Send,
{
    /// 새 수신자 생성
    ///
    /// 첫 세그먼트 전까지 시퀀스 범위는 2 (window 1).
    pub fn new(config: Config, endpoints: Endpoints, socket: R, connector: C, sink: W) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            socket,
            connector,
            ack_stream: None,
            sink,
            space: SequenceSpace::for_window(1),
            expected: 0,
            finished: false,
            stats: ReceiveStats::default(),
            event_log: Arc::new(NullEventLog),
            local: endpoints.local.to_string(),
            remote: endpoints.remote.to_string(),
        })
    }

    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = event_log;
        self
    }

    /// 다음에 수락할 시퀀스 번호
    pub fn expected_sequence(&self) -> u32 {
        self.expected
    }

    pub fn sequence_range(&self) -> u32 {
        self.space.range()
    }

    /// FIN 세그먼트를 수락했는지
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stats(&self) -> &ReceiveStats {
        &self.stats
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    /// FIN을 수락할 때까지 수신
    pub async fn run(&mut self) -> Result<ReceiveStats> {
        info!("수신 대기: {} ← {}", self.local, self.remote);
        let mut buf = vec![0u8; self.config.recv_buffer_size];

        while !self.finished {
            let len = self.socket.recv_datagram(&mut buf).await?;
            self.handle_datagram(&buf[..len]).await?;
        }

        if let Some(stream) = self.ack_stream.as_mut() {
            stream.shutdown().await?;
        }

        info!("수신 완료: {}", self.stats.summary());
        Ok(self.stats.clone())
    }

    /// 데이터그램 하나 처리
    ///
    /// 폐기는 에러가 아니다. 싱크 기록이나 ACK 전송 실패만 에러로 반환한다.
    /// 페이로드는 ACK 전에 flush된다.
    pub async fn handle_datagram(&mut self, datagram: &[u8]) -> Result<Verdict> {
        let segment = match Segment::parse(datagram) {
            Ok(segment) => segment,
            Err(SegmentError::TooShort { .. }) | Err(SegmentError::InvalidLength) => {
                trace!("폐기: 길이 복원 실패 ({} bytes)", datagram.len());
                self.stats.discarded_invalid_length += 1;
                return Ok(Verdict::Discarded(DiscardReason::InvalidLength));
            }
            Err(SegmentError::ChecksumMismatch) => {
                trace!("폐기: 체크섬 불일치");
                self.stats.discarded_checksum += 1;
                return Ok(Verdict::Discarded(DiscardReason::Checksum));
            }
        };
        let header = segment.header;

        self.record(Direction::Received, header.seq, header.ack, header.flags);

        if header.seq != self.expected {
            debug!("폐기: seq={} (기대 {})", header.seq, self.expected);
            self.stats.discarded_out_of_order += 1;
            return Ok(Verdict::Discarded(DiscardReason::OutOfOrder));
        }

        // ACK 전에 싱크까지 내려보냄
        self.sink.write_all(&segment.payload).await?;
        self.sink.flush().await?;
        self.stats.bytes_written += segment.payload.len() as u64;
        self.stats.segments_accepted += 1;

        if let Some(space) = SequenceSpace::from_advertised(header.window) {
            self.space = space;
        }
        self.expected = self.space.next(self.expected);

        let ack = AckMessage::new(self.expected, header.ack, header.flags);
        self.send_ack(&ack).await?;

        let fin = header.is_fin();
        if fin {
            self.finished = true;
        }
        Ok(Verdict::Accepted { fin })
    }

    async fn send_ack(&mut self, ack: &AckMessage) -> Result<()> {
        if self.ack_stream.is_none() {
            self.ack_stream = Some(self.connector.connect_stream().await?);
            debug!("ACK 채널 연결: {}", self.remote);
        }
        if let Some(stream) = self.ack_stream.as_mut() {
            stream.write_all(ack.to_line().as_bytes()).await?;
            stream.flush().await?;
        }

        self.stats.acks_sent += 1;
        self.record(Direction::Sent, ack.seq, ack.ack, ack.flags);
        Ok(())
    }

    fn record(&self, direction: Direction, seq: u32, ack: u32, flags: u8) {
        let (source, destination) = match direction {
            Direction::Received => (&self.remote, &self.local),
            Direction::Sent => (&self.local, &self.remote),
        };
        self.event_log.record(&SegmentEvent::new(
            direction,
            source.as_str(),
            destination.as_str(),
            seq,
            ack,
            flags,
        ));
    }
}
