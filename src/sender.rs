//! 송신자 (Go-Back-N)
//!
//! 두 태스크가 채널로만 협력한다.
//!
//! - 전송 태스크: `next_seq`, 카운터, 데이터그램 소켓 소유. 윈도우를 채우고
//!   ACK 이벤트 또는 타임아웃을 기다린다. 타임아웃이면 `send_base`부터 다시 보낸다.
//! - ACK 태스크: `send_base`, RTT 추정기, 첫 전송 시각 소유. 백채널 줄을
//!   읽어 다음 세그먼트에 대한 ACK만 수락한다.
//!
//! ```text
//!  TransmitLoop ──SentRecord──▶ AckLoop ◀── "SEQ n ACK m FLAG f" (TCP)
//!       ▲                         │
//!       └────────AckEvent─────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::chunk::ChunkSplitter;
use crate::event_log::{Direction, EventLog, NullEventLog, SegmentEvent};
use crate::message::AckMessage;
use crate::rtt::RttEstimator;
use crate::segment::{flags, Segment, SegmentHeader};
use crate::seq::SequenceSpace;
use crate::stats::TransferStats;
use crate::transport::{AckSource, DatagramSend, Endpoints};
use crate::{Config, Error, Result};

/// 파일 데이터를 전송 순서대로 세그먼트화
///
/// seq/ack 번호는 모두 `위치 mod (2 × window)`, FIN은 마지막 세그먼트에만.
pub fn build_segments(config: &Config, endpoints: &Endpoints, data: &Bytes) -> Vec<Segment> {
    let space = SequenceSpace::for_window(config.window_size);
    let chunks = ChunkSplitter::new(config.max_payload).split(data);
    let last = chunks.len().saturating_sub(1);

    chunks
        .into_iter()
        .enumerate()
        .map(|(position, payload)| {
            let number = space.wrap(position);
            let segment_flags = if position == last { flags::ACK_FIN } else { flags::ACK };
            let header = SegmentHeader::new(
                endpoints.local_port(),
                endpoints.remote_port(),
                number,
                number,
                segment_flags,
                config.advertised_window(),
            );
            Segment::new(header, payload)
        })
        .collect()
}

/// 첫 전송 기록 (전송 태스크 → ACK 태스크)
#[derive(Debug, Clone, Copy)]
struct SentRecord {
    position: usize,
    at: Instant,
}

/// 수락된 ACK (ACK 태스크 → 전송 태스크)
#[derive(Debug, Clone, Copy)]
struct AckEvent {
    send_base: usize,
    timeout: Duration,
    estimated_rtt_ms: f64,
}

/// ACK 태스크 결과
#[derive(Debug, Clone, Copy)]
struct AckOutcome {
    acks_accepted: u64,
    acks_ignored: u64,
    estimated_rtt: Duration,
    timeout: Duration,
}

/// 전송 대기 중인 세그먼트 (헤더는 로그용)
struct Outgoing {
    header: SegmentHeader,
    wire: Bytes,
}

/// 송신자
pub struct Sender<S, A> {
    config: Config,
    endpoints: Endpoints,
    socket: S,
    ack_source: A,
    event_log: Arc<dyn EventLog>,
}

impl<S, A> Sender<S, A>
where
    S: DatagramSend + 'static,
    A: AckSource + 'static,
{
    /// 새 송신자 생성
    pub fn new(config: Config, endpoints: Endpoints, socket: S, ack_source: A) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            endpoints,
            socket,
            ack_source,
            event_log: Arc::new(NullEventLog),
        })
    }

    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = event_log;
        self
    }

    /// 데이터 전체를 전송하고 모든 ACK를 받으면 반환
    pub async fn send(self, data: Bytes) -> Result<TransferStats> {
        let segments = build_segments(&self.config, &self.endpoints, &data);
        self.send_segments(segments).await
    }

    /// 미리 만든 세그먼트 열 전송
    pub async fn send_segments(self, segments: Vec<Segment>) -> Result<TransferStats> {
        if segments.is_empty() {
            return Err(Error::EmptyTransfer);
        }

        let started = Instant::now();
        let total = segments.len();
        let space = SequenceSpace::for_window(self.config.window_size);
        let local = self.endpoints.local.to_string();
        let remote = self.endpoints.remote.to_string();

        info!(
            "전송 시작: {} → {}, {} 세그먼트, window {}",
            local, remote, total, self.config.window_size
        );

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = mpsc::channel(self.config.ack_channel_capacity);
        let rtt = RttEstimator::from_config(&self.config);

        let ack_loop = AckLoop {
            ack_source: self.ack_source,
            space,
            total,
            send_base: 0,
            sent_at: vec![None; total],
            rtt,
            sent_rx,
            ack_tx,
            event_log: self.event_log.clone(),
            local: local.clone(),
            remote: remote.clone(),
            acks_accepted: 0,
            acks_ignored: 0,
        };

        let transmit_loop = TransmitLoop {
            timeout: self.config.clamp_timeout(self.config.initial_timeout()),
            config: self.config,
            socket: self.socket,
            segments: segments
                .into_iter()
                .map(|segment| Outgoing {
                    header: segment.header,
                    wire: segment.to_bytes(),
                })
                .collect(),
            send_base: 0,
            next_seq: 0,
            stamped: 0,
            estimated_rtt_ms: 0.0,
            stats: TransferStats::new(total as u64),
            sent_tx,
            ack_rx,
            event_log: self.event_log,
            local,
            remote,
        };

        let ack_handle = tokio::spawn(ack_loop.run());
        let transmit_handle = tokio::spawn(transmit_loop.run());

        let ack_result = ack_handle.await?;
        let mut stats = transmit_handle.await?;
        let outcome = ack_result?;

        stats.acks_accepted = outcome.acks_accepted;
        stats.acks_ignored = outcome.acks_ignored;
        stats.estimated_rtt = outcome.estimated_rtt;
        stats.timeout = outcome.timeout;
        stats.elapsed = started.elapsed();

        info!("전송 완료: {}", stats.summary());
        Ok(stats)
    }
}

/// select 결과
enum Wake {
    Ack(Option<AckEvent>),
    Timeout,
}

/// 전송 태스크 상태
struct TransmitLoop<S> {
    config: Config,
    socket: S,
    segments: Vec<Outgoing>,
    send_base: usize,
    next_seq: usize,
    /// 이 위치 미만은 첫 전송 시각이 이미 기록됨
    stamped: usize,
    /// 상/하한이 적용된 대기 시간
    timeout: Duration,
    estimated_rtt_ms: f64,
    stats: TransferStats,
    sent_tx: mpsc::UnboundedSender<SentRecord>,
    ack_rx: mpsc::Receiver<AckEvent>,
    event_log: Arc<dyn EventLog>,
    local: String,
    remote: String,
}

impl<S: DatagramSend> TransmitLoop<S> {
    async fn run(mut self) -> TransferStats {
        let total = self.segments.len();
        let window = self.config.window_size;
        let mut window_start = Instant::now();

        while self.send_base < total {
            while self.next_seq < self.send_base + window && self.next_seq < total {
                self.transmit(self.next_seq).await;
                self.next_seq += 1;
            }

            let deadline = window_start + self.timeout;
            let wake = tokio::select! {
                event = self.ack_rx.recv() => Wake::Ack(event),
                _ = sleep_until(deadline) => Wake::Timeout,
            };

            match wake {
                Wake::Ack(Some(event)) => {
                    self.send_base = event.send_base;
                    self.next_seq = self.next_seq.max(self.send_base);
                    self.timeout = self.config.clamp_timeout(event.timeout);
                    self.estimated_rtt_ms = event.estimated_rtt_ms;
                    window_start = Instant::now();
                }
                Wake::Ack(None) => {
                    debug!("ACK 태스크 종료, 전송 중단 (send_base={})", self.send_base);
                    break;
                }
                Wake::Timeout => {
                    let redo = self.next_seq - self.send_base;
                    debug!(
                        "타임아웃 ({:?}): send_base={}부터 {} 세그먼트 재전송",
                        self.timeout, self.send_base, redo
                    );
                    self.stats.timeouts += 1;
                    self.stats.retransmissions += redo as u64;
                    self.next_seq = self.send_base;
                    window_start = Instant::now();
                }
            }
        }

        self.stats
    }

    async fn transmit(&mut self, position: usize) {
        let Outgoing { header, wire } = &self.segments[position];

        if position >= self.stamped {
            // ACK 태스크가 이미 끝났으면 무시
            let _ = self.sent_tx.send(SentRecord {
                position,
                at: Instant::now(),
            });
            self.stamped = position + 1;
        }

        match self.socket.send_datagram(wire).await {
            Ok(sent) => {
                self.stats.bytes_sent += sent as u64;
                self.stats.segments_sent += 1;
                self.event_log.record(
                    &SegmentEvent::new(
                        Direction::Sent,
                        self.local.as_str(),
                        self.remote.as_str(),
                        header.seq,
                        header.ack,
                        header.flags,
                    )
                    .with_estimated_rtt(self.estimated_rtt_ms),
                );
            }
            Err(e) => {
                warn!("세그먼트 {} 전송 실패: {}", position, e);
            }
        }
    }
}

/// ACK 태스크 상태
struct AckLoop<A> {
    ack_source: A,
    space: SequenceSpace,
    total: usize,
    send_base: usize,
    sent_at: Vec<Option<Instant>>,
    rtt: RttEstimator,
    sent_rx: mpsc::UnboundedReceiver<SentRecord>,
    ack_tx: mpsc::Sender<AckEvent>,
    event_log: Arc<dyn EventLog>,
    local: String,
    remote: String,
    acks_accepted: u64,
    acks_ignored: u64,
}

impl<A: AckSource> AckLoop<A> {
    async fn run(mut self) -> Result<AckOutcome> {
        let stream = self.ack_source.accept_stream().await?;
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();

        while self.send_base < self.total {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                return Err(Error::AckChannelClosed {
                    send_base: self.send_base,
                    total: self.total,
                });
            }

            self.drain_sent();

            let text = String::from_utf8_lossy(&line);
            let ack = match AckMessage::parse(&text) {
                Some(ack) => ack,
                None => {
                    debug!("잘못된 ACK 줄 무시: {:?}", text.trim_end());
                    self.acks_ignored += 1;
                    continue;
                }
            };

            let expected = self.space.wrap(self.send_base + 1);
            if ack.seq != expected {
                debug!("ACK 무시: seq={} (기대 {})", ack.seq, expected);
                self.acks_ignored += 1;
                self.record_received(&ack);
                continue;
            }

            let acked = self.send_base;
            self.send_base += 1;
            self.acks_accepted += 1;

            if let Some(at) = self.sent_at.get(acked).copied().flatten() {
                self.rtt.record_sample(at.elapsed());
            }
            self.record_received(&ack);

            debug!(
                "ACK 수락: position={}, send_base={}, rtt={:.2}ms, timeout={:.2}ms",
                acked,
                self.send_base,
                self.rtt.estimated_rtt_ms(),
                self.rtt.timeout_ms()
            );

            let event = AckEvent {
                send_base: self.send_base,
                timeout: self.rtt.timeout(),
                estimated_rtt_ms: self.rtt.estimated_rtt_ms(),
            };
            if self.ack_tx.send(event).await.is_err() {
                break;
            }
        }

        Ok(AckOutcome {
            acks_accepted: self.acks_accepted,
            acks_ignored: self.acks_ignored,
            estimated_rtt: self.rtt.estimated_rtt(),
            timeout: self.rtt.timeout(),
        })
    }

    /// 도착한 첫 전송 기록 반영
    fn drain_sent(&mut self) {
        while let Ok(record) = self.sent_rx.try_recv() {
            if let Some(slot) = self.sent_at.get_mut(record.position) {
                slot.get_or_insert(record.at);
            }
        }
    }

    fn record_received(&self, ack: &AckMessage) {
        self.event_log.record(
            &SegmentEvent::new(
                Direction::Received,
                self.remote.as_str(),
                self.local.as_str(),
                ack.seq,
                ack.ack,
                ack.flags,
            )
            .with_estimated_rtt(self.rtt.estimated_rtt_ms()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::receiver::Receiver;
    use crate::simulator::{ack_pipe, datagram_link, LinkConfig, LinkMonitor, SimulatedSender};
    use crate::stats::ReceiveStats;
    use crate::transport::{AckConnector, BoxFuture, DatagramRecv};
    use tokio::io::AsyncWriteExt;

    /// 지정한 송신 시도만 실패시키는 소켓
    struct FlakySocket {
        inner: SimulatedSender,
        attempts: AtomicU64,
        fail_at: u64,
    }

    impl DatagramSend for FlakySocket {
        fn send_datagram<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == self.fail_at {
                return Box::pin(async { Err(io::Error::new(io::ErrorKind::Other, "send failed")) });
            }
            self.inner.send_datagram(data)
        }
    }

    fn endpoints() -> Endpoints {
        Endpoints::new("127.0.0.1:40000".parse().unwrap(), "127.0.0.1:9000".parse().unwrap())
    }

    fn fixed_timeout(window_size: usize, timeout_ms: u64) -> Config {
        Config {
            window_size,
            initial_timeout_ms: timeout_ms,
            min_timeout_ms: timeout_ms,
            max_timeout_ms: timeout_ms,
            ..Config::default()
        }
    }

    fn file_bytes(len: usize) -> Bytes {
        (0..len).map(|i| (i * 7 % 256) as u8).collect::<Vec<u8>>().into()
    }

    async fn transfer(
        config: Config,
        link: LinkConfig,
        data: Bytes,
    ) -> (TransferStats, ReceiveStats, Vec<u8>, LinkMonitor) {
        let (link_tx, link_rx, monitor) = datagram_link(link);
        let (ack_source, ack_connector) = ack_pipe();

        let mut receiver =
            Receiver::new(config.clone(), endpoints().reversed(), link_rx, ack_connector, Vec::new()).unwrap();
        let receiving = tokio::spawn(async move {
            let stats = receiver.run().await.unwrap();
            (stats, receiver.into_sink())
        });

        let sender = Sender::new(config, endpoints(), link_tx, ack_source).unwrap();
        let sent = sender.send(data).await.unwrap();
        let (received, sink) = receiving.await.unwrap();
        (sent, received, sink, monitor)
    }

    #[test]
    fn test_sequence_numbers_wrap() {
        let config = Config::with_window(2);
        let segments = build_segments(&config, &endpoints(), &file_bytes(556 * 9 + 1));

        let seqs: Vec<u32> = segments.iter().map(|s| s.header.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1]);
        assert!(segments.iter().all(|s| s.header.ack == s.header.seq));
        assert!(segments.iter().all(|s| s.header.window == 2));
        assert!(segments.iter().all(|s| s.header.source_port == 40000 && s.header.dest_port == 9000));
    }

    #[test]
    fn test_fin_only_on_last_segment() {
        let segments = build_segments(&Config::default(), &endpoints(), &file_bytes(556 * 3 + 10));
        assert_eq!(segments.len(), 4);

        let fins: Vec<bool> = segments.iter().map(|s| s.header.is_fin()).collect();
        assert_eq!(fins, vec![false, false, false, true]);
        assert_eq!(segments[3].header.flags, flags::ACK_FIN);
        assert!(segments[..3].iter().all(|s| s.header.flags == flags::ACK));
    }

    #[test]
    fn test_empty_file_yields_fin_segment() {
        let segments = build_segments(&Config::default(), &endpoints(), &Bytes::new());
        assert_eq!(segments.len(), 1);
        assert!(segments[0].payload.is_empty());
        assert!(segments[0].header.is_fin());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let (link_tx, _link_rx, _) = datagram_link(LinkConfig::perfect());
        let (ack_source, _connector) = ack_pipe();
        let result = Sender::new(Config::with_window(0), endpoints(), link_tx, ack_source);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_lossless_transfer() {
        let data = file_bytes(556 * 3 + 10);

        for window in [1, 4] {
            let (sent, received, sink, monitor) =
                transfer(fixed_timeout(window, 1000), LinkConfig::perfect(), data.clone()).await;

            assert_eq!(sink, data.as_ref());
            assert_eq!(sent.total_segments, 4);
            assert_eq!(sent.segments_sent, 4);
            assert_eq!(sent.retransmissions, 0);
            assert_eq!(sent.timeouts, 0);
            assert_eq!(sent.acks_accepted, 4);
            assert_eq!(sent.bytes_sent, (data.len() + 4 * 20) as u64);
            assert_eq!(received.segments_accepted, 4);
            assert_eq!(received.acks_sent, 4);
            assert_eq!(received.bytes_written, data.len() as u64);
            assert_eq!(monitor.transmissions(), 4);
        }
    }

    #[tokio::test]
    async fn test_go_back_n_after_drop() {
        // 10 세그먼트, window 4, 세 번째 송신(세그먼트 2) 손실
        let data = file_bytes(556 * 9 + 100);
        let (sent, received, sink, monitor) = transfer(
            fixed_timeout(4, 150),
            LinkConfig::perfect().dropping([2]),
            data.clone(),
        )
        .await;

        assert_eq!(sink, data.as_ref());
        assert_eq!(sent.total_segments, 10);
        assert_eq!(sent.timeouts, 1);
        // 세그먼트 2..=5 재전송
        assert_eq!(sent.retransmissions, 4);
        assert_eq!(sent.segments_sent, 14);
        assert_eq!(monitor.transmissions(), 14);
        assert_eq!(monitor.dropped(), vec![2]);
        assert_eq!(received.discarded_out_of_order, 3);
        assert_eq!(received.segments_accepted, 10);
    }

    #[tokio::test]
    async fn test_padded_delivery() {
        let data = file_bytes(1000);
        let (sent, received, sink, _) = transfer(
            fixed_timeout(2, 1000),
            LinkConfig::perfect().padded_to(crate::MAX_SEGMENT_SIZE),
            data.clone(),
        )
        .await;

        assert_eq!(sink, data.as_ref());
        assert_eq!(sent.retransmissions, 0);
        assert_eq!(received.discarded(), 0);
    }

    #[tokio::test]
    async fn test_corrupted_segments_are_resent() {
        let data = file_bytes(556 * 2 + 1);
        let (sent, received, sink, monitor) = transfer(
            fixed_timeout(1, 100),
            LinkConfig::perfect().corrupting([0, 3]),
            data.clone(),
        )
        .await;

        assert_eq!(sink, data.as_ref());
        assert_eq!(monitor.corrupted(), vec![0, 3]);
        assert_eq!(sent.timeouts, 2);
        assert_eq!(sent.retransmissions, 2);
        assert_eq!(received.discarded_invalid_length, 2);
    }

    #[tokio::test]
    async fn test_empty_file_transfer() {
        let (sent, received, sink, _) =
            transfer(fixed_timeout(1, 1000), LinkConfig::perfect(), Bytes::new()).await;

        assert!(sink.is_empty());
        assert_eq!(sent.total_segments, 1);
        assert_eq!(sent.bytes_sent, 20);
        assert_eq!(received.segments_accepted, 1);
    }

    #[tokio::test]
    async fn test_random_loss_still_delivers() {
        let data = file_bytes(556 * 20);
        let (sent, _, sink, monitor) = transfer(
            fixed_timeout(4, 50),
            LinkConfig::perfect().with_loss_rate(0.2, 42),
            data.clone(),
        )
        .await;

        assert_eq!(sink, data.as_ref());
        assert_eq!(sent.segments_sent, monitor.transmissions());
        assert!(sent.segments_sent >= 20);
    }

    #[tokio::test]
    async fn test_ignores_malformed_and_unexpected_acks() {
        let (link_tx, mut link_rx, _) = datagram_link(LinkConfig::perfect());
        let (ack_source, mut ack_connector) = ack_pipe();

        // 기대 시퀀스만 ACK하되, 매번 쓰레기 줄과 엉뚱한 ACK를 먼저 보냄
        let fake_receiver = tokio::spawn(async move {
            let mut stream = ack_connector.connect_stream().await.unwrap();
            let space = SequenceSpace::for_window(1);
            let mut expected = 0;
            let mut buf = [0u8; crate::MAX_SEGMENT_SIZE];
            loop {
                let len = link_rx.recv_datagram(&mut buf).await.unwrap();
                let segment = Segment::parse(&buf[..len]).unwrap();
                if segment.header.seq != expected {
                    continue;
                }
                expected = space.next(expected);
                stream.write_all(b"garbage line\n").await.unwrap();
                stream.write_all(&[0xFF, 0xFE, b'\n']).await.unwrap();
                stream
                    .write_all(AckMessage::new(space.next(expected), 0, flags::ACK).to_line().as_bytes())
                    .await
                    .unwrap();
                stream
                    .write_all(AckMessage::new(expected, segment.header.ack, segment.header.flags).to_line().as_bytes())
                    .await
                    .unwrap();
                if segment.header.is_fin() {
                    break;
                }
            }
        });

        let sender = Sender::new(Config::default(), endpoints(), link_tx, ack_source).unwrap();
        let stats = sender.send(file_bytes(556 + 1)).await.unwrap();
        fake_receiver.await.unwrap();

        assert_eq!(stats.acks_accepted, 2);
        assert_eq!(stats.acks_ignored, 6);
        assert_eq!(stats.retransmissions, 0);
    }

    #[tokio::test]
    async fn test_ack_channel_closed_early() {
        let (link_tx, _link_rx, _) = datagram_link(LinkConfig::perfect());
        let (ack_source, ack_connector) = ack_pipe();
        drop(ack_connector);

        let sender = Sender::new(fixed_timeout(1, 1000), endpoints(), link_tx, ack_source).unwrap();
        let result = sender.send(file_bytes(10)).await;
        assert!(matches!(
            result,
            Err(Error::AckChannelClosed { send_base: 0, total: 1 })
        ));
    }

    #[tokio::test]
    async fn test_empty_segment_list_rejected() {
        let (link_tx, _link_rx, _) = datagram_link(LinkConfig::perfect());
        let (ack_source, _connector) = ack_pipe();
        let sender = Sender::new(Config::default(), endpoints(), link_tx, ack_source).unwrap();
        assert!(matches!(sender.send_segments(Vec::new()).await, Err(Error::EmptyTransfer)));
    }

    #[tokio::test]
    async fn test_send_failure_recovered_by_timeout() {
        let config = fixed_timeout(1, 100);
        let data = file_bytes(556 * 2 + 5);
        let (link_tx, link_rx, monitor) = datagram_link(LinkConfig::perfect());
        let (ack_source, ack_connector) = ack_pipe();
        // 두 번째 송신(세그먼트 1) 실패
        let socket = FlakySocket {
            inner: link_tx,
            attempts: AtomicU64::new(0),
            fail_at: 1,
        };

        let mut receiver =
            Receiver::new(config.clone(), endpoints().reversed(), link_rx, ack_connector, Vec::new()).unwrap();
        let receiving = tokio::spawn(async move {
            receiver.run().await.unwrap();
            receiver.into_sink()
        });

        let sent = Sender::new(config, endpoints(), socket, ack_source)
            .unwrap()
            .send(data.clone())
            .await
            .unwrap();
        let sink = receiving.await.unwrap();

        assert_eq!(sink, data.as_ref());
        assert_eq!(sent.timeouts, 1);
        assert_eq!(sent.retransmissions, 1);
        assert_eq!(sent.segments_sent, 3);
        assert_eq!(monitor.transmissions(), 3);
    }
}
