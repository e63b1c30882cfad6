//! 메모리 내 손실 링크 (테스트용)
//!
//! 송신 인덱스(0부터, 재전송 포함)로 결정적인 손실/손상을 주입하고,
//! 시드가 고정된 무작위 손실을 추가로 적용한다. 배달되는 버퍼는 지정한
//! 크기까지 0으로 패딩할 수 있다.
//!
//! 손상은 체크섬 최상위 비트를 뒤집는 방식이라 수신측이 항상 걸러낸다.

use std::collections::HashSet;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{duplex, DuplexStream};
use tokio::sync::mpsc;
use tracing::trace;

use crate::transport::{AckConnector, AckSource, BoxFuture, DatagramRecv, DatagramSend};

// 체크섬 필드 첫 바이트
const CHECKSUM_OFFSET: usize = 16;

// ACK 파이프 버퍼 크기
const ACK_PIPE_CAPACITY: usize = 4096;

/// 링크 동작 설정
#[derive(Debug, Clone, Default)]
pub struct LinkConfig {
    /// 무작위 손실 확률 (0.0..=1.0)
    pub loss_rate: f64,

    /// 반드시 버릴 송신 인덱스
    pub drop_indices: HashSet<u64>,

    /// 손상시킬 송신 인덱스
    pub corrupt_indices: HashSet<u64>,

    /// 배달 버퍼를 이 크기까지 0 패딩
    pub pad_to: Option<usize>,

    /// 무작위 손실 시드
    pub seed: u64,
}

impl LinkConfig {
    /// 손실 없는 링크
    pub fn perfect() -> Self {
        Self::default()
    }

    pub fn with_loss_rate(mut self, loss_rate: f64, seed: u64) -> Self {
        self.loss_rate = loss_rate.clamp(0.0, 1.0);
        self.seed = seed;
        self
    }

    pub fn dropping(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.drop_indices.extend(indices);
        self
    }

    pub fn corrupting(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.corrupt_indices.extend(indices);
        self
    }

    pub fn padded_to(mut self, size: usize) -> Self {
        self.pad_to = Some(size);
        self
    }
}

/// 송신측/모니터가 공유하는 링크 상태
struct LinkState {
    rng: StdRng,
    transmissions: u64,
    dropped: Vec<u64>,
    corrupted: Vec<u64>,
}

/// 링크 입구
pub struct SimulatedSender {
    config: LinkConfig,
    state: Arc<Mutex<LinkState>>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// 링크 출구
pub struct SimulatedReceiver {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// 링크 관찰용 핸들
#[derive(Clone)]
pub struct LinkMonitor {
    state: Arc<Mutex<LinkState>>,
}

/// 단방향 데이터그램 링크 생성
pub fn datagram_link(config: LinkConfig) -> (SimulatedSender, SimulatedReceiver, LinkMonitor) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(LinkState {
        rng: StdRng::seed_from_u64(config.seed),
        transmissions: 0,
        dropped: Vec::new(),
        corrupted: Vec::new(),
    }));

    (
        SimulatedSender {
            config,
            state: state.clone(),
            tx,
        },
        SimulatedReceiver { rx },
        LinkMonitor { state },
    )
}

impl SimulatedSender {
    fn transmit(&self, data: &[u8]) -> usize {
        let (index, corrupt) = {
            let mut state = self.state.lock();
            let index = state.transmissions;
            state.transmissions += 1;

            let random_loss = self.config.loss_rate > 0.0 && state.rng.gen_bool(self.config.loss_rate);
            if self.config.drop_indices.contains(&index) || random_loss {
                state.dropped.push(index);
                trace!("링크: 송신 #{} 손실", index);
                return data.len();
            }

            let corrupt = self.config.corrupt_indices.contains(&index);
            if corrupt {
                state.corrupted.push(index);
            }
            (index, corrupt)
        };

        let mut datagram = data.to_vec();
        if corrupt && datagram.len() > CHECKSUM_OFFSET {
            datagram[CHECKSUM_OFFSET] ^= 0x80;
            trace!("링크: 송신 #{} 손상", index);
        }
        if let Some(size) = self.config.pad_to {
            if size > datagram.len() {
                datagram.resize(size, 0);
            }
        }

        // 출구가 닫혀도 UDP처럼 조용히 성공
        let _ = self.tx.send(datagram);
        data.len()
    }
}

impl DatagramSend for SimulatedSender {
    fn send_datagram<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        let sent = self.transmit(data);
        Box::pin(async move { Ok(sent) })
    }
}

impl DatagramRecv for SimulatedReceiver {
    fn recv_datagram<'a>(&'a mut self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(async move {
            let datagram = self
                .rx
                .recv()
                .await
                .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionAborted, "링크 종료"))?;
            // UDP처럼 버퍼를 넘는 부분은 잘림
            let len = datagram.len().min(buf.len());
            buf[..len].copy_from_slice(&datagram[..len]);
            Ok(len)
        })
    }
}

impl LinkMonitor {
    /// 지금까지의 송신 시도 수 (손실 포함)
    pub fn transmissions(&self) -> u64 {
        self.state.lock().transmissions
    }

    /// 손실된 송신 인덱스
    pub fn dropped(&self) -> Vec<u64> {
        self.state.lock().dropped.clone()
    }

    /// 손상된 송신 인덱스
    pub fn corrupted(&self) -> Vec<u64> {
        self.state.lock().corrupted.clone()
    }
}

/// 메모리 ACK 채널의 수락측
pub struct MemoryAckSource {
    stream: Option<DuplexStream>,
}

/// 메모리 ACK 채널의 연결측
pub struct MemoryAckConnector {
    stream: Option<DuplexStream>,
}

/// 한 번만 연결 가능한 메모리 ACK 채널
pub fn ack_pipe() -> (MemoryAckSource, MemoryAckConnector) {
    let (source, connector) = duplex(ACK_PIPE_CAPACITY);
    (
        MemoryAckSource {
            stream: Some(source),
        },
        MemoryAckConnector {
            stream: Some(connector),
        },
    )
}

fn already_taken() -> io::Error {
    io::Error::new(io::ErrorKind::AddrInUse, "ACK 파이프는 한 번만 연결 가능")
}

impl AckSource for MemoryAckSource {
    type Stream = DuplexStream;

    fn accept_stream(&mut self) -> BoxFuture<'_, io::Result<DuplexStream>> {
        let stream = self.stream.take().ok_or_else(already_taken);
        Box::pin(async move { stream })
    }
}

impl AckConnector for MemoryAckConnector {
    type Stream = DuplexStream;

    fn connect_stream(&mut self) -> BoxFuture<'_, io::Result<DuplexStream>> {
        let stream = self.stream.take().ok_or_else(already_taken);
        Box::pin(async move { stream })
    }
}
