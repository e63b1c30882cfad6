//! 루프백 전송 테스트 (송신자 + 수신자를 한 프로세스에서)
//!
//! 사용법:
//!   cargo run --release --example loopback_transfer -- [OPTIONS]
//!
//! 옵션:
//!   --size <KB>       테스트 데이터 크기 (KB, 기본: 256)
//!   --window <N>      윈도우 크기 (기본: 4)
//!   --loss <RATE>     메모리 링크 손실률 0.0~1.0, 지정 시 UDP 대신 시뮬레이터 사용
//!   --seed <N>        손실 시드 (기본: 1)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rft::simulator::{ack_pipe, datagram_link, LinkConfig};
use rft::transport::{TcpAckConnector, UdpSender};
use rft::{Config, Endpoints, Receiver, Sender, TracingEventLog, TransferStats};

struct DemoArgs {
    size_kb: usize,
    window: usize,
    loss: Option<f64>,
    seed: u64,
}

fn parse_args() -> DemoArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut demo = DemoArgs {
        size_kb: 256,
        window: 4,
        loss: None,
        seed: 1,
    };

    let mut i = 1;
    while i + 1 < args.len() {
        let value = &args[i + 1];
        match args[i].as_str() {
            "--size" => demo.size_kb = value.parse().unwrap_or(demo.size_kb),
            "--window" => demo.window = value.parse().unwrap_or(demo.window),
            "--loss" => demo.loss = value.parse().ok(),
            "--seed" => demo.seed = value.parse().unwrap_or(demo.seed),
            other => {
                warn!("알 수 없는 옵션: {}", other);
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    demo
}

/// 줄 번호가 붙은 텍스트 데이터
fn generate_test_text(size: usize) -> Bytes {
    let mut data = Vec::with_capacity(size);
    let mut line = 0u64;
    while data.len() < size {
        data.extend_from_slice(format!("[{:08}] The quick brown fox jumps over the lazy dog.\n", line).as_bytes());
        line += 1;
    }
    data.truncate(size);
    data.into()
}

async fn over_udp(config: Config, data: Bytes) -> Result<(TransferStats, Vec<u8>), Box<dyn std::error::Error>> {
    let recv_socket = UdpSocket::bind("127.0.0.1:0").await?;
    let ack_listener = TcpListener::bind("127.0.0.1:0").await?;
    let recv_addr = recv_socket.local_addr()?;
    let ack_addr = ack_listener.local_addr()?;

    let send_socket = UdpSender::bind_ephemeral(recv_addr).await?;
    let endpoints = Endpoints::new(send_socket.local_addr()?, recv_addr);
    let receiver_endpoints = Endpoints::new(recv_addr, ack_addr);

    let mut receiver = Receiver::new(
        config.clone(),
        receiver_endpoints,
        recv_socket,
        TcpAckConnector::new(ack_addr),
        Vec::new(),
    )?
    .with_event_log(Arc::new(TracingEventLog));
    let receiving = tokio::spawn(async move {
        let result = receiver.run().await;
        result.map(|_| receiver.into_sink())
    });

    let stats = Sender::new(config, endpoints, send_socket, ack_listener)?
        .with_event_log(Arc::new(TracingEventLog))
        .send(data)
        .await?;
    let sink = receiving.await??;
    Ok((stats, sink))
}

async fn over_simulator(
    config: Config,
    data: Bytes,
    loss: f64,
    seed: u64,
) -> Result<(TransferStats, Vec<u8>), Box<dyn std::error::Error>> {
    let (link_tx, link_rx, monitor) = datagram_link(LinkConfig::perfect().with_loss_rate(loss, seed));
    let (ack_source, ack_connector) = ack_pipe();
    let endpoints = Endpoints::new(
        SocketAddr::from(([127, 0, 0, 1], 40000)),
        SocketAddr::from(([127, 0, 0, 1], 9000)),
    );

    let mut receiver = Receiver::new(config.clone(), endpoints.reversed(), link_rx, ack_connector, Vec::new())?;
    let receiving = tokio::spawn(async move {
        let result = receiver.run().await;
        result.map(|_| receiver.into_sink())
    });

    let stats = Sender::new(config, endpoints, link_tx, ack_source)?.send(data).await?;
    let sink = receiving.await??;
    info!(
        "링크: 송신 {}회, 손실 {}회",
        monitor.transmissions(),
        monitor.dropped().len()
    );
    Ok((stats, sink))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args();
    let data = generate_test_text(args.size_kb * 1024);
    let config = Config {
        window_size: args.window,
        ..Config::loopback()
    };

    info!(
        "루프백 전송: {} bytes, window {}, loss {:?}",
        data.len(),
        args.window,
        args.loss
    );

    let started = Instant::now();
    let (stats, received) = match args.loss {
        Some(loss) => over_simulator(config, data.clone(), loss, args.seed).await?,
        None => over_udp(config, data.clone()).await?,
    };

    info!("{}", stats.summary());
    info!("총 소요: {:.2}s", started.elapsed().as_secs_f64());

    if received == data.as_ref() {
        info!("검증 성공: {} bytes 일치", received.len());
    } else {
        warn!("검증 실패: expected {} bytes, got {} bytes", data.len(), received.len());
        std::process::exit(1);
    }

    Ok(())
}
