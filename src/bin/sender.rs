//! RFT 송신자 - 파일을 UDP로 전송하고 TCP 백채널로 ACK 수신
//!
//! 사용법:
//!   rft-sender <file> <remote_ip> <remote_port> <ack_port> <log_file> [window_size]
//!
//! 예시:
//!   # window 1 (기본)
//!   rft-sender data.bin 127.0.0.1 9000 9001 sender.log
//!
//!   # window 8, 이벤트 로그를 표준출력으로
//!   rft-sender data.bin 10.0.0.2 9000 9001 stdout 8

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::{lookup_host, TcpListener};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rft::transport::UdpSender;
use rft::{Config, Endpoints, Error, FileEventLog, Sender, DEFAULT_WINDOW_SIZE};

const USAGE: &str = "사용법: rft-sender <file> <remote_ip> <remote_port> <ack_port> <log_file> [window_size]";

/// 명령행 인자
struct SenderArgs {
    file: PathBuf,
    remote_host: String,
    remote_port: u16,
    ack_port: u16,
    log_file: PathBuf,
    window_size: usize,
}

fn parse_field<T: FromStr>(value: &str, name: &str) -> rft::Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("{}: {:?}", name, value)))
}

fn parse_args(args: &[String]) -> rft::Result<SenderArgs> {
    if args.len() != 6 && args.len() != 7 {
        return Err(Error::InvalidArgument(format!(
            "인자 {}개 (5개 또는 6개 필요)",
            args.len().saturating_sub(1)
        )));
    }

    let window_size = match args.get(6) {
        Some(value) => parse_field(value, "window_size")?,
        None => DEFAULT_WINDOW_SIZE,
    };

    Ok(SenderArgs {
        file: PathBuf::from(&args[1]),
        remote_host: args[2].clone(),
        remote_port: parse_field(&args[3], "remote_port")?,
        ack_port: parse_field(&args[4], "ack_port")?,
        log_file: PathBuf::from(&args[5]),
        window_size,
    })
}

async fn resolve(host: &str, port: u16) -> rft::Result<SocketAddr> {
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| Error::InvalidArgument(format!("주소 해석 실패: {}", host)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정 (RUST_LOG, 기본 info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let raw: Vec<String> = std::env::args().collect();
    if raw.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let config = Config::with_window(args.window_size);
    config.validate()?;

    let data = Bytes::from(tokio::fs::read(&args.file).await?);
    info!("파일 로드: {:?} ({} bytes)", args.file, data.len());

    let remote = resolve(&args.remote_host, args.remote_port).await?;
    let ack_listener = TcpListener::bind(("0.0.0.0", args.ack_port)).await?;
    let socket = UdpSender::bind_ephemeral(remote).await?;
    let endpoints = Endpoints::new(socket.local_addr()?, remote);

    info!("UDP {} → {}", endpoints.local, remote);
    info!("ACK 포트: {}", ack_listener.local_addr()?);
    info!("Window: {} (sequence range {})", config.window_size, config.sequence_range());

    let event_log = Arc::new(FileEventLog::open(&args.log_file)?);
    let sender = Sender::new(config, endpoints, socket, ack_listener)?.with_event_log(event_log);
    let stats = sender.send(data).await?;

    println!("{}", stats.summary());
    println!("Amount of Data transferred: {} bytes", stats.bytes_sent);
    println!("Number of Segments sent: {}", stats.segments_sent);
    println!("Number of Segments retransmitted: {}", stats.retransmissions);

    Ok(())
}
