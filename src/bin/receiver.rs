//! RFT 수신자 - UDP로 세그먼트를 받아 파일에 추가하고 TCP로 ACK 전송
//!
//! 사용법:
//!   rft-receiver <file> <listening_port> <sender_ip> <sender_port> <log_file>
//!
//! 예시:
//!   rft-receiver out.bin 9000 127.0.0.1 9001 receiver.log

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::BufWriter;
use tokio::net::{lookup_host, UdpSocket};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rft::transport::TcpAckConnector;
use rft::{Config, Endpoints, Error, FileEventLog, Receiver};

const USAGE: &str = "사용법: rft-receiver <file> <listening_port> <sender_ip> <sender_port> <log_file>";

/// 명령행 인자
struct ReceiverArgs {
    file: PathBuf,
    listening_port: u16,
    sender_host: String,
    sender_port: u16,
    log_file: PathBuf,
}

fn parse_field<T: FromStr>(value: &str, name: &str) -> rft::Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("{}: {:?}", name, value)))
}

fn parse_args(args: &[String]) -> rft::Result<ReceiverArgs> {
    if args.len() != 6 {
        return Err(Error::InvalidArgument(format!(
            "인자 {}개 (5개 필요)",
            args.len().saturating_sub(1)
        )));
    }

    Ok(ReceiverArgs {
        file: PathBuf::from(&args[1]),
        listening_port: parse_field(&args[2], "listening_port")?,
        sender_host: args[3].clone(),
        sender_port: parse_field(&args[4], "sender_port")?,
        log_file: PathBuf::from(&args[5]),
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

    let sender_addr = resolve(&args.sender_host, args.sender_port).await?;
    let socket = UdpSocket::bind(("0.0.0.0", args.listening_port)).await?;
    let endpoints = Endpoints::new(socket.local_addr()?, sender_addr);
    info!("UDP 수신: {}, ACK → {}", endpoints.local, sender_addr);

    // 세그먼트마다 파일 끝에 추가
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.file)
        .await?;

    let event_log = Arc::new(FileEventLog::open(&args.log_file)?);
    let mut receiver = Receiver::new(
        Config::default(),
        endpoints,
        socket,
        TcpAckConnector::new(sender_addr),
        BufWriter::new(file),
    )?
    .with_event_log(event_log);

    let stats = receiver.run().await?;
    info!("{}", stats.summary());
    println!("Delivery completed successfully");

    Ok(())
}
