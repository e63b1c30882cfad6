//! 전송 추상화
//!
//! 엔진은 소켓을 직접 알지 못한다. 데이터 경로는 [`DatagramSend`]/
//! [`DatagramRecv`], ACK 백채널은 [`AckSource`]/[`AckConnector`]를 거친다.
//! tokio UDP/TCP 구현을 제공하고, 테스트는 [`crate::simulator`]의
//! 메모리 링크를 쓴다.
//!
//! async trait 매크로 없이 박스 future를 반환한다.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::debug;

/// 박스 future 별칭
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 데이터그램 송신
pub trait DatagramSend: Send + Sync {
    /// 데이터그램 하나를 원자적으로 전송, 보낸 바이트 수 반환
    fn send_datagram<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, io::Result<usize>>;
}

/// 데이터그램 수신
pub trait DatagramRecv: Send {
    /// 데이터그램 하나를 버퍼에 수신, 받은 바이트 수 반환
    fn recv_datagram<'a>(&'a mut self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>>;
}

/// ACK 스트림 수락측 (송신자)
pub trait AckSource: Send {
    type Stream: AsyncRead + Unpin + Send + 'static;

    /// 수신자의 연결을 하나 수락
    fn accept_stream(&mut self) -> BoxFuture<'_, io::Result<Self::Stream>>;
}

/// ACK 스트림 연결측 (수신자)
pub trait AckConnector: Send {
    type Stream: AsyncWrite + Unpin + Send + 'static;

    /// 송신자에게 연결
    fn connect_stream(&mut self) -> BoxFuture<'_, io::Result<Self::Stream>>;
}

/// 목적지가 고정된 UDP 송신 소켓
#[derive(Debug)]
pub struct UdpSender {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpSender {
    pub fn new(socket: UdpSocket, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }

    /// 임의 포트에 바인딩 (IPv4/IPv6는 peer를 따름)
    pub async fn bind_ephemeral(peer: SocketAddr) -> io::Result<Self> {
        let bind_addr: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        Ok(Self::new(socket, peer))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DatagramSend for UdpSender {
    fn send_datagram<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(async move { self.socket.send_to(data, self.peer).await })
    }
}

/// 바인딩된 수신 소켓, 출발지는 따지지 않음
impl DatagramRecv for UdpSocket {
    fn recv_datagram<'a>(&'a mut self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(async move {
            let (len, _from) = self.recv_from(buf).await?;
            Ok(len)
        })
    }
}

impl AckSource for TcpListener {
    type Stream = TcpStream;

    fn accept_stream(&mut self) -> BoxFuture<'_, io::Result<TcpStream>> {
        Box::pin(async move {
            let (stream, addr) = self.accept().await?;
            debug!("ACK 채널 연결 수락: {}", addr);
            Ok(stream)
        })
    }
}

/// 송신자 ACK 포트로 TCP 연결
#[derive(Debug, Clone, Copy)]
pub struct TcpAckConnector {
    addr: SocketAddr,
}

impl TcpAckConnector {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

impl AckConnector for TcpAckConnector {
    type Stream = TcpStream;

    fn connect_stream(&mut self) -> BoxFuture<'_, io::Result<TcpStream>> {
        Box::pin(async move {
            let stream = TcpStream::connect(self.addr).await?;
            stream.set_nodelay(true)?;
            debug!("ACK 채널 연결: {}", self.addr);
            Ok(stream)
        })
    }
}

/// 헤더 포트와 로그 주소를 만드는 양 끝점
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

impl Endpoints {
    pub fn new(local: SocketAddr, remote: SocketAddr) -> Self {
        Self { local, remote }
    }

    pub fn local_port(&self) -> u16 {
        self.local.port()
    }

    pub fn remote_port(&self) -> u16 {
        self.remote.port()
    }

    /// 상대편 관점의 끝점
    pub fn reversed(&self) -> Self {
        Self {
            local: self.remote,
            remote: self.local,
        }
    }
}
