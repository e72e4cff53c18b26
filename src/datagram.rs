//! 데이터그램 채널 추상화
//!
//! ARQ 엔진은 이 트레잇에만 의존하므로 실제 UDP 소켓과
//! 테스트 전용 시뮬레이터 링크(`simulator` 모듈)를 같은 코드로 다룸

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::message::Response;
use crate::{Error, Result, MAX_DATAGRAM_SIZE};

/// 비신뢰·비순서 데이터그램 채널
///
/// 손실, 중복, 재정렬이 일어날 수 있음. 타임아웃은 호출자가 건다.
pub trait DatagramChannel {
    /// 데이터그램 하나 전송
    fn send(&mut self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// 데이터그램 하나 수신, 길이 반환
    ///
    /// 취소 안전해야 함 (`tokio::time::timeout` 으로 감싸서 사용)
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// UDP 소켓 채널
///
/// - connected: `connect()` 된 소켓 (클라이언트)
/// - peer 고정: 공유 소켓에서 특정 주소만 주고받음 (서버)
#[derive(Debug, Clone)]
pub struct UdpChannel {
    socket: Arc<UdpSocket>,
    peer: Option<SocketAddr>,
}

impl UdpChannel {
    /// 임시 포트에 바인드 후 `remote` 로 connect
    pub async fn connect(remote: SocketAddr) -> Result<Self> {
        let bind_addr: SocketAddr = if remote.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(bind_addr).await.map_err(Error::Connection)?;
        socket.connect(remote).await.map_err(Error::Connection)?;
        debug!(
            "UDP 채널 생성: {} -> {}",
            socket.local_addr().map_err(Error::Connection)?,
            remote
        );

        Ok(Self {
            socket: Arc::new(socket),
            peer: None,
        })
    }

    /// 공유 소켓에서 `peer` 와만 통신하는 채널
    pub fn with_peer(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self {
            socket,
            peer: Some(peer),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DatagramChannel for UdpChannel {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        match self.peer {
            Some(peer) => self.socket.send_to(datagram, peer).await?,
            None => self.socket.send(datagram).await?,
        };
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.peer {
            None => self.socket.recv(buf).await,
            Some(peer) => loop {
                let (len, from) = self.socket.recv_from(buf).await?;
                if from == peer {
                    return Ok(len);
                }
                debug!("다른 주소의 데이터그램 무시: {}", from);
            },
        }
    }
}

/// 명령 한 줄 전송 후 응답 데이터그램 하나 대기
///
/// 재시도 없음. 재시도는 호출자 책임.
pub async fn request<D: DatagramChannel>(
    channel: &mut D,
    line: &str,
    timeout: Duration,
) -> Result<Response> {
    let mut datagram = String::with_capacity(line.len() + 1);
    datagram.push_str(line);
    datagram.push('\n');
    channel
        .send(datagram.as_bytes())
        .await
        .map_err(Error::Connection)?;

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let len = match tokio::time::timeout(timeout, channel.recv(&mut buf)).await {
        Ok(Ok(len)) => len,
        Ok(Err(e)) => return Err(Error::Connection(e)),
        Err(_) => return Err(Error::Timeout),
    };

    let text = std::str::from_utf8(&buf[..len])
        .map_err(|_| Error::Protocol("응답이 UTF-8 이 아님".into()))?;
    Ok(Response::new(text))
}
