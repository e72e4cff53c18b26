//! 피어 서버
//!
//! 클라이언트와 같은 프로토콜을 말하는 TCP/UDP 서버.
//!
//! - TCP: 연결마다 태스크 하나, 줄 단위 명령 루프
//! - UDP: 명령을 하나씩 순서대로 처리 (전송 중에는 다른 주소의 데이터그램을 버림)
//!
//! 받은 파일 이름은 마지막 경로 구성요소만 사용하며 저장소 디렉토리 밖으로 나가지 않음.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::fs::File;
use tokio::io::{AsyncSeekExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{debug, info, warn};

use crate::control::{next_line, write_line};
use crate::datagram::{DatagramChannel, UdpChannel};
use crate::message::Command;
use crate::receiver::ArqReceiver;
use crate::sender::ArqSender;
use crate::session::{CancelFlag, Direction, TransferSession};
use crate::stream::{receive_file, send_file};
use crate::transport::base_name;
use crate::{
    Config, Error, Result, DEFAULT_STORAGE_DIR, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT,
    MAX_DATAGRAM_SIZE,
};

/// 업로드 완료 확인 줄
pub const UPLOAD_COMPLETE: &str = "File upload complete.";

/// 파일 없음 응답
pub const FILE_NOT_FOUND: &str = "ERROR: File not found";

/// accept 실패 후 재시도 대기 (fd 고갈 등 지속되는 에러에서 공회전 방지)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// 서버 설정
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tcp_addr: SocketAddr,
    pub udp_addr: SocketAddr,

    /// 업로드 저장 및 다운로드 제공 디렉토리 (없으면 생성)
    pub storage_dir: PathBuf,

    pub config: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_TCP_PORT)),
            udp_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_UDP_PORT)),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            config: Config::default(),
        }
    }
}

impl ServerConfig {
    /// 루프백 임시 포트 설정 (테스트용)
    pub fn loopback(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            tcp_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            udp_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            storage_dir: storage_dir.into(),
            config: Config::default(),
        }
    }
}

/// 저장소 디렉토리와 전송 설정 (모든 핸들러가 공유, 읽기 전용)
#[derive(Debug)]
struct Storage {
    dir: PathBuf,
    config: Config,
}

impl Storage {
    fn path_for(&self, name: &str) -> Option<PathBuf> {
        base_name(name).map(|name| self.dir.join(name))
    }
}

/// 피어 서버
pub struct Server {
    tcp: TcpListener,
    udp: Arc<UdpSocket>,
    storage: Storage,
}

impl Server {
    /// 저장소 디렉토리 생성 후 두 소켓 바인드
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.storage_dir).await?;

        let tcp = TcpListener::bind(config.tcp_addr)
            .await
            .map_err(Error::Connection)?;
        let udp = UdpSocket::bind(config.udp_addr)
            .await
            .map_err(Error::Connection)?;

        Ok(Self {
            tcp,
            udp: Arc::new(udp),
            storage: Storage {
                dir: config.storage_dir,
                config: config.config,
            },
        })
    }

    pub fn tcp_local_addr(&self) -> Result<SocketAddr> {
        self.tcp.local_addr().map_err(Error::Connection)
    }

    pub fn udp_local_addr(&self) -> Result<SocketAddr> {
        self.udp.local_addr().map_err(Error::Connection)
    }

    /// TCP/UDP 루프 실행 (정상적으로는 반환하지 않음)
    pub async fn run(self) -> Result<()> {
        info!(
            "서버 시작: TCP {}, UDP {}, 저장소 {:?}",
            self.tcp_local_addr()?,
            self.udp_local_addr()?,
            self.storage.dir
        );

        let storage = Arc::new(self.storage);
        tokio::try_join!(
            serve_tcp(self.tcp, storage.clone()),
            serve_udp(self.udp, storage),
        )?;
        Ok(())
    }
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────
// TCP
// ─────────────────────────────────────────────────────────────────

async fn serve_tcp(listener: TcpListener, storage: Arc<Storage>) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("TCP accept 에러: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        debug!("TCP 클라이언트 연결: {}", peer);
        let storage = storage.clone();
        tokio::spawn(async move {
            match handle_tcp_client(stream, &storage).await {
                Ok(()) => debug!("TCP 클라이언트 종료: {}", peer),
                Err(e) => warn!("TCP 클라이언트 {} 처리 에러: {}", peer, e),
            }
        });
    }
}

async fn handle_tcp_client(stream: TcpStream, storage: &Storage) -> Result<()> {
    let mut conn = BufReader::new(stream);

    loop {
        let line = match next_line(&mut conn).await {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                write_line(&mut conn, "ERROR: invalid command line").await?;
                continue;
            }
            Err(e) => return Err(Error::Connection(e)),
        };
        if line.trim().is_empty() {
            continue;
        }

        match Command::parse(&line) {
            Ok(Command::Upload { name, size }) => {
                tcp_receive_upload(&mut conn, storage, &name, size).await?
            }
            Ok(Command::Download { name, offset }) => {
                tcp_send_download(&mut conn, storage, &name, offset).await?
            }
            Ok(Command::Echo(text)) => write_line(&mut conn, &text).await?,
            Ok(Command::Time) => write_line(&mut conn, &epoch_seconds().to_string()).await?,
            Ok(Command::Close) => return Ok(()),
            Ok(_) => write_line(&mut conn, "Unknown command").await?,
            Err(Error::Protocol(msg)) => write_line(&mut conn, &format!("ERROR: {msg}")).await?,
            Err(e) => return Err(e),
        }
    }
}

async fn tcp_receive_upload(
    conn: &mut BufReader<TcpStream>,
    storage: &Storage,
    name: &str,
    size: u64,
) -> Result<()> {
    let Some(path) = storage.path_for(name) else {
        return write_line(conn, "ERROR: invalid file name").await;
    };
    let mut file = match File::create(&path).await {
        Ok(file) => file,
        Err(e) => {
            warn!("파일 생성 실패 {:?}: {}", path, e);
            return write_line(conn, "ERROR: cannot create file").await;
        }
    };

    write_line(conn, "READY").await?;

    let mut session = TransferSession::new(name, Direction::Upload, size);
    let config = &storage.config;
    receive_file(
        conn,
        &mut file,
        &mut session,
        config.effective_chunk_size(),
        config.stream_timeout(),
        &CancelFlag::new(),
    )
    .await?;

    write_line(conn, UPLOAD_COMPLETE).await?;
    info!("TCP 업로드 수신: {:?} ({} bytes)", path, size);
    Ok(())
}

/// `offset` 부터 남은 부분 전송 (`READY <남은 크기>`)
///
/// 파일보다 큰 오프셋은 파일 끝으로 보정
async fn tcp_send_download(
    conn: &mut BufReader<TcpStream>,
    storage: &Storage,
    name: &str,
    offset: u64,
) -> Result<()> {
    let Some((mut file, size)) = open_stored(storage, name).await else {
        return write_line(conn, FILE_NOT_FOUND).await;
    };

    let offset = offset.min(size);
    if offset > 0 {
        if let Err(e) = file.seek(io::SeekFrom::Start(offset)).await {
            warn!("파일 탐색 실패 {}@{}: {}", name, offset, e);
            return write_line(conn, "ERROR: Cannot open file").await;
        }
        debug!("이어받기 요청: {} (offset {})", name, offset);
    }
    let remaining = size - offset;

    write_line(conn, &format!("READY {remaining}")).await?;

    let mut session = TransferSession::new(name, Direction::Download, remaining);
    send_file(
        conn,
        &mut file,
        &mut session,
        storage.config.effective_chunk_size(),
        &CancelFlag::new(),
    )
    .await?;

    info!(
        "TCP 다운로드 제공: {} ({} bytes, offset {})",
        name, remaining, offset
    );
    Ok(())
}

/// 저장된 일반 파일 열기 (없거나 디렉토리면 `None`)
async fn open_stored(storage: &Storage, name: &str) -> Option<(File, u64)> {
    let path = storage.path_for(name)?;
    let metadata = tokio::fs::metadata(&path).await.ok()?;
    if !metadata.is_file() {
        return None;
    }
    let file = File::open(&path).await.ok()?;
    Some((file, metadata.len()))
}

// ─────────────────────────────────────────────────────────────────
// UDP
// ─────────────────────────────────────────────────────────────────

async fn serve_udp(socket: Arc<UdpSocket>, storage: Arc<Storage>) -> Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("UDP 수신 에러: {}", e);
                continue;
            }
        };

        let Some(text) = command_text(&buf[..len]) else {
            debug!("명령이 아닌 데이터그램 무시: {} ({} bytes)", peer, len);
            continue;
        };

        let mut channel = UdpChannel::with_peer(socket.clone(), peer);
        if let Err(e) = handle_udp_command(&mut channel, &storage, &text).await {
            warn!("UDP 명령 처리 에러 ({}): {}", peer, e);
        }
    }
}

/// 텍스트 명령으로 볼 수 있는 데이터그램만 통과
///
/// 전송이 끝난 뒤 늦게 도착한 데이터 패킷이나 센티널은 걸러짐
fn command_text(datagram: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(datagram).ok()?;
    if text.chars().any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t') {
        return None;
    }
    Some(text.to_string())
}

async fn handle_udp_command(
    channel: &mut UdpChannel,
    storage: &Storage,
    text: &str,
) -> Result<()> {
    match Command::parse(text) {
        Ok(Command::UdpDownload { name }) => udp_send_download(channel, storage, &name).await,
        Ok(Command::UdpUpload { name, size }) => {
            udp_receive_upload(channel, storage, &name, size).await
        }
        Ok(Command::Time) => reply(channel, &epoch_seconds().to_string()).await,
        Ok(Command::Ack { seq }) => {
            debug!("늦게 도착한 ACK 무시: {}", seq);
            Ok(())
        }
        Ok(_) => reply(channel, "UNKNOWN COMMAND").await,
        Err(Error::Protocol(msg)) => reply(channel, &format!("ERROR: {msg}")).await,
        Err(e) => Err(e),
    }
}

async fn reply(channel: &mut UdpChannel, line: &str) -> Result<()> {
    let datagram = format!("{line}\n");
    channel
        .send(datagram.as_bytes())
        .await
        .map_err(Error::Connection)
}

async fn udp_send_download(channel: &mut UdpChannel, storage: &Storage, name: &str) -> Result<()> {
    let Some((mut file, size)) = open_stored(storage, name).await else {
        return reply(channel, FILE_NOT_FOUND).await;
    };

    reply(channel, &format!("READY {size}")).await?;

    let mut session = TransferSession::new(name, Direction::Download, size);
    let mut sender = ArqSender::new(channel.clone(), &storage.config);
    let stats = sender.send(&mut file, &mut session).await?;

    info!(
        "UDP 다운로드 제공: {} ({} bytes, 재전송 {})",
        name, size, stats.retransmissions
    );
    Ok(())
}

async fn udp_receive_upload(
    channel: &mut UdpChannel,
    storage: &Storage,
    name: &str,
    size: u64,
) -> Result<()> {
    let Some(path) = storage.path_for(name) else {
        return reply(channel, "ERROR: invalid file name").await;
    };
    let mut file = match File::create(&path).await {
        Ok(file) => file,
        Err(e) => {
            warn!("파일 생성 실패 {:?}: {}", path, e);
            return reply(channel, "ERROR: cannot create file").await;
        }
    };

    reply(channel, "READY").await?;

    let mut session = TransferSession::new(name, Direction::Upload, size);
    let mut receiver = ArqReceiver::new(channel.clone(), &storage.config);
    let result = receiver.receive(&mut file, &mut session).await;
    drop(file);

    match result {
        Ok((completion, _)) if session.is_complete() => {
            info!(
                "UDP 업로드 수신: {:?} ({} bytes, {})",
                path, size, completion
            );
            Ok(())
        }
        Ok(_) => {
            remove_partial(&path).await;
            Err(Error::Incomplete {
                received: session.transferred_bytes(),
                expected: size,
            })
        }
        Err(e) => {
            remove_partial(&path).await;
            Err(e)
        }
    }
}

async fn remove_partial(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("불완전한 업로드 삭제: {:?}", path),
        Err(e) => warn!("불완전한 업로드 삭제 실패 {:?}: {}", path, e),
    }
}
