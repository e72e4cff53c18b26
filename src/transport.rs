//! 전송 방식 추상화
//!
//! [`Transport`] 하나로 TCP 스트림과 UDP+ARQ 를 같은 코디네이터에서 사용.
//!
//! | 구현 | 명령 채널 | 대량 전송 |
//! |---|---|---|
//! | [`StreamTransport`] | 영속 TCP 연결 (끊기면 다음 호출에서 재연결) | 원시 바이트 청크 |
//! | [`DatagramTransport`] | 호출마다 새 UDP 소켓 | Stop-and-Wait ARQ |

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::control::{read_line, write_line};
use crate::datagram::{request, UdpChannel};
use crate::endpoint::{Endpoint, TransportMode};
use crate::message::{Command, Response};
use crate::receiver::ArqReceiver;
use crate::sender::ArqSender;
use crate::session::{CancelFlag, TransferSession};
use crate::stats::{Completion, TransferOutcome};
use crate::stream;
use crate::{Config, Error, Result};

/// 전송 방식 능력 인터페이스
pub trait Transport {
    fn mode(&self) -> TransportMode;

    /// 명령 한 줄 보내고 응답 한 줄 수신
    fn send_command(&mut self, text: &str) -> impl Future<Output = Result<Response>> + Send;

    /// 협상 후 로컬 파일 전송 (`session` 에 이름과 크기가 채워져 있어야 함)
    fn upload(
        &mut self,
        path: &Path,
        session: &mut TransferSession,
        cancel: &CancelFlag,
    ) -> impl Future<Output = Result<TransferOutcome>> + Send;

    /// 협상 후 원격 파일 수신 (`session` 의 크기는 협상 결과로 설정됨)
    fn download(
        &mut self,
        name: &str,
        session: &mut TransferSession,
        cancel: &CancelFlag,
    ) -> impl Future<Output = Result<TransferOutcome>> + Send;
}

/// 경로 구성요소를 제거한 파일 이름
///
/// 비어 있거나 `..` 같은 이름이면 `None`
pub fn base_name(name: &str) -> Option<&str> {
    Path::new(name.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
}

fn destination_path(dir: &Path, name: &str) -> Result<PathBuf> {
    base_name(name)
        .map(|name| dir.join(name))
        .ok_or_else(|| Error::Protocol(format!("저장할 수 없는 파일 이름: {name:?}")))
}

/// 다운로드 대상 파일 생성 (디렉토리 없으면 생성, 기존 파일 덮어씀)
async fn create_destination(dir: &Path, name: &str) -> Result<File> {
    let path = destination_path(dir, name)?;
    tokio::fs::create_dir_all(dir).await?;
    let file = File::create(path).await?;
    Ok(file)
}

/// 이미 받아 둔 부분의 크기 (없거나 일반 파일이 아니면 0)
async fn partial_len(dir: &Path, name: &str) -> Result<u64> {
    let path = destination_path(dir, name)?;
    match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => Ok(metadata.len()),
        Ok(_) => Ok(0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(Error::Io(e)),
    }
}

/// 이어받기용으로 기존 파일 끝에 덧붙여 열기
async fn append_destination(dir: &Path, name: &str) -> Result<File> {
    let path = destination_path(dir, name)?;
    let file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .await?;
    Ok(file)
}

/// TCP 스트림 전송
pub struct StreamTransport {
    endpoint: Endpoint,
    config: Config,
    conn: Option<BufReader<TcpStream>>,
}

impl StreamTransport {
    /// 연결은 첫 호출 때 맺음
    pub fn new(endpoint: Endpoint, config: Config) -> Self {
        Self {
            endpoint,
            config,
            conn: None,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// 현재 연결 (없으면 새로 연결)
    async fn connection(&mut self) -> Result<&mut BufReader<TcpStream>> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => connect(self.endpoint, self.config.stream_timeout()).await?,
        };
        Ok(self.conn.insert(conn))
    }

    /// 실패한 연결은 버리고 다음 호출에서 다시 연결
    ///
    /// 서버 거부는 줄 단위로 동기화된 상태이므로 연결 유지
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if !matches!(e, Error::ServerRejected(_)) && self.conn.take().is_some() {
                debug!("TCP 연결 폐기: {}", e);
            }
        }
        result
    }
}

async fn connect(endpoint: Endpoint, timeout: Duration) -> Result<BufReader<TcpStream>> {
    let addr = endpoint.socket_addr();
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(Error::Connection(e)),
        Err(_) => {
            return Err(Error::Connection(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("연결 타임아웃: {addr}"),
            )))
        }
    };
    stream.set_nodelay(true).map_err(Error::Connection)?;
    debug!("TCP 연결: {}", addr);

    Ok(BufReader::new(stream))
}

impl Transport for StreamTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Stream
    }

    async fn send_command(&mut self, text: &str) -> Result<Response> {
        let timeout = self.config.stream_timeout();
        let result = match self.connection().await {
            Ok(conn) => exchange(conn, text, timeout).await,
            Err(e) => Err(e),
        };
        self.settle(result)
    }

    async fn upload(
        &mut self,
        path: &Path,
        session: &mut TransferSession,
        cancel: &CancelFlag,
    ) -> Result<TransferOutcome> {
        let mut file = File::open(path).await?;
        let command = Command::Upload {
            name: session.filename().to_string(),
            size: session.total_size(),
        };
        let chunk_size = self.config.effective_chunk_size();
        let timeout = self.config.stream_timeout();

        let result = match self.connection().await {
            Ok(conn) => {
                stream_upload(conn, &mut file, &command, session, chunk_size, timeout, cancel).await
            }
            Err(e) => Err(e),
        };
        self.settle(result)
    }

    async fn download(
        &mut self,
        name: &str,
        session: &mut TransferSession,
        cancel: &CancelFlag,
    ) -> Result<TransferOutcome> {
        let offset = if self.config.resume_downloads {
            partial_len(&self.config.download_dir, name).await?
        } else {
            0
        };
        let command = Command::Download {
            name: name.to_string(),
            offset,
        };
        let options = DownloadOptions {
            dir: self.config.download_dir.clone(),
            chunk_size: self.config.effective_chunk_size(),
            timeout: self.config.stream_timeout(),
        };

        let result = match self.connection().await {
            Ok(conn) => stream_download(conn, &command, name, &options, session, cancel).await,
            Err(e) => Err(e),
        };
        self.settle(result)
    }
}

async fn exchange<C>(conn: &mut C, text: &str, timeout: Duration) -> Result<Response>
where
    C: AsyncBufRead + AsyncWrite + Unpin,
{
    write_line(conn, text).await?;
    read_line(conn, timeout).await
}

/// `UPLOAD` 협상 → 원시 바이트 → 마지막 확인 줄
async fn stream_upload<C, R>(
    conn: &mut C,
    file: &mut R,
    command: &Command,
    session: &mut TransferSession,
    chunk_size: usize,
    timeout: Duration,
    cancel: &CancelFlag,
) -> Result<TransferOutcome>
where
    C: AsyncBufRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let response = exchange(conn, &command.to_line(), timeout).await?;
    if !response.is_ready() {
        return Err(Error::ServerRejected(response.into_text()));
    }

    stream::send_file(conn, file, session, chunk_size, cancel).await?;

    // 내용은 검증하지 않음
    let confirmation = read_line(conn, timeout).await?;
    Ok(TransferOutcome::stream(Some(confirmation.into_text())))
}

struct DownloadOptions {
    dir: PathBuf,
    chunk_size: usize,
    timeout: Duration,
}

/// `DOWNLOAD` 협상 → 대상 파일 준비 → 선언 크기만큼 수신
///
/// 명령에 오프셋이 있으면 응답 크기는 남은 부분이고 기존 파일 끝에 덧붙임
async fn stream_download<C>(
    conn: &mut C,
    command: &Command,
    name: &str,
    options: &DownloadOptions,
    session: &mut TransferSession,
    cancel: &CancelFlag,
) -> Result<TransferOutcome>
where
    C: AsyncBufRead + AsyncWrite + Unpin,
{
    let response = exchange(conn, &command.to_line(), options.timeout).await?;
    let size = response.ready_size()?;
    session.set_total_size(size);

    let offset = match command {
        Command::Download { offset, .. } => *offset,
        _ => 0,
    };
    let mut file = if offset > 0 {
        debug!("이어받기: {} (offset {}, 남은 {} bytes)", name, offset, size);
        append_destination(&options.dir, name).await?
    } else {
        create_destination(&options.dir, name).await?
    };
    stream::receive_file(
        conn,
        &mut file,
        session,
        options.chunk_size,
        options.timeout,
        cancel,
    )
    .await?;

    Ok(TransferOutcome::stream(None).resumed_from(offset))
}

/// UDP 전송 (Stop-and-Wait ARQ)
///
/// 작업마다 새 임시 포트 소켓을 쓰고, 협상과 데이터 교환이 같은 소켓을 공유
pub struct DatagramTransport {
    endpoint: Endpoint,
    config: Config,
}

impl DatagramTransport {
    pub fn new(endpoint: Endpoint, config: Config) -> Self {
        Self { endpoint, config }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Transport for DatagramTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Datagram
    }

    async fn send_command(&mut self, text: &str) -> Result<Response> {
        let mut channel = UdpChannel::connect(self.endpoint.socket_addr()).await?;
        request(&mut channel, text, self.config.datagram_timeout()).await
    }

    async fn upload(
        &mut self,
        path: &Path,
        session: &mut TransferSession,
        cancel: &CancelFlag,
    ) -> Result<TransferOutcome> {
        let mut file = File::open(path).await?;
        let mut channel = UdpChannel::connect(self.endpoint.socket_addr()).await?;

        let command = Command::UdpUpload {
            name: session.filename().to_string(),
            size: session.total_size(),
        };
        let timeout = self.config.datagram_timeout();
        let response = request(&mut channel, &command.to_line(), timeout).await?;
        if !response.is_exact_ready() {
            return Err(Error::ServerRejected(response.into_text()));
        }

        let mut sender = ArqSender::new(channel, &self.config).with_cancel(cancel.clone());
        let stats = sender.send(&mut file, session).await?;
        Ok(TransferOutcome::arq(Completion::Acknowledged, stats))
    }

    async fn download(
        &mut self,
        name: &str,
        session: &mut TransferSession,
        cancel: &CancelFlag,
    ) -> Result<TransferOutcome> {
        let mut channel = UdpChannel::connect(self.endpoint.socket_addr()).await?;

        let command = Command::UdpDownload {
            name: name.to_string(),
        };
        let timeout = self.config.datagram_timeout();
        let response = request(&mut channel, &command.to_line(), timeout).await?;
        let size = response.ready_size()?;
        session.set_total_size(size);

        let mut file = create_destination(&self.config.download_dir, name).await?;
        let mut receiver = ArqReceiver::new(channel, &self.config).with_cancel(cancel.clone());
        let (completion, stats) = receiver.receive(&mut file, session).await?;
        Ok(TransferOutcome::arq(completion, stats))
    }
}
