//! 전송 세션과 세션 코디네이터
//!
//! - [`TransferSession`]: 작업 하나의 상태 (작업 종료 시 소멸)
//! - [`Session`]: 전송 방식을 고정한 채 업로드/다운로드/명령을 조율
//! - [`CancelFlag`]: 청크/재전송 사이에 확인하는 협조적 취소

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::endpoint::TransportMode;
use crate::message::Response;
use crate::stats::{TransferOutcome, TransferReport};
use crate::transport::Transport;
use crate::{Error, Result};

/// 전송 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => f.write_str("Upload"),
            Direction::Download => f.write_str("Download"),
        }
    }
}

/// 진행 이벤트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// 이번에 이동한 바이트
    pub chunk: usize,
    pub transferred: u64,
    pub total: u64,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.transferred as f64 * 100.0 / self.total as f64
    }
}

/// 진행 콜백
pub type ProgressFn = Box<dyn FnMut(Progress) + Send>;

/// 작업 하나의 전송 상태
///
/// 작업을 실행하는 태스크가 독점 소유
pub struct TransferSession {
    filename: String,
    direction: Direction,
    total_size: u64,
    transferred_bytes: u64,
    start_time: Instant,
    observer: Option<ProgressFn>,
}

impl TransferSession {
    pub fn new(filename: impl Into<String>, direction: Direction, total_size: u64) -> Self {
        Self {
            filename: filename.into(),
            direction,
            total_size,
            transferred_bytes: 0,
            start_time: Instant::now(),
            observer: None,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// 협상으로 크기가 정해졌을 때 (다운로드)
    pub fn set_total_size(&mut self, total_size: u64) {
        self.total_size = total_size;
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }

    pub fn remaining(&self) -> u64 {
        self.total_size.saturating_sub(self.transferred_bytes)
    }

    pub fn is_complete(&self) -> bool {
        self.transferred_bytes >= self.total_size
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 첫 바이트 이동 직전 호출: 시작 시각 기록
    pub fn begin(&mut self) {
        self.transferred_bytes = 0;
        self.start_time = Instant::now();
    }

    /// 청크 이동 기록
    pub fn advance(&mut self, bytes: usize) {
        self.transferred_bytes += bytes as u64;

        if let Some(observer) = self.observer.as_mut() {
            observer(Progress {
                chunk: bytes,
                transferred: self.transferred_bytes,
                total: self.total_size,
            });
        }
    }

    pub fn set_observer(&mut self, observer: ProgressFn) {
        self.observer = Some(observer);
    }

    pub fn take_observer(&mut self) -> Option<ProgressFn> {
        self.observer.take()
    }
}

impl fmt::Debug for TransferSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferSession")
            .field("filename", &self.filename)
            .field("direction", &self.direction)
            .field("total_size", &self.total_size)
            .field("transferred_bytes", &self.transferred_bytes)
            .field("start_time", &self.start_time)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// 협조적 취소 플래그
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// 다음 작업을 위해 해제
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 취소됐으면 `Error::Cancelled`
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// 세션 코디네이터
///
/// 전송 방식은 생성 시 고정. 작업 사이에 세션 상태는 남지 않음.
pub struct Session<T: Transport> {
    transport: T,
    cancel: CancelFlag,
    observer: Option<ProgressFn>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            cancel: CancelFlag::new(),
            observer: None,
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.transport.mode()
    }

    /// 외부 인터럽트 연결용
    ///
    /// 취소는 진행 중인 (없으면 다음) 업로드/다운로드 하나에만 적용되고,
    /// 그 작업이 끝나면 플래그가 해제됨
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// 진행 콜백 등록 (모든 이후 작업에 적용)
    pub fn on_progress(&mut self, observer: impl FnMut(Progress) + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// 명령 한 줄 전송, 응답 한 줄 반환
    pub async fn send_command(&mut self, text: &str) -> Result<Response> {
        if text.contains(['\n', '\r']) {
            return Err(Error::Protocol("명령에 개행 포함".into()));
        }
        self.transport.send_command(text).await
    }

    /// 로컬 파일 업로드
    pub async fn upload(&mut self, path: impl AsRef<Path>) -> Result<TransferReport> {
        let result = self.run_upload(path.as_ref()).await;
        self.cancel.reset();
        result
    }

    /// 원격 파일 다운로드 (`Config::download_dir` 아래 저장)
    pub async fn download(&mut self, name: &str) -> Result<TransferReport> {
        let result = self.run_download(name).await;
        self.cancel.reset();
        result
    }

    async fn run_upload(&mut self, path: &Path) -> Result<TransferReport> {
        self.cancel.check()?;

        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("파일이 아님: {}", path.display()),
            )));
        }

        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::Protocol(format!("파일 이름 없음: {}", path.display())))?;
        validate_name(name)?;

        let mut session = TransferSession::new(name, Direction::Upload, metadata.len());
        info!(
            "Uploading {} ({} bytes) over {}",
            name,
            metadata.len(),
            self.mode()
        );

        if let Some(observer) = self.observer.take() {
            session.set_observer(observer);
        }
        let result = self.transport.upload(path, &mut session, &self.cancel).await;
        self.finish(session, result)
    }

    async fn run_download(&mut self, name: &str) -> Result<TransferReport> {
        self.cancel.check()?;
        validate_name(name)?;

        let mut session = TransferSession::new(name, Direction::Download, 0);
        info!("Downloading {} over {}", name, self.mode());

        if let Some(observer) = self.observer.take() {
            session.set_observer(observer);
        }
        let result = self.transport.download(name, &mut session, &self.cancel).await;
        self.finish(session, result)
    }

    /// 콜백 회수 후 보고서 생성
    fn finish(
        &mut self,
        mut session: TransferSession,
        result: Result<TransferOutcome>,
    ) -> Result<TransferReport> {
        self.observer = session.take_observer();

        match result {
            Ok(outcome) => {
                let report = TransferReport::new(&session, self.transport.mode(), outcome);
                info!("{}", report.summary());
                Ok(report)
            }
            Err(e) => {
                warn!(
                    "{} {} 실패 ({}/{} bytes): {}",
                    session.direction(),
                    session.filename(),
                    session.transferred_bytes(),
                    session.total_size(),
                    e
                );
                Err(e)
            }
        }
    }
}

/// 한 줄 프로토콜에 실을 수 있는 이름인지 확인
fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains(['\n', '\r']) {
        return Err(Error::Protocol(format!("사용할 수 없는 파일 이름: {name:?}")));
    }
    Ok(())
}
