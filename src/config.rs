//! 전송 설정

use std::path::PathBuf;
use std::time::Duration;

use crate::{
    DEFAULT_CHUNK_SIZE, DEFAULT_DATAGRAM_TIMEOUT_MS, DEFAULT_DOWNLOAD_DIR, DEFAULT_MAX_RETRIES,
    DEFAULT_PAYLOAD_SIZE, DEFAULT_STREAM_TIMEOUT_MS, MAX_PAYLOAD_SIZE,
};

/// SWFT 전송 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// ARQ 패킷 최대 페이로드 (바이트)
    pub payload_size: usize,

    /// 스트림 전송 청크 크기 (바이트)
    pub chunk_size: usize,

    /// UDP 수신 대기 타임아웃 (밀리초)
    /// ACK 대기, 패킷 대기, 명령 응답 대기에 모두 적용
    pub datagram_timeout_ms: u64,

    /// TCP 연결/수신 타임아웃 (밀리초)
    pub stream_timeout_ms: u64,

    /// 첫 전송 이후 재전송 횟수
    /// 패킷당 총 전송 시도 = max_retries + 1
    pub max_retries: u32,

    /// 다운로드 저장 디렉토리 (없으면 생성)
    pub download_dir: PathBuf,

    /// 다운로드 디렉토리에 같은 이름의 파일이 있으면 그 크기부터 이어받기 (TCP 만)
    pub resume_downloads: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            payload_size: DEFAULT_PAYLOAD_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            datagram_timeout_ms: DEFAULT_DATAGRAM_TIMEOUT_MS,
            stream_timeout_ms: DEFAULT_STREAM_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            resume_downloads: false,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    pub fn datagram_timeout(&self) -> Duration {
        Duration::from_millis(self.datagram_timeout_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }

    /// 패킷당 총 전송 시도 횟수
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// 페이로드 크기를 와이어 포맷 한도 안으로 보정
    pub fn effective_payload_size(&self) -> usize {
        self.payload_size.clamp(1, MAX_PAYLOAD_SIZE)
    }

    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }

    /// 다운로드 디렉토리 지정
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// 다운로드 이어받기 설정
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume_downloads = resume;
        self
    }

    /// 손실이 많은 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            payload_size: 512,      // 작은 패킷
            chunk_size: DEFAULT_CHUNK_SIZE,
            datagram_timeout_ms: 1000,
            stream_timeout_ms: 10_000,
            max_retries: 15,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            resume_downloads: false,
        }
    }

    /// 로컬 네트워크용 설정
    pub fn lan() -> Self {
        Self {
            payload_size: 1400,
            chunk_size: 64 * 1024,
            datagram_timeout_ms: 250,
            stream_timeout_ms: 2000,
            max_retries: 5,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            resume_downloads: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        let config = Config::default();
        assert_eq!(config.payload_size, 1024);
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.datagram_timeout(), Duration::from_secs(2));
        assert_eq!(config.stream_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_attempts(), 6);
        assert_eq!(config.download_dir, PathBuf::from("downloads"));
        assert!(!config.resume_downloads);
    }

    #[test]
    fn test_payload_clamped_to_wire_limit() {
        let config = Config {
            payload_size: 100_000,
            ..Config::default()
        };
        assert_eq!(config.effective_payload_size(), MAX_PAYLOAD_SIZE);

        let config = Config {
            payload_size: 0,
            chunk_size: 0,
            ..Config::default()
        };
        assert_eq!(config.effective_payload_size(), 1);
        assert_eq!(config.effective_chunk_size(), 1);
    }

    #[test]
    fn test_presets() {
        assert!(Config::lossy_network().max_retries > Config::default().max_retries);
        assert!(Config::lan().datagram_timeout() < Config::default().datagram_timeout());
    }
}
