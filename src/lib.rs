//! # SWFT (Stop-and-Wait File Transfer)
//!
//! TCP/UDP 겸용 파일 전송 엔진
//!
//! ## 핵심 특징
//! - **명령 채널**: 한 줄 텍스트 요청/응답으로 전송 협상 (`UPLOAD`, `DOWNLOAD`, ...)
//! - **스트림 전송**: TCP 연결 위에서 고정 크기 청크로 원시 바이트 복사
//! - **Stop-and-Wait ARQ**: UDP 위에서 seq/ACK/재전송/종료 센티널로 순서·신뢰성 보장
//! - **전송 추상화**: `Transport` 하나로 두 전송 방식을 같은 코디네이터에서 사용
//! - **피어 서버**: 같은 프로토콜을 말하는 TCP/UDP 서버 포함

pub mod config;
pub mod control;
pub mod datagram;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod session;
#[cfg(test)]
mod simulator;
pub mod stats;
pub mod stream;
pub mod transport;

pub use config::Config;
pub use datagram::{DatagramChannel, UdpChannel};
pub use endpoint::{Endpoint, TransportMode};
pub use error::{Error, Result};
pub use message::{Command, Response};
pub use packet::Packet;
pub use receiver::ArqReceiver;
pub use sender::ArqSender;
pub use server::{Server, ServerConfig};
pub use session::{CancelFlag, Direction, Progress, Session, TransferSession};
pub use stats::{ArqStats, Completion, TransferOutcome, TransferReport};
pub use transport::{DatagramTransport, StreamTransport, Transport};

/// 기본 ARQ 페이로드 크기 (바이트)
pub const DEFAULT_PAYLOAD_SIZE: usize = 1024;

/// 기본 스트림 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// UDP 데이터그램 최대 크기 (이더넷 MTU 1500 - IP 20 - UDP 8)
pub const MAX_DATAGRAM_SIZE: usize = 1472;

/// ARQ 패킷 최대 페이로드 (데이터그램 - 헤더 6바이트)
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - packet::HEADER_LEN;

/// UDP 타임아웃 (밀리초)
pub const DEFAULT_DATAGRAM_TIMEOUT_MS: u64 = 2000;

/// TCP 타임아웃 (밀리초)
pub const DEFAULT_STREAM_TIMEOUT_MS: u64 = 5000;

/// ARQ 최대 재전송 횟수
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// 종료 센티널 시퀀스 번호
pub const SENTINEL_SEQ: u32 = u32::MAX;

/// 기본 다운로드 디렉토리
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// 서버 기본 저장 디렉토리
pub const DEFAULT_STORAGE_DIR: &str = "uploads";

/// 기본 TCP 포트
pub const DEFAULT_TCP_PORT: u16 = 8080;

/// 기본 UDP 포트
pub const DEFAULT_UDP_PORT: u16 = 8081;
