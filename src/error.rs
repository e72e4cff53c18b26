//! 에러 타입 정의

use thiserror::Error;

/// SWFT 전송 에러 타입
///
/// 네트워크/파일시스템 장애는 모두 이 타입으로 변환되어 작업 경계에서 반환됨
#[derive(Error, Debug)]
pub enum Error {
    /// 연결/바인드 실패
    #[error("연결 에러: {0}")]
    Connection(#[source] std::io::Error),

    /// 응답 라인 형식 오류, 크기 필드 파싱 실패 등
    #[error("프로토콜 에러: {0}")]
    Protocol(String),

    /// 상대가 READY 가 아닌 응답을 보냄
    #[error("서버 거부: {0}")]
    ServerRejected(String),

    /// 타임아웃 안에 패킷/응답 없음
    #[error("타임아웃")]
    Timeout,

    /// ARQ 송신자가 재전송 한도를 소진함
    #[error("최대 재전송 초과: seq={seq}, attempts={attempts}")]
    MaxRetriesExceeded { seq: u32, attempts: u32 },

    /// 스트림 다운로드가 선언된 크기 전에 끝남
    #[error("불완전한 전송: {received}/{expected} bytes")]
    Incomplete { received: u64, expected: u64 },

    /// 전송 도중 소켓 I/O 실패
    #[error("전송 실패: {0}")]
    TransferFailed(#[source] std::io::Error),

    /// 로컬 파일시스템 에러
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("유효하지 않은 엔드포인트: {0}")]
    InvalidEndpoint(String),

    /// 외부 인터럽트로 작업 중단
    #[error("작업 취소됨")]
    Cancelled,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
