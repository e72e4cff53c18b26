//! 전송 통계

use std::fmt;
use std::time::Duration;

use crate::endpoint::TransportMode;
use crate::session::{Direction, TransferSession};

/// 비트레이트 계산 (bits/sec)
///
/// 경과 시간이 0이면 0
pub fn bitrate_bps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / secs
}

/// 사람이 읽는 단위로 포맷 (1000 단위)
pub fn format_bitrate(bps: f64) -> String {
    if bps >= 1_000_000_000.0 {
        format!("{:.2} Gbps", bps / 1_000_000_000.0)
    } else if bps >= 1_000_000.0 {
        format!("{:.2} Mbps", bps / 1_000_000.0)
    } else if bps >= 1_000.0 {
        format!("{:.2} Kbps", bps / 1_000.0)
    } else {
        format!("{:.0} bps", bps)
    }
}

/// ARQ 엔진 통계 (세션 로컬)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArqStats {
    /// 데이터 패킷 전송 수 (재전송 포함, 센티널 제외)
    pub transmissions: u64,

    /// 재전송 수
    pub retransmissions: u64,

    /// 무시된 다른 seq 의 ACK
    pub stale_acks: u64,

    /// 순서대로 수락된 패킷
    pub accepted: u64,

    /// 중복/순서 어긋난 패킷 (다시 ACK 만 보냄)
    pub duplicates: u64,

    /// 해석 불가 데이터그램
    pub malformed: u64,

    /// 센티널 ACK 확인 여부 (송신측) / 센티널 수신 여부 (수신측)
    pub sentinel_seen: bool,
}

/// 전송 완료 판정 근거
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// 스트림 전송: 선언 크기만큼 복사
    Stream,

    /// ARQ 송신: 모든 데이터 패킷 ACK 확인
    Acknowledged,

    /// ARQ 수신: 센티널 수신
    Sentinel,

    /// ARQ 수신: 바이트 수 도달 후 센티널 없이 유휴 한도 소진
    ByteCount,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Completion::Stream => "stream",
            Completion::Acknowledged => "acknowledged",
            Completion::Sentinel => "sentinel",
            Completion::ByteCount => "byte-count",
        };
        f.write_str(name)
    }
}

/// 전송 엔진이 돌려주는 결과
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// 상대가 보낸 마지막 메시지 (검증하지 않음)
    pub message: Option<String>,

    pub completion: Completion,

    /// ARQ 사용 시 통계
    pub arq: Option<ArqStats>,

    /// 이어받기 시작 위치 (처음부터면 0)
    pub resumed_from: u64,
}

impl TransferOutcome {
    pub fn stream(message: Option<String>) -> Self {
        Self {
            message,
            completion: Completion::Stream,
            arq: None,
            resumed_from: 0,
        }
    }

    pub fn arq(completion: Completion, stats: ArqStats) -> Self {
        Self {
            message: None,
            completion,
            arq: Some(stats),
            resumed_from: 0,
        }
    }

    pub fn resumed_from(mut self, offset: u64) -> Self {
        self.resumed_from = offset;
        self
    }
}

/// 최종 전송 보고서
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub filename: String,
    pub direction: Direction,
    pub mode: TransportMode,

    /// 실제 이동한 바이트
    pub bytes: u64,

    /// 선언된 전체 크기
    pub total: u64,

    pub elapsed: Duration,

    /// bits/sec
    pub bitrate_bps: f64,

    pub message: Option<String>,
    pub completion: Completion,
    pub arq: Option<ArqStats>,

    /// 이어받기 시작 위치. `bytes`/`total` 은 이 위치 이후만 셈.
    pub resumed_from: u64,
}

impl TransferReport {
    pub fn new(session: &TransferSession, mode: TransportMode, outcome: TransferOutcome) -> Self {
        let elapsed = session.elapsed();
        let bytes = session.transferred_bytes();

        Self {
            filename: session.filename().to_string(),
            direction: session.direction(),
            mode,
            bytes,
            total: session.total_size(),
            elapsed,
            bitrate_bps: bitrate_bps(bytes, elapsed),
            message: outcome.message,
            completion: outcome.completion,
            arq: outcome.arq,
            resumed_from: outcome.resumed_from,
        }
    }

    pub fn bitrate(&self) -> String {
        format_bitrate(self.bitrate_bps)
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} {} [{}] | Bytes: {}/{} | Elapsed: {:.2}s | Bitrate: {} | Completion: {}",
            self.direction,
            self.filename,
            self.mode,
            self.bytes,
            self.total,
            self.elapsed.as_secs_f64(),
            self.bitrate(),
            self.completion,
        );

        if self.resumed_from > 0 {
            line.push_str(&format!(" | Resumed at: {}", self.resumed_from));
        }

        if let Some(arq) = &self.arq {
            line.push_str(&format!(
                " | Retransmits: {} | Duplicates: {}",
                arq.retransmissions, arq.duplicates
            ));
        }

        line
    }
}
