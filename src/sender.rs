//! ARQ 송신자 (Stop-and-Wait)
//!
//! - 패킷 하나 전송 후 같은 seq 의 ACK 를 볼 때까지 다음 패킷 보류
//! - 타임아웃마다 재전송, 총 `max_retries + 1` 회 시도 후 포기
//! - 다른 seq 의 ACK 는 이전 재전송의 잔여물로 보고 무시
//! - 마지막에 센티널 1회 전송, ACK 는 한 번만 대기 (없어도 경고만)

use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::datagram::DatagramChannel;
use crate::message::Command;
use crate::packet::Packet;
use crate::session::{CancelFlag, TransferSession};
use crate::stats::ArqStats;
use crate::stream::read_chunk;
use crate::{Config, Error, Result, MAX_DATAGRAM_SIZE, SENTINEL_SEQ};

/// ACK 대기 결과
enum AckWait {
    Matched,
    TimedOut,
}

/// Stop-and-Wait 송신자
pub struct ArqSender<D> {
    channel: D,
    payload_size: usize,
    timeout: Duration,
    max_attempts: u32,
    cancel: CancelFlag,
    stats: ArqStats,
}

impl<D: DatagramChannel> ArqSender<D> {
    pub fn new(channel: D, config: &Config) -> Self {
        Self {
            channel,
            payload_size: config.effective_payload_size(),
            timeout: config.datagram_timeout(),
            max_attempts: config.max_attempts(),
            cancel: CancelFlag::new(),
            stats: ArqStats::default(),
        }
    }

    /// 외부 취소 플래그 연결
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stats(&self) -> &ArqStats {
        &self.stats
    }

    /// 채널 회수
    pub fn into_inner(self) -> D {
        self.channel
    }

    /// `reader` 에서 `session.total_size()` 바이트를 읽어 전송
    ///
    /// 모든 데이터 패킷이 ACK 되면 성공. 센티널 ACK 누락은 실패가 아님.
    pub async fn send<R>(
        &mut self,
        reader: &mut R,
        session: &mut TransferSession,
    ) -> Result<ArqStats>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; self.payload_size];
        let mut seq: u32 = 0;
        session.begin();

        while session.remaining() > 0 {
            self.cancel.check()?;

            if seq == SENTINEL_SEQ {
                return Err(Error::Protocol("시퀀스 번호 공간 소진".into()));
            }

            let want = session.remaining().min(buf.len() as u64) as usize;
            let n = read_chunk(reader, &mut buf[..want]).await?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "로컬 파일이 선언 크기보다 짧음: {}/{}",
                        session.transferred_bytes(),
                        session.total_size()
                    ),
                )));
            }

            let packet = Packet::data(seq, Bytes::copy_from_slice(&buf[..n]));
            self.deliver(&packet).await?;

            session.advance(n);
            seq += 1;
        }

        self.finish().await?;
        debug!(
            "ARQ 송신 완료: {} ({} bytes, {} packets, {} retransmits)",
            session.filename(),
            session.transferred_bytes(),
            seq,
            self.stats.retransmissions
        );
        Ok(self.stats)
    }

    /// 패킷 하나를 ACK 받을 때까지 전송
    async fn deliver(&mut self, packet: &Packet) -> Result<()> {
        let datagram = packet.encode();

        for attempt in 1..=self.max_attempts {
            self.cancel.check()?;

            self.channel
                .send(&datagram)
                .await
                .map_err(Error::TransferFailed)?;
            self.stats.transmissions += 1;
            if attempt > 1 {
                self.stats.retransmissions += 1;
                debug!("재전송: seq={}, attempt={}", packet.seq, attempt);
            }

            match self.await_ack(packet.seq).await? {
                AckWait::Matched => return Ok(()),
                AckWait::TimedOut => {
                    debug!("ACK 타임아웃: seq={}, attempt={}", packet.seq, attempt);
                }
            }
        }

        warn!(
            "재전송 한도 초과: seq={}, attempts={}",
            packet.seq, self.max_attempts
        );
        Err(Error::MaxRetriesExceeded {
            seq: packet.seq,
            attempts: self.max_attempts,
        })
    }

    /// 센티널 전송, ACK 1회 대기
    async fn finish(&mut self) -> Result<()> {
        let datagram = Packet::sentinel().encode();
        self.channel
            .send(&datagram)
            .await
            .map_err(Error::TransferFailed)?;

        match self.await_ack(SENTINEL_SEQ).await? {
            AckWait::Matched => self.stats.sentinel_seen = true,
            AckWait::TimedOut => warn!("센티널 ACK 없음 (데이터는 모두 확인됨)"),
        }
        Ok(())
    }

    /// `seq` 의 ACK 를 타임아웃까지 대기
    ///
    /// 다른 seq 의 ACK 나 해석 불가 데이터그램이 와도 기한은 연장되지 않음
    async fn await_ack(&mut self, seq: u32) -> Result<AckWait> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            let len = match tokio::time::timeout_at(deadline, self.channel.recv(&mut buf)).await {
                Ok(Ok(len)) => len,
                Ok(Err(e)) => return Err(Error::TransferFailed(e)),
                Err(_) => return Ok(AckWait::TimedOut),
            };

            match parse_ack(&buf[..len]) {
                Some(acked) if acked == seq => return Ok(AckWait::Matched),
                Some(acked) => {
                    self.stats.stale_acks += 1;
                    debug!("다른 seq 의 ACK 무시: 대기={}, 수신={}", seq, acked);
                }
                None => {
                    self.stats.malformed += 1;
                    debug!("ACK 가 아닌 데이터그램 무시: {} bytes", len);
                }
            }
        }
    }
}

/// `ACK <seq>` 데이터그램 해석
pub(crate) fn parse_ack(datagram: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(datagram).ok()?;
    match Command::parse(text).ok()? {
        Command::Ack { seq } => Some(seq),
        _ => None,
    }
}
