//! ARQ 수신자 (Stop-and-Wait)
//!
//! 상태는 `expected_seq` 하나뿐:
//! - `seq == expected_seq`: 기록, 진행, `ACK seq`, expected_seq += 1
//! - 그 외 seq: 기록 없이 `ACK seq` 만 다시 보냄 (잃어버린 ACK 복구)
//! - 센티널: `ACK 4294967295` 후 종료
//!
//! 종료 판정은 센티널이 우선. 바이트 수 도달은 참고용이며,
//! 도달 후 센티널 없이 유휴 한도를 넘기면 `Completion::ByteCount` 로 완료.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::datagram::DatagramChannel;
use crate::message::Command;
use crate::packet::Packet;
use crate::session::{CancelFlag, TransferSession};
use crate::stats::{ArqStats, Completion};
use crate::{Config, Error, Result, MAX_DATAGRAM_SIZE, SENTINEL_SEQ};

/// Stop-and-Wait 수신자
pub struct ArqReceiver<D> {
    channel: D,
    timeout: Duration,
    /// 연속 유휴 타임아웃 한도
    max_idle: u32,
    expected_seq: u32,
    cancel: CancelFlag,
    stats: ArqStats,
}

impl<D: DatagramChannel> ArqReceiver<D> {
    pub fn new(channel: D, config: &Config) -> Self {
        Self {
            channel,
            timeout: config.datagram_timeout(),
            max_idle: config.max_attempts(),
            expected_seq: 0,
            cancel: CancelFlag::new(),
            stats: ArqStats::default(),
        }
    }

    /// 외부 취소 플래그 연결
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// 다음에 수락할 seq
    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    pub fn stats(&self) -> &ArqStats {
        &self.stats
    }

    pub fn into_inner(self) -> D {
        self.channel
    }

    /// 센티널 또는 유휴 한도까지 수신하며 `writer` 에 순서대로 기록
    pub async fn receive<W>(
        &mut self,
        writer: &mut W,
        session: &mut TransferSession,
    ) -> Result<(Completion, ArqStats)>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let mut idle = 0u32;
        session.begin();

        loop {
            self.cancel.check()?;

            let len = match tokio::time::timeout(self.timeout, self.channel.recv(&mut buf)).await {
                Ok(Ok(len)) => {
                    idle = 0;
                    len
                }
                Ok(Err(e)) => return Err(Error::TransferFailed(e)),
                Err(_) => {
                    idle += 1;
                    if idle < self.max_idle {
                        debug!(
                            "수신 대기 타임아웃 ({}/{}): expected_seq={}",
                            idle, self.max_idle, self.expected_seq
                        );
                        continue;
                    }

                    writer.flush().await?;
                    if session.is_complete() {
                        warn!(
                            "센티널 없이 종료: {} bytes 수신 완료",
                            session.transferred_bytes()
                        );
                        return Ok((Completion::ByteCount, self.stats));
                    }
                    return Err(Error::Timeout);
                }
            };

            let packet = match Packet::decode(&buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    self.stats.malformed += 1;
                    warn!("잘못된 데이터그램 무시: {}", e);
                    continue;
                }
            };

            if packet.is_sentinel() {
                writer.flush().await?;
                self.send_ack(SENTINEL_SEQ).await?;
                self.stats.sentinel_seen = true;

                if !session.is_complete() {
                    warn!(
                        "선언 크기 전에 센티널 수신: {}/{} bytes",
                        session.transferred_bytes(),
                        session.total_size()
                    );
                }
                return Ok((Completion::Sentinel, self.stats));
            }

            if packet.seq != self.expected_seq {
                // 중복 재전송 또는 순서 어긋남: 상태 유지, 보낸 seq 그대로 ACK
                self.stats.duplicates += 1;
                debug!(
                    "중복 패킷: seq={}, expected_seq={}",
                    packet.seq, self.expected_seq
                );
                self.send_ack(packet.seq).await?;
                continue;
            }

            let payload_len = packet.payload.len() as u64;
            if payload_len > session.remaining() {
                return Err(Error::Protocol(format!(
                    "선언 크기 초과: seq={}, {}+{} > {}",
                    packet.seq,
                    session.transferred_bytes(),
                    payload_len,
                    session.total_size()
                )));
            }

            writer.write_all(&packet.payload).await?;
            session.advance(packet.payload.len());
            self.send_ack(packet.seq).await?;
            self.stats.accepted += 1;
            self.expected_seq += 1;
        }
    }

    async fn send_ack(&mut self, seq: u32) -> Result<()> {
        let ack = Command::Ack { seq }.to_line();
        self.channel
            .send(ack.as_bytes())
            .await
            .map_err(Error::TransferFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datagram::DatagramChannel;
    use crate::sender::parse_ack;
    use crate::session::Direction;
    use crate::simulator::lossless_link;
    use bytes::Bytes;

    fn data_packet(seq: u32, payload: &'static [u8]) -> Bytes {
        Packet::data(seq, Bytes::from_static(payload)).encode()
    }

    async fn recv_ack<D: DatagramChannel>(channel: &mut D) -> Option<u32> {
        let mut buf = [0u8; 64];
        let len = channel.recv(&mut buf).await.unwrap();
        parse_ack(&buf[..len])
    }

    #[tokio::test]
    async fn test_duplicate_is_reacked_not_written() {
        let config = Config::default();
        let (mut peer, local) = lossless_link();
        let mut receiver = ArqReceiver::new(local, &config);
        let mut session = TransferSession::new("f", Direction::Download, 6);
        let mut out = Vec::new();

        let fake_sender = async {
            peer.send(&data_packet(0, b"abc")).await.unwrap();
            assert_eq!(recv_ack(&mut peer).await, Some(0));

            // ACK 0 을 못 받은 척 재전송
            peer.send(&data_packet(0, b"abc")).await.unwrap();
            assert_eq!(recv_ack(&mut peer).await, Some(0));

            peer.send(&data_packet(1, b"def")).await.unwrap();
            assert_eq!(recv_ack(&mut peer).await, Some(1));

            peer.send(&Packet::sentinel().encode()).await.unwrap();
            assert_eq!(recv_ack(&mut peer).await, Some(SENTINEL_SEQ));
        };

        let (result, _) = tokio::join!(receiver.receive(&mut out, &mut session), fake_sender);
        let (completion, stats) = result.unwrap();

        assert_eq!(completion, Completion::Sentinel);
        assert_eq!(out, b"abcdef");
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(receiver.expected_seq(), 2);
    }

    #[tokio::test]
    async fn test_out_of_order_does_not_advance() {
        let config = Config::default();
        let (mut peer, local) = lossless_link();
        let mut receiver = ArqReceiver::new(local, &config);
        let mut session = TransferSession::new("f", Direction::Download, 3);
        let mut out = Vec::new();

        let fake_sender = async {
            peer.send(&data_packet(5, b"zzz")).await.unwrap();
            assert_eq!(recv_ack(&mut peer).await, Some(5));

            peer.send(&data_packet(0, b"abc")).await.unwrap();
            assert_eq!(recv_ack(&mut peer).await, Some(0));

            peer.send(&Packet::sentinel().encode()).await.unwrap();
            assert_eq!(recv_ack(&mut peer).await, Some(SENTINEL_SEQ));
        };

        let (result, _) = tokio::join!(receiver.receive(&mut out, &mut session), fake_sender);
        result.unwrap();
        assert_eq!(out, b"abc");
        assert_eq!(receiver.expected_seq(), 1);
    }

    #[tokio::test]
    async fn test_sentinel_before_byte_count() {
        let config = Config::default();
        let (mut peer, local) = lossless_link();
        let mut receiver = ArqReceiver::new(local, &config);
        let mut session = TransferSession::new("f", Direction::Download, 100);
        let mut out = Vec::new();

        let fake_sender = async {
            peer.send(&data_packet(0, b"short")).await.unwrap();
            assert_eq!(recv_ack(&mut peer).await, Some(0));
            peer.send(&Packet::sentinel().encode()).await.unwrap();
        };

        let (result, _) = tokio::join!(receiver.receive(&mut out, &mut session), fake_sender);
        let (completion, stats) = result.unwrap();

        assert_eq!(completion, Completion::Sentinel);
        assert!(stats.sentinel_seen);
        assert_eq!(session.transferred_bytes(), 5);
        assert!(!session.is_complete());
        assert_eq!(out, b"short");
    }

    #[tokio::test(start_paused = true)]
    async fn test_byte_count_without_sentinel() {
        let config = Config::default();
        let (mut peer, local) = lossless_link();
        let mut receiver = ArqReceiver::new(local, &config);
        let mut session = TransferSession::new("f", Direction::Download, 3);
        let mut out = Vec::new();

        let fake_sender = async {
            peer.send(&data_packet(0, b"abc")).await.unwrap();
            assert_eq!(recv_ack(&mut peer).await, Some(0));
        };

        let (result, _) = tokio::join!(receiver.receive(&mut out, &mut session), fake_sender);
        let (completion, stats) = result.unwrap();

        assert_eq!(completion, Completion::ByteCount);
        assert!(!stats.sentinel_seen);
        assert_eq!(out, b"abc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_before_byte_count_times_out() {
        let config = Config::default();
        let (_peer, local) = lossless_link();
        let mut receiver = ArqReceiver::new(local, &config);
        let mut session = TransferSession::new("f", Direction::Download, 10);
        let mut out = Vec::new();

        let started = tokio::time::Instant::now();
        let result = receiver.receive(&mut out, &mut session).await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert!(started.elapsed() >= config.datagram_timeout() * 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_while_waiting() {
        let config = Config::default();
        let (_peer, local) = lossless_link();
        let cancel = CancelFlag::new();
        let mut receiver = ArqReceiver::new(local, &config).with_cancel(cancel.clone());
        let mut session = TransferSession::new("f", Direction::Download, 10);
        let mut out = Vec::new();

        let started = tokio::time::Instant::now();
        let interrupt = async {
            tokio::time::sleep(config.datagram_timeout() * 3 / 2).await;
            cancel.cancel();
        };
        let (result, _) = tokio::join!(receiver.receive(&mut out, &mut session), interrupt);

        // 진행 중인 대기가 끝나면 바로 중단, 유휴 한도까지 가지 않음
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() >= config.datagram_timeout() * 2);
        assert!(started.elapsed() < config.datagram_timeout() * 6);
    }

    #[tokio::test]
    async fn test_overflowing_packet_is_protocol_error() {
        let config = Config::default();
        let (mut peer, local) = lossless_link();
        let mut receiver = ArqReceiver::new(local, &config);
        let mut session = TransferSession::new("f", Direction::Download, 2);
        let mut out = Vec::new();

        peer.send(&data_packet(0, b"toolong")).await.unwrap();
        let result = receiver.receive(&mut out, &mut session).await;

        assert!(matches!(result, Err(Error::Protocol(_))));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_datagram_ignored() {
        let config = Config::default();
        let (mut peer, local) = lossless_link();
        let mut receiver = ArqReceiver::new(local, &config);
        let mut session = TransferSession::new("f", Direction::Download, 1);
        let mut out = Vec::new();

        peer.send(b"xy").await.unwrap();
        peer.send(&data_packet(0, b"!")).await.unwrap();
        peer.send(&Packet::sentinel().encode()).await.unwrap();

        let (_, stats) = receiver.receive(&mut out, &mut session).await.unwrap();
        assert_eq!(stats.malformed, 1);
        assert_eq!(out, b"!");
    }
}
