//! 인메모리 손실 링크 시뮬레이터
//!
//! 실제 네트워크 없이 ARQ 동작(손실, 중복, 특정 패킷 드롭)을 재현하기 위한
//! [`DatagramChannel`] 구현. 시드 고정 RNG를 사용하므로 결과가 결정적임.
//! 테스트 빌드에서만 컴파일됨.
//!
//! ```text
//!  SimEndpoint A ──(a_to_b 장애 모델)──▶ SimEndpoint B
//!       ▲                                     │
//!       └──────────(b_to_a 장애 모델)─────────┘
//! ```

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::datagram::DatagramChannel;

/// 특정 데이터그램을 버릴지 결정하는 규칙 (true 면 드롭)
pub type DropRule = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// 단방향 장애 모델 설정
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// 무작위 손실 확률 (0.0 ~ 1.0)
    pub loss_rate: f64,

    /// 무작위 중복 확률 (0.0 ~ 1.0)
    pub duplicate_rate: f64,

    /// RNG 시드
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        // 장애 없음
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

impl LinkConfig {
    pub fn lossy(loss_rate: f64, seed: u64) -> Self {
        Self {
            loss_rate,
            seed,
            ..Self::default()
        }
    }
}

/// 송신 방향 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// send() 호출 수
    pub sent: u64,

    /// 버려진 데이터그램 수
    pub dropped: u64,

    /// 중복 전달된 데이터그램 수
    pub duplicated: u64,

    /// 상대에게 전달된 데이터그램 수 (중복 포함)
    pub delivered: u64,
}

/// 링크의 한쪽 끝
pub struct SimEndpoint {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
    config: LinkConfig,
    rng: StdRng,
    drop_rule: Option<DropRule>,
    stats: Arc<Mutex<LinkStats>>,
}

/// 양방향 링크 생성
pub fn link(a_to_b: LinkConfig, b_to_a: LinkConfig) -> (SimEndpoint, SimEndpoint) {
    let (tx_ab, rx_ab) = mpsc::unbounded_channel();
    let (tx_ba, rx_ba) = mpsc::unbounded_channel();

    let a = SimEndpoint::new(tx_ab, rx_ba, a_to_b);
    let b = SimEndpoint::new(tx_ba, rx_ab, b_to_a);
    (a, b)
}

/// 장애 없는 링크
pub fn lossless_link() -> (SimEndpoint, SimEndpoint) {
    link(LinkConfig::default(), LinkConfig::default())
}

impl SimEndpoint {
    fn new(
        tx: mpsc::UnboundedSender<Bytes>,
        rx: mpsc::UnboundedReceiver<Bytes>,
        config: LinkConfig,
    ) -> Self {
        Self {
            tx,
            rx,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            drop_rule: None,
            stats: Arc::new(Mutex::new(LinkStats::default())),
        }
    }

    /// 송신 데이터그램에 드롭 규칙 적용
    pub fn with_drop_rule(mut self, rule: impl FnMut(&[u8]) -> bool + Send + 'static) -> Self {
        self.drop_rule = Some(Box::new(rule));
        self
    }

    /// 현재 송신 통계
    pub fn stats(&self) -> LinkStats {
        *self.stats.lock()
    }

    /// 엔드포인트를 넘긴 뒤에도 통계를 읽기 위한 핸들
    pub fn stats_handle(&self) -> Arc<Mutex<LinkStats>> {
        self.stats.clone()
    }

    fn should_drop(&mut self, datagram: &[u8]) -> bool {
        if let Some(rule) = self.drop_rule.as_mut() {
            if rule(datagram) {
                return true;
            }
        }
        self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate
    }
}

impl DatagramChannel for SimEndpoint {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        let drop = self.should_drop(datagram);
        let duplicate = !drop
            && self.config.duplicate_rate > 0.0
            && self.rng.gen::<f64>() < self.config.duplicate_rate;

        let mut stats = self.stats.lock();
        stats.sent += 1;
        if drop {
            stats.dropped += 1;
            return Ok(());
        }

        let copies = if duplicate { 2 } else { 1 };
        for _ in 0..copies {
            // 상대가 사라졌으면 UDP 처럼 조용히 버림
            if self.tx.send(Bytes::copy_from_slice(datagram)).is_ok() {
                stats.delivered += 1;
            }
        }
        if duplicate {
            stats.duplicated += 1;
        }

        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.rx.recv().await {
            Some(datagram) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(len)
            }
            // 상대 끝이 닫히면 UDP 처럼 아무것도 오지 않음
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lossless_delivery() {
        let (mut a, mut b) = lossless_link();
        a.send(b"hello").await.unwrap();

        let mut buf = [0u8; 16];
        let len = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");
        assert_eq!(a.stats().sent, 1);
        assert_eq!(a.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_drop_rule() {
        let (a, mut b) = lossless_link();
        let mut a = a.with_drop_rule(|d| d == b"drop me");

        a.send(b"drop me").await.unwrap();
        a.send(b"keep").await.unwrap();

        let mut buf = [0u8; 16];
        let len = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"keep");
        assert_eq!(
            a.stats(),
            LinkStats {
                sent: 2,
                dropped: 1,
                duplicated: 0,
                delivered: 1
            }
        );
    }

    #[tokio::test]
    async fn test_seeded_loss_is_deterministic() {
        let run = || async {
            let (mut a, _b) = link(LinkConfig::lossy(0.5, 7), LinkConfig::default());
            for _ in 0..100 {
                a.send(b"x").await.unwrap();
            }
            a.stats().dropped
        };

        let first = run().await;
        assert_eq!(first, run().await);
        assert!(first > 20 && first < 80);
    }

    #[tokio::test]
    async fn test_duplication() {
        let config = LinkConfig {
            duplicate_rate: 1.0,
            ..LinkConfig::default()
        };
        let (mut a, mut b) = link(config, LinkConfig::default());
        a.send(b"twice").await.unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(b.recv(&mut buf).await.unwrap(), 5);
        assert_eq!(b.recv(&mut buf).await.unwrap(), 5);
        assert_eq!(a.stats().duplicated, 1);
    }
}
