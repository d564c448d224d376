//! 손실 주입 전송 래퍼
//!
//! 실제 네트워크 상태와 무관하게 재전송 경로를 시험하기 위해 송신 패킷을
//! 확률적으로 또는 지정한 조건으로 버린다. 수신은 그대로 통과.
//!
//! | 규칙 | 설명 |
//! |------|------|
//! | `loss_rate` | 모든 송신 패킷을 확률적으로 버림 (시드 고정 RNG) |
//! | `drop_once` | 조건에 맞는 첫 송신 패킷 하나만 버림 |
//! | `drop_all` | 모든 송신 패킷을 버림 |

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::transport::Transport;

type DropRule = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// 손실 주입 전송
pub struct LossyTransport<T> {
    inner: T,

    /// 무작위 손실 확률 (0.0 ~ 1.0)
    loss_rate: f64,

    rng: Mutex<StdRng>,

    /// 한 번 적용 후 제거되는 규칙
    one_shot: Mutex<Vec<DropRule>>,

    /// 송신 시도 수 (버린 것 포함)
    sent: AtomicU64,

    dropped: AtomicU64,
}

impl<T: Transport> LossyTransport<T> {
    /// 손실 없는 통과 래퍼
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            loss_rate: 0.0,
            rng: Mutex::new(StdRng::seed_from_u64(0x5754_4654)),
            one_shot: Mutex::new(Vec::new()),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// 무작위 손실률 설정
    pub fn with_loss_rate(mut self, loss_rate: f64, seed: u64) -> Self {
        self.loss_rate = loss_rate.clamp(0.0, 1.0);
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// 모든 송신 패킷 손실
    pub fn drop_all(self) -> Self {
        self.with_loss_rate(1.0, 0)
    }

    /// 조건에 맞는 첫 송신 패킷 하나 손실
    pub fn drop_once(self, rule: impl FnMut(&[u8]) -> bool + Send + 'static) -> Self {
        self.one_shot.lock().push(Box::new(rule));
        self
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn should_drop(&self, buf: &[u8]) -> bool {
        {
            let mut rules = self.one_shot.lock();
            if let Some(pos) = rules.iter_mut().position(|rule| rule(buf)) {
                drop(rules.remove(pos));
                return true;
            }
        }

        self.loss_rate > 0.0 && self.rng.lock().gen_bool(self.loss_rate)
    }
}

impl<T: Transport> Transport for LossyTransport<T> {
    fn send_to(&self, buf: &[u8], target: SocketAddr)
        -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            self.sent.fetch_add(1, Ordering::Relaxed);
            if self.should_drop(buf) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("패킷 손실 주입: {} bytes -> {}", buf.len(), target);
                return Ok(buf.len());
            }
            self.inner.send_to(buf, target).await
        }
    }

    fn recv_from(&self, buf: &mut [u8])
        -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send {
        self.inner.recv_from(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
