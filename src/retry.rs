//! 재전송 제어
//!
//! 모든 수신을 타임아웃으로 제한하고, 타임아웃마다 마지막 송신 단위를
//! 재전송하며 시도 횟수를 하나씩 줄인다. 연속 `max_attempts`번째 타임아웃에서
//! 세션 실패. 요청자와 응답자가 동일하게 사용.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::stats::TransferStats;
use crate::transport::{is_transient, Transport};
use crate::{Config, Error, Result};

/// 세션 피어와 일치하는지 확인. 피어 미확정(None)이면 모두 허용
pub fn check_peer(expected: Option<SocketAddr>, got: SocketAddr) -> Result<()> {
    match expected {
        Some(expected) if expected != got => Err(Error::UnknownPeer { expected, got }),
        _ => Ok(()),
    }
}

/// 재전송 컨트롤러
#[derive(Debug)]
pub struct RetryController {
    timeout: Duration,
    max_attempts: u32,
    remaining: u32,

    /// 마지막 송신 단위 (요청 1개, ACK 1개, 또는 윈도우 전체)
    pending: Vec<Bytes>,

    /// 재전송 대상
    target: Option<SocketAddr>,
}

impl RetryController {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        let max_attempts = max_attempts.max(1);
        Self {
            timeout,
            max_attempts,
            remaining: max_attempts,
            pending: Vec::new(),
            target: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.recv_timeout(), config.max_attempts)
    }

    /// 남은 시도 횟수
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 송신 없이 재전송 단위만 교체
    pub fn arm(&mut self, unit: Vec<Bytes>, target: SocketAddr) {
        self.pending = unit;
        self.target = Some(target);
    }

    /// 송신 후 재전송 단위로 등록
    pub async fn transmit<T: Transport>(
        &mut self,
        transport: &T,
        unit: Vec<Bytes>,
        target: SocketAddr,
        stats: &mut TransferStats,
    ) -> Result<()> {
        self.arm(unit, target);
        self.send_pending(transport, stats).await
    }

    async fn send_pending<T: Transport>(
        &self,
        transport: &T,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let Some(target) = self.target else {
            return Ok(());
        };
        for datagram in &self.pending {
            transport.send_to(datagram, target).await?;
            stats.record_sent(datagram.len());
        }
        Ok(())
    }

    /// 타임아웃 제한 수신
    ///
    /// `expected`와 다른 주소의 데이터그램은 버리고 같은 기한 안에서 계속
    /// 기다린다. 피어의 데이터그램을 받으면 시도 횟수를 복구.
    pub async fn recv_from<T: Transport>(
        &mut self,
        transport: &T,
        buf: &mut [u8],
        expected: Option<SocketAddr>,
        stats: &mut TransferStats,
    ) -> Result<(usize, SocketAddr)> {
        loop {
            let deadline = Instant::now() + self.timeout;

            loop {
                match tokio::time::timeout_at(deadline, transport.recv_from(buf)).await {
                    Ok(Ok((len, from))) => {
                        if let Err(e) = check_peer(expected, from) {
                            trace!("데이터그램 무시: {}", e);
                            stats.ignored += 1;
                            continue;
                        }
                        self.remaining = self.max_attempts;
                        stats.record_received(len);
                        return Ok((len, from));
                    }
                    Ok(Err(e)) if is_transient(&e) => {
                        debug!("일시적 수신 에러: {}", e);
                    }
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => break,
                }
            }

            stats.timeouts += 1;
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                warn!("{}회 연속 타임아웃, 세션 포기", self.max_attempts);
                return Err(Error::RetryBudgetExhausted {
                    attempts: self.max_attempts,
                });
            }

            debug!(
                "타임아웃, {}개 패킷 재전송 (남은 시도 {})",
                self.pending.len(),
                self.remaining
            );
            self.send_pending(transport, stats).await?;
            stats.retransmitted_packets += self.pending.len() as u64;
        }
    }
}
