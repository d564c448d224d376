//! 윈도우 제어
//!
//! 송신측은 `(base, base + size]` 범위의 블록만 미확인 상태로 둘 수 있고,
//! 수신측은 다음 순번 블록만 받아들인다.
//!
//! 블록 번호는 내부적으로 u64 절대값으로 세고, 와이어에는 하위 16비트만
//! 실린다. 번호가 65535를 넘어 0으로 돌아가도 윈도우 안에서만 해석하므로
//! 모호하지 않다.

use bytes::Bytes;

use crate::block::BlockSink;

/// 절대 블록 번호를 와이어 번호로 변환
#[inline]
pub fn wire_block(block: u64) -> u16 {
    block as u16
}

/// ACK 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// base 전진, 새 윈도우 전송 필요
    Advanced,

    /// 마지막 블록까지 확인됨
    Completed,

    /// 이미 확인됐거나 윈도우 밖의 ACK
    Ignored,
}

/// 송신 윈도우
#[derive(Debug, Clone)]
pub struct SendWindow {
    /// 연속으로 확인된 마지막 블록
    base: u64,

    /// 윈도우 크기
    size: u64,

    /// 총 블록 수
    total: u64,
}

impl SendWindow {
    pub fn new(total_blocks: u64, window_size: u16) -> Self {
        Self {
            base: 0,
            size: u64::from(window_size.max(1)),
            total: total_blocks,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn total_blocks(&self) -> u64 {
        self.total
    }

    /// 윈도우 상한 (존재하는 블록으로 제한)
    pub fn upper_bound(&self) -> u64 {
        (self.base + self.size).min(self.total)
    }

    /// 현재 미확인 블록 수
    pub fn in_flight(&self) -> u64 {
        self.upper_bound() - self.base
    }

    pub fn is_complete(&self) -> bool {
        self.base >= self.total
    }

    /// 현재 윈도우에서 보낼 블록 번호 (오름차순)
    pub fn blocks_to_send(&self) -> std::ops::RangeInclusive<u64> {
        self.base + 1..=self.upper_bound()
    }

    /// ACK 처리
    pub fn on_ack(&mut self, block: u16) -> AckOutcome {
        if self.is_complete() {
            return AckOutcome::Ignored;
        }

        let delta = u64::from(block.wrapping_sub(wire_block(self.base)));
        if delta == 0 || delta > self.in_flight() {
            return AckOutcome::Ignored;
        }

        self.base += delta;
        if self.is_complete() {
            AckOutcome::Completed
        } else {
            AckOutcome::Advanced
        }
    }
}

/// Data 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOutcome {
    /// 다음 블록 수락, 윈도우 경계면 ACK 번호 포함
    Accepted { ack: Option<u16> },

    /// 짧은 마지막 블록 수락, 즉시 ACK 후 완료
    Final { ack: u16 },

    /// 순서 이탈 또는 중복, 수락하지 않고 재동기화 ACK 필요
    OutOfOrder { ack: u16 },
}

/// 수신 윈도우
pub struct ReceiveWindow {
    /// 순서대로 수락된 마지막 블록
    highest: u64,

    size: u64,

    block_size: usize,

    sink: BlockSink,

    finished: bool,
}

impl ReceiveWindow {
    pub fn new(window_size: u16, block_size: usize) -> Self {
        Self {
            highest: 0,
            size: u64::from(window_size.max(1)),
            block_size,
            sink: BlockSink::new(),
            finished: false,
        }
    }

    pub fn highest_accepted(&self) -> u64 {
        self.highest
    }

    /// 현재 재동기화용 ACK 번호
    pub fn ack_number(&self) -> u16 {
        wire_block(self.highest)
    }

    pub fn expected_block(&self) -> u16 {
        wire_block(self.highest + 1)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn sink(&self) -> &BlockSink {
        &self.sink
    }

    pub fn into_sink(self) -> BlockSink {
        self.sink
    }

    /// Data 처리
    ///
    /// 완료 후에 들어온 블록은 모두 순서 이탈로 취급
    pub fn on_data(&mut self, block: u16, payload: &Bytes) -> DataOutcome {
        if self.finished || block != self.expected_block() {
            return DataOutcome::OutOfOrder {
                ack: self.ack_number(),
            };
        }

        self.sink.append(payload);
        self.highest += 1;

        if payload.len() < self.block_size {
            self.finished = true;
            return DataOutcome::Final {
                ack: self.ack_number(),
            };
        }

        let ack = (self.highest % self.size == 0).then(|| self.ack_number());
        DataOutcome::Accepted { ack }
    }
}
