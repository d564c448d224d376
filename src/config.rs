//! 프로토콜 설정

use std::time::Duration;

use crate::{
    Error, Result, DATA_HEADER_SIZE, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_MS,
    DEFAULT_WINDOW_SIZE, MAX_BLOCK_SIZE, MAX_DATAGRAM_SIZE,
};

/// WTFTP 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 블록 크기 (바이트)
    /// 이보다 짧은 블록이 전송의 끝을 의미
    pub block_size: usize,

    /// 요청자가 협상하는 윈도우 크기 (블록 수)
    pub window_size: u16,

    /// 응답자가 허용하는 최대 윈도우 크기
    pub max_window_size: u16,

    /// 연속 타임아웃 허용 횟수
    pub max_attempts: u32,

    /// 수신 타임아웃 (밀리초)
    pub timeout_ms: u64,

    /// 수신 버퍼 크기
    pub recv_buffer_size: usize,

    /// 디스패처의 세션 정리 주기 (밀리초)
    pub reap_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            window_size: DEFAULT_WINDOW_SIZE,
            max_window_size: 8192,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            recv_buffer_size: MAX_DATAGRAM_SIZE,
            reap_interval_ms: 100,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 수신 1회당 타임아웃
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 세션 정리 주기
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "block_size must be in 1..={}, got {}",
                MAX_BLOCK_SIZE, self.block_size
            )));
        }
        if self.window_size == 0 {
            return Err(Error::InvalidConfig("window_size must be positive".into()));
        }
        if self.window_size > self.max_window_size {
            return Err(Error::InvalidConfig(format!(
                "window_size {} exceeds max_window_size {}",
                self.window_size, self.max_window_size
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig("max_attempts must be positive".into()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeout_ms must be positive".into()));
        }
        if self.recv_buffer_size < self.block_size + DATA_HEADER_SIZE {
            return Err(Error::InvalidConfig(format!(
                "recv_buffer_size {} cannot hold a full data packet",
                self.recv_buffer_size
            )));
        }
        Ok(())
    }

    /// LAN용 설정
    pub fn lan() -> Self {
        Self {
            window_size: 64,
            timeout_ms: 200,
            reap_interval_ms: 50,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            window_size: 8,
            max_attempts: 10,
            timeout_ms: 2000,
            ..Self::default()
        }
    }
}
