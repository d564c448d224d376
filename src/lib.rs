//! # WTFTP (Windowed TFTP)
//!
//! UDP 기반 윈도우 확장 TFTP 읽기 전송 프로토콜
//!
//! ## 핵심 특징
//! - **윈도우 전송**: 요청자가 협상한 윈도우 크기만큼 블록을 한 번에 전송
//! - **누적 ACK**: 윈도우 경계와 순서 이탈 시에만 ACK, 업링크 부담 최소화
//! - **제한된 재전송**: 연속 타임아웃 횟수로 세션 수명 제한
//! - **세션 분리**: 피어마다 독립 소켓과 태스크, 세션 간 공유 상태 없음

pub mod block;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod packet;
pub mod provider;
pub mod requester;
pub mod responder;
pub mod retry;
pub mod simulator;
pub mod stats;
pub mod transport;
pub mod window;

pub use block::{BlockSink, BlockSource};
pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use packet::{ErrorCode, Opcode, Packet, RequestPacket};
pub use provider::{DirectoryProvider, FileProvider, MemoryProvider};
pub use requester::{Download, Requester, RequesterState};
pub use responder::{Responder, ResponderState, TransferReport};
pub use retry::RetryController;
pub use simulator::LossyTransport;
pub use stats::TransferStats;
pub use transport::Transport;
pub use window::{AckOutcome, DataOutcome, ReceiveWindow, SendWindow};

/// 기본 블록 크기 (바이트)
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// 기본 윈도우 크기 (블록)
pub const DEFAULT_WINDOW_SIZE: u16 = 32;

/// 기본 연속 타임아웃 허용 횟수
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// 기본 수신 타임아웃 (밀리초)
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// 최대 블록 크기 (RFC 2348 상한)
pub const MAX_BLOCK_SIZE: usize = 65464;

/// Data/Ack/Error 고정 헤더 크기 (opcode + u16)
pub const DATA_HEADER_SIZE: usize = 4;

/// UDP 데이터그램 최대 크기
pub const MAX_DATAGRAM_SIZE: usize = 65535;
