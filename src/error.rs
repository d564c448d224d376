//! 에러 타입 정의

use std::net::SocketAddr;

use thiserror::Error;

use crate::packet::ErrorCode;

/// WTFTP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("잘린 패킷: 최소 {expected} 바이트 필요, {got} 바이트 수신")]
    TruncatedPacket { expected: usize, got: usize },

    #[error("잘못된 패킷: {0}")]
    MalformedPacket(String),

    #[error("알 수 없는 피어: expected {expected}, got {got}")]
    UnknownPeer { expected: SocketAddr, got: SocketAddr },

    #[error("요청 거부: {0}")]
    RequestRejected(String),

    #[error("리소스 사용 불가: {filename} ({reason})")]
    ResourceUnavailable { filename: String, reason: String },

    #[error("재시도 한도 초과: {attempts}회 연속 타임아웃")]
    RetryBudgetExhausted { attempts: u32 },

    #[error("상대측 에러 패킷: {code} - {message}")]
    ProtocolError { code: ErrorCode, message: String },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("이미 끝난 세션: 다운로드마다 새 소켓 필요")]
    SessionFinished,
}

impl Error {
    /// 원격 측이 파일 없음 에러를 보냈는지 여부
    pub fn is_file_not_found(&self) -> bool {
        matches!(
            self,
            Error::ProtocolError {
                code: ErrorCode::FileNotFound,
                ..
            }
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
