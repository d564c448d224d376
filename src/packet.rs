//! 패킷 정의 및 와이어 인코딩
//!
//! 모든 숫자 필드는 빅엔디안 u16, 그 뒤에 NUL 종료 문자열 또는 페이로드
//!
//! ```text
//! Request : | 1 | filename\0 | octet\0 | windowsize\0 | <n>\0 |
//! Data    : | 3 | block:u16 | payload (0..block_size) |
//! Ack     : | 4 | block:u16 |
//! Error   : | 5 | code:u16 | message\0 |
//! ```

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result, DATA_HEADER_SIZE};

/// 전송 모드 문자열
pub const MODE_OCTET: &str = "octet";

/// 윈도우 크기 옵션 이름
pub const OPTION_WINDOWSIZE: &str = "windowsize";

const OPCODE_SIZE: usize = 2;

/// 패킷 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    /// 읽기 요청
    Request = 1,

    /// 데이터 블록
    Data = 3,

    /// 누적 ACK
    Ack = 4,

    /// 에러 통지
    Error = 5,
}

impl TryFrom<u16> for Opcode {
    type Error = crate::Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            1 => Ok(Opcode::Request),
            3 => Ok(Opcode::Data),
            4 => Ok(Opcode::Ack),
            5 => Ok(Opcode::Error),
            other => Err(Error::MalformedPacket(format!("unknown opcode {}", other))),
        }
    }
}

/// 에러 패킷 코드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// 파일 없음 또는 열 수 없음
    FileNotFound,

    /// 그 외 코드
    Other(u16),
}

impl From<u16> for ErrorCode {
    fn from(code: u16) -> Self {
        match code {
            1 => ErrorCode::FileNotFound,
            other => ErrorCode::Other(other),
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::FileNotFound => 1,
            ErrorCode::Other(other) => other,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::FileNotFound => write!(f, "file not found"),
            ErrorCode::Other(code) => write!(f, "error code {}", code),
        }
    }
}

/// 읽기 요청 내용
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPacket {
    pub filename: String,
    pub window_size: u16,
}

/// 통합 패킷 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Request(RequestPacket),
    Data { block: u16, payload: Bytes },
    Ack { block: u16 },
    Error { code: ErrorCode, message: String },
}

impl Packet {
    /// 패킷 타입 반환
    pub fn opcode(&self) -> Opcode {
        match self {
            Packet::Request(_) => Opcode::Request,
            Packet::Data { .. } => Opcode::Data,
            Packet::Ack { .. } => Opcode::Ack,
            Packet::Error { .. } => Opcode::Error,
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Packet::Request(req) => encode_request(&req.filename, req.window_size),
            Packet::Data { block, payload } => encode_data(*block, payload),
            Packet::Ack { block } => encode_ack(*block),
            Packet::Error { code, message } => encode_error(*code, message),
        }
    }

    /// 바이트에서 역직렬화 (opcode로 분기)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match Opcode::try_from(peek_opcode(bytes)?)? {
            Opcode::Request => decode_request(bytes).map(Packet::Request),
            Opcode::Data => {
                decode_data(bytes).map(|(block, payload)| Packet::Data { block, payload })
            }
            Opcode::Ack => decode_ack(bytes).map(|block| Packet::Ack { block }),
            Opcode::Error => {
                decode_error(bytes).map(|(code, message)| Packet::Error { code, message })
            }
        }
    }
}

/// 선두 opcode만 읽기
pub fn peek_opcode(bytes: &[u8]) -> Result<u16> {
    if bytes.len() < OPCODE_SIZE {
        return Err(Error::TruncatedPacket {
            expected: OPCODE_SIZE,
            got: bytes.len(),
        });
    }
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// 읽기 요청 인코딩
pub fn encode_request(filename: &str, window_size: u16) -> Bytes {
    let window = window_size.to_string();
    let mut buf = BytesMut::with_capacity(
        OPCODE_SIZE + filename.len() + MODE_OCTET.len() + OPTION_WINDOWSIZE.len() + window.len() + 4,
    );
    buf.put_u16(Opcode::Request as u16);
    for field in [filename, MODE_OCTET, OPTION_WINDOWSIZE, window.as_str()] {
        buf.put_slice(field.as_bytes());
        buf.put_u8(0);
    }
    buf.freeze()
}

/// 읽기 요청 디코딩
///
/// 필드가 4개 미만이거나 모드가 octet이 아니거나 옵션이 windowsize가 아니면
/// 요청 자체가 무효. 기본값으로 대체하지 않음
pub fn decode_request(bytes: &[u8]) -> Result<RequestPacket> {
    let opcode = peek_opcode(bytes)?;
    if opcode != Opcode::Request as u16 {
        return Err(Error::MalformedPacket(format!(
            "expected read request, got opcode {}",
            opcode
        )));
    }

    let body = &bytes[OPCODE_SIZE..];
    let body = match body.split_last() {
        Some((&0, fields)) => fields,
        _ => return Err(Error::MalformedPacket("unterminated request field".into())),
    };

    let fields: Vec<&[u8]> = body.split(|&b| b == 0).collect();
    if fields.len() < 4 {
        return Err(Error::MalformedPacket(format!(
            "request needs 4 fields, got {}",
            fields.len()
        )));
    }

    let filename = std::str::from_utf8(fields[0])
        .map_err(|_| Error::MalformedPacket("filename is not UTF-8".into()))?;
    if filename.is_empty() {
        return Err(Error::MalformedPacket("empty filename".into()));
    }

    if !fields[1].eq_ignore_ascii_case(MODE_OCTET.as_bytes()) {
        return Err(Error::MalformedPacket(format!(
            "unsupported mode {:?}",
            String::from_utf8_lossy(fields[1])
        )));
    }

    if !fields[2].eq_ignore_ascii_case(OPTION_WINDOWSIZE.as_bytes()) {
        return Err(Error::MalformedPacket(format!(
            "missing windowsize option, got {:?}",
            String::from_utf8_lossy(fields[2])
        )));
    }

    let window_size = std::str::from_utf8(fields[3])
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .filter(|&w| w > 0)
        .ok_or_else(|| {
            Error::MalformedPacket(format!(
                "invalid window size {:?}",
                String::from_utf8_lossy(fields[3])
            ))
        })?;

    Ok(RequestPacket {
        filename: filename.to_string(),
        window_size,
    })
}

/// 데이터 패킷 인코딩
pub fn encode_data(block: u16, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(DATA_HEADER_SIZE + payload.len());
    buf.put_u16(Opcode::Data as u16);
    buf.put_u16(block);
    buf.put_slice(payload);
    buf.freeze()
}

/// 데이터 패킷 디코딩
pub fn decode_data(bytes: &[u8]) -> Result<(u16, Bytes)> {
    let mut buf = fixed_header(bytes, Opcode::Data)?;
    let block = buf.get_u16();
    Ok((block, Bytes::copy_from_slice(buf)))
}

/// ACK 인코딩
pub fn encode_ack(block: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(DATA_HEADER_SIZE);
    buf.put_u16(Opcode::Ack as u16);
    buf.put_u16(block);
    buf.freeze()
}

/// ACK 디코딩
pub fn decode_ack(bytes: &[u8]) -> Result<u16> {
    let mut buf = fixed_header(bytes, Opcode::Ack)?;
    Ok(buf.get_u16())
}

/// 에러 패킷 인코딩
pub fn encode_error(code: ErrorCode, message: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(DATA_HEADER_SIZE + message.len() + 1);
    buf.put_u16(Opcode::Error as u16);
    buf.put_u16(code.into());
    buf.put_slice(message.as_bytes());
    buf.put_u8(0);
    buf.freeze()
}

/// 에러 패킷 디코딩
///
/// 메시지의 NUL 종료가 없으면 남은 바이트 전체를 메시지로 취급
pub fn decode_error(bytes: &[u8]) -> Result<(ErrorCode, String)> {
    let mut buf = fixed_header(bytes, Opcode::Error)?;
    let code = ErrorCode::from(buf.get_u16());
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let message = String::from_utf8_lossy(&buf[..end]).into_owned();
    Ok((code, message))
}

/// opcode + u16 고정 헤더 확인 후 opcode 이후 버퍼 반환
fn fixed_header(bytes: &[u8], expected: Opcode) -> Result<&[u8]> {
    if bytes.len() < DATA_HEADER_SIZE {
        return Err(Error::TruncatedPacket {
            expected: DATA_HEADER_SIZE,
            got: bytes.len(),
        });
    }
    let mut buf = bytes;
    let opcode = buf.get_u16();
    if opcode != expected as u16 {
        return Err(Error::MalformedPacket(format!(
            "expected opcode {}, got {}",
            expected as u16, opcode
        )));
    }
    Ok(buf)
}
