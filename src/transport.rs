//! 데이터그램 전송 추상화
//!
//! 세션은 이 트레이트로만 송수신하므로 테스트에서 손실 주입 래퍼로 교체 가능

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// 데이터그램 송수신 인터페이스
pub trait Transport: Send + Sync {
    fn send_to(&self, buf: &[u8], target: SocketAddr)
        -> impl Future<Output = io::Result<usize>> + Send;

    fn recv_from(&self, buf: &mut [u8])
        -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Transport for UdpSocket {
    fn send_to(&self, buf: &[u8], target: SocketAddr)
        -> impl Future<Output = io::Result<usize>> + Send {
        UdpSocket::send_to(self, buf, target)
    }

    fn recv_from(&self, buf: &mut [u8])
        -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send {
        UdpSocket::recv_from(self, buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// 일시적 수신 에러 여부
///
/// 일부 플랫폼은 이전 송신의 ICMP 도달 불가를 다음 recv 에러로 돌려준다
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused | io::ErrorKind::Interrupted
    )
}
