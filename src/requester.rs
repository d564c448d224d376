//! 요청자 (클라이언트측)
//!
//! - 읽기 요청 전송 후 첫 응답의 주소를 세션 피어로 고정
//! - 다음 순번 블록만 수락, 순서 이탈 시 즉시 재동기화 ACK
//! - 윈도우 경계와 마지막 블록에서만 ACK

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::packet::{self, Packet};
use crate::retry::RetryController;
use crate::stats::TransferStats;
use crate::transport::Transport;
use crate::window::{DataOutcome, ReceiveWindow};
use crate::{Config, Error, Result};

/// 요청자 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterState {
    /// 요청 전송, 첫 응답 대기
    Handshaking,

    /// 데이터 수신 중
    Receiving,

    Completed,

    Failed,
}

/// 완료된 다운로드
#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,

    /// 실제로 데이터를 보낸 응답자 주소
    pub peer: SocketAddr,

    pub data: Bytes,

    /// 수락한 블록 수 (빈 종료 블록 포함)
    pub blocks: u64,

    /// 수락한 페이로드의 CRC32
    pub digest: u32,

    pub stats: TransferStats,
}

impl Download {
    pub fn digest_hex(&self) -> String {
        format!("{:08x}", self.digest)
    }
}

/// 요청자
pub struct Requester<T = UdpSocket> {
    config: Config,
    transport: T,
    server_addr: SocketAddr,
    peer: Option<SocketAddr>,
    state: RequesterState,
}

impl Requester<UdpSocket> {
    /// 소켓 바인딩 후 요청자 생성
    pub async fn bind(config: Config, bind_addr: SocketAddr, server_addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        Self::with_transport(config, socket, server_addr)
    }
}

impl<T: Transport> Requester<T> {
    pub fn with_transport(config: Config, transport: T, server_addr: SocketAddr) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            server_addr,
            peer: None,
            state: RequesterState::Handshaking,
        })
    }

    pub fn state(&self) -> RequesterState {
        self.state
    }

    /// 핸드쉐이크로 확정된 피어
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// 파일 다운로드
    ///
    /// 요청자 하나가 세션 하나. 이전 세션의 늦은 데이터그램이 소켓에 남아
    /// 있을 수 있으므로 끝난 요청자로 다시 부르면 `Error::SessionFinished`.
    pub async fn download(&mut self, filename: &str) -> Result<Download> {
        if matches!(self.state, RequesterState::Completed | RequesterState::Failed) {
            return Err(Error::SessionFinished);
        }

        let result = self.drive(filename).await;
        match &result {
            Ok(download) => {
                self.state = RequesterState::Completed;
                info!(
                    "다운로드 완료: {} ({} bytes, {} blocks, crc32 {})",
                    filename,
                    download.data.len(),
                    download.blocks,
                    download.digest_hex()
                );
            }
            Err(e) => {
                self.state = RequesterState::Failed;
                warn!("다운로드 실패: {}: {}", filename, e);
            }
        }
        result
    }

    async fn drive(&mut self, filename: &str) -> Result<Download> {
        let mut stats = TransferStats::new();
        let mut retry = RetryController::from_config(&self.config);
        let mut window = ReceiveWindow::new(self.config.window_size, self.config.block_size);
        let mut buf = vec![0u8; self.config.recv_buffer_size];

        // === Phase 1: 핸드쉐이크 ===
        let request = packet::encode_request(filename, self.config.window_size);
        retry
            .transmit(&self.transport, vec![request], self.server_addr, &mut stats)
            .await?;

        let (mut len, peer) = retry
            .recv_from(&self.transport, &mut buf, None, &mut stats)
            .await?;

        // 응답자는 요청 포트와 다른 포트에서 응답할 수 있음
        self.peer = Some(peer);
        self.state = RequesterState::Receiving;
        info!("연결: {} (요청 대상 {})", peer, self.server_addr);

        // === Phase 2: 데이터 수신 ===
        loop {
            match Packet::from_bytes(&buf[..len]) {
                Ok(Packet::Data { block, payload }) if payload.len() <= self.config.block_size => {
                    match window.on_data(block, &payload) {
                        DataOutcome::Accepted { ack: Some(ack) } => {
                            self.send_ack(&mut retry, ack, peer, &mut stats).await?;
                        }
                        DataOutcome::Accepted { ack: None } => {
                            retry.arm(vec![packet::encode_ack(window.ack_number())], peer);
                        }
                        DataOutcome::Final { ack } => {
                            self.transport.send_to(&packet::encode_ack(ack), peer).await?;
                            stats.record_sent(crate::DATA_HEADER_SIZE);
                            break;
                        }
                        DataOutcome::OutOfOrder { ack } => {
                            debug!(
                                "순서 이탈 블록 {} (예상 {}), ACK {} 재전송",
                                block,
                                window.expected_block(),
                                ack
                            );
                            stats.out_of_order += 1;
                            self.send_ack(&mut retry, ack, peer, &mut stats).await?;
                        }
                    }
                }
                Ok(Packet::Error { code, message }) => {
                    return Err(Error::ProtocolError { code, message });
                }
                Ok(other) => {
                    debug!("예상 외 패킷 무시: {:?}", other.opcode());
                    stats.ignored += 1;
                }
                Err(e) => {
                    debug!("해석 불가 패킷 무시: {}", e);
                    stats.ignored += 1;
                }
            }

            let (next_len, _) = retry
                .recv_from(&self.transport, &mut buf, Some(peer), &mut stats)
                .await?;
            len = next_len;
        }

        stats.finish();
        let blocks = window.highest_accepted();
        let (data, digest) = window.into_sink().finish();

        Ok(Download {
            filename: filename.to_string(),
            peer,
            data,
            blocks,
            digest,
            stats,
        })
    }

    async fn send_ack(
        &self,
        retry: &mut RetryController,
        ack: u16,
        peer: SocketAddr,
        stats: &mut TransferStats,
    ) -> Result<()> {
        retry
            .transmit(&self.transport, vec![packet::encode_ack(ack)], peer, stats)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ErrorCode;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            timeout_ms: 100,
            ..Config::default()
        }
    }

    async fn recv_packet(socket: &UdpSocket) -> (Packet, SocketAddr) {
        let mut buf = vec![0u8; 2048];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("패킷 대기 타임아웃")
            .unwrap();
        (Packet::from_bytes(&buf[..len]).unwrap(), from)
    }

    #[tokio::test]
    async fn test_peer_switches_to_reply_port() {
        // 요청은 listen 소켓으로, 응답은 별도 세션 소켓에서
        let listen = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let session = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let session_addr = session.local_addr().unwrap();

        let mut requester =
            Requester::bind(test_config(), "127.0.0.1:0".parse().unwrap(), listen.local_addr().unwrap())
                .await
                .unwrap();

        let server = tokio::spawn(async move {
            let (packet, client) = recv_packet(&listen).await;
            assert!(matches!(packet, Packet::Request(ref r) if r.filename == "f" && r.window_size == 32));

            session.send_to(&packet::encode_data(1, b"tiny"), client).await.unwrap();
            let (ack, from) = recv_packet(&session).await;
            assert_eq!(ack, Packet::Ack { block: 1 });
            assert_eq!(from, client);
        });

        let download = requester.download("f").await.unwrap();
        server.await.unwrap();

        assert_eq!(&download.data[..], b"tiny");
        assert_eq!(download.peer, session_addr);
        assert_eq!(requester.peer(), Some(session_addr));
        assert_eq!(requester.state(), RequesterState::Completed);
        assert_eq!(download.digest, crc32fast::hash(b"tiny"));
    }

    #[tokio::test]
    async fn test_unknown_source_is_discarded() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let intruder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let mut requester = Requester::bind(test_config(), "127.0.0.1:0".parse().unwrap(), server_addr)
            .await
            .unwrap();

        let task = tokio::spawn(async move {
            let (_, client) = recv_packet(&server).await;
            server.send_to(&packet::encode_data(1, &[1u8; 512]), client).await.unwrap();

            // 다른 주소에서 온 그럴듯한 마지막 블록
            tokio::time::sleep(Duration::from_millis(20)).await;
            intruder.send_to(&packet::encode_data(2, b"evil"), client).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;

            server.send_to(&packet::encode_data(2, &[2u8; 100]), client).await.unwrap();
            let (ack, _) = recv_packet(&server).await;
            assert_eq!(ack, Packet::Ack { block: 2 });
        });

        let download = requester.download("f").await.unwrap();
        task.await.unwrap();

        assert_eq!(download.data.len(), 612);
        assert!(download.data[512..].iter().all(|&b| b == 2));
        assert_eq!(download.blocks, 2);
        assert_eq!(download.stats.ignored, 1);
    }

    #[tokio::test]
    async fn test_gap_triggers_forced_ack() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let mut requester = Requester::bind(test_config(), "127.0.0.1:0".parse().unwrap(), server_addr)
            .await
            .unwrap();

        let task = tokio::spawn(async move {
            let (_, client) = recv_packet(&server).await;
            server.send_to(&packet::encode_data(1, &[0u8; 512]), client).await.unwrap();
            // 블록 2 손실
            server.send_to(&packet::encode_data(3, &[0u8; 512]), client).await.unwrap();

            let (ack, _) = recv_packet(&server).await;
            assert_eq!(ack, Packet::Ack { block: 1 });

            server.send_to(&packet::encode_data(2, &[0u8; 512]), client).await.unwrap();
            server.send_to(&packet::encode_data(3, &[0u8; 10]), client).await.unwrap();
            let (ack, _) = recv_packet(&server).await;
            assert_eq!(ack, Packet::Ack { block: 3 });
        });

        let download = requester.download("f").await.unwrap();
        task.await.unwrap();

        assert_eq!(download.data.len(), 1034);
        assert_eq!(download.stats.out_of_order, 1);
    }

    #[tokio::test]
    async fn test_error_packet_fails_without_reply() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let mut requester = Requester::bind(test_config(), "127.0.0.1:0".parse().unwrap(), server_addr)
            .await
            .unwrap();

        let task = tokio::spawn(async move {
            let (_, client) = recv_packet(&server).await;
            server
                .send_to(&packet::encode_error(ErrorCode::FileNotFound, "File not found"), client)
                .await
                .unwrap();

            // 에러 이후 요청자는 아무것도 보내지 않음
            let mut buf = [0u8; 64];
            let silent =
                tokio::time::timeout(Duration::from_millis(300), server.recv_from(&mut buf)).await;
            assert!(silent.is_err());
        });

        let err = requester.download("missing").await.unwrap_err();
        task.await.unwrap();

        assert!(err.is_file_not_found());
        assert_eq!(requester.state(), RequesterState::Failed);
    }

    #[tokio::test]
    async fn test_handshake_gives_up_after_attempts() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = Config {
            timeout_ms: 30,
            max_attempts: 5,
            ..Config::default()
        };

        let mut requester = Requester::with_transport(
            config,
            crate::simulator::LossyTransport::new(socket).drop_all(),
            silent.local_addr().unwrap(),
        )
        .unwrap();

        let err = requester.download("f").await.unwrap_err();
        assert!(matches!(err, Error::RetryBudgetExhausted { attempts: 5 }));
        // 요청 1회 + 재전송 4회
        assert_eq!(requester.transport().sent(), 5);
        assert_eq!(requester.state(), RequesterState::Failed);
    }
}
