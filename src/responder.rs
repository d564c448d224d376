//! 응답자 (서버측 세션)
//!
//! - 요청 검증 실패 시 아무것도 보내지 않고 종료
//! - 파일 열기 실패 시에만 에러 패킷 1개 전송
//! - 윈도우 단위 전송, 전진하는 ACK마다 새 윈도우 전송

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::block::BlockSource;
use crate::packet::{self, ErrorCode, Packet, RequestPacket};
use crate::provider::FileProvider;
use crate::retry::RetryController;
use crate::stats::TransferStats;
use crate::transport::Transport;
use crate::window::{wire_block, AckOutcome, SendWindow};
use crate::{Config, Error, Result};

/// 파일 열기 실패 시 보내는 메시지
pub const FILE_NOT_FOUND_MESSAGE: &str = "File not found";

/// 응답자 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    /// 요청 검증 중
    Validating,

    /// 윈도우 전송 중
    Sending,

    Completed,

    Failed,
}

/// 세션 결과 보고
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub filename: String,
    pub peer: SocketAddr,
    pub blocks: u64,
    pub bytes: u64,
    pub window_size: u16,
    pub stats: TransferStats,
}

/// 응답자
pub struct Responder<T, P> {
    config: Config,
    transport: T,
    peer: SocketAddr,
    provider: Arc<P>,
    state: ResponderState,
}

impl<T: Transport, P: FileProvider> Responder<T, P> {
    /// 세션 전용 전송 수단과 요청자 주소로 생성
    pub fn new(config: Config, transport: T, peer: SocketAddr, provider: Arc<P>) -> Self {
        Self {
            config,
            transport,
            peer,
            provider,
            state: ResponderState::Validating,
        }
    }

    pub fn state(&self) -> ResponderState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 최초 요청 바이트로 전송 실행
    pub async fn run(&mut self, initial: &[u8]) -> Result<TransferReport> {
        self.state = ResponderState::Validating;

        let result = self.drive(initial).await;
        match &result {
            Ok(report) => {
                self.state = ResponderState::Completed;
                info!(
                    "전송 {} 성공: {} -> {} ({} blocks, {})",
                    report.filename,
                    self.transport.local_addr().map(|a| a.to_string()).unwrap_or_default(),
                    report.peer,
                    report.blocks,
                    report.stats.summary()
                );
            }
            Err(e) => {
                self.state = ResponderState::Failed;
                warn!("전송 실패 ({}): {}", self.peer, e);
            }
        }
        result
    }

    /// 요청 검증
    fn validate(&self, initial: &[u8]) -> Result<RequestPacket> {
        let request =
            packet::decode_request(initial).map_err(|e| Error::RequestRejected(e.to_string()))?;

        if request.window_size > self.config.max_window_size {
            return Err(Error::RequestRejected(format!(
                "window size {} exceeds {}",
                request.window_size, self.config.max_window_size
            )));
        }
        Ok(request)
    }

    async fn drive(&mut self, initial: &[u8]) -> Result<TransferReport> {
        let mut stats = TransferStats::new();

        // === Validating ===
        let request = self.validate(initial)?;
        info!(
            "요청 수신: {} from {} (window {})",
            request.filename, self.peer, request.window_size
        );

        let data = match self.provider.open(&request.filename).await {
            Ok(data) => data,
            Err(e) => {
                let reply = packet::encode_error(ErrorCode::FileNotFound, FILE_NOT_FOUND_MESSAGE);
                self.transport.send_to(&reply, self.peer).await?;
                stats.record_sent(reply.len());
                return Err(Error::ResourceUnavailable {
                    filename: request.filename,
                    reason: e.to_string(),
                });
            }
        };

        // === Sending ===
        self.state = ResponderState::Sending;
        let source = BlockSource::new(data, self.config.block_size);
        let mut window = SendWindow::new(source.block_count(), request.window_size);
        let mut retry = RetryController::from_config(&self.config);
        let mut buf = vec![0u8; self.config.recv_buffer_size];

        self.send_window(&source, &window, &mut retry, &mut stats).await?;

        loop {
            let (len, _) = retry
                .recv_from(&self.transport, &mut buf, Some(self.peer), &mut stats)
                .await?;

            match Packet::from_bytes(&buf[..len]) {
                Ok(Packet::Ack { block }) => match window.on_ack(block) {
                    AckOutcome::Completed => break,
                    AckOutcome::Advanced => {
                        debug!("{}: {} blocks 확인", request.filename, window.base());
                        self.send_window(&source, &window, &mut retry, &mut stats).await?;
                    }
                    AckOutcome::Ignored => {
                        debug!("오래된 ACK {} 무시 (base {})", block, window.base());
                        stats.stale_acks += 1;
                    }
                },
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
        }

        stats.finish();
        Ok(TransferReport {
            filename: request.filename,
            peer: self.peer,
            blocks: window.total_blocks(),
            bytes: source.len() as u64,
            window_size: request.window_size,
            stats,
        })
    }

    /// 현재 윈도우 전체 전송, 재전송 단위로 등록
    async fn send_window(
        &self,
        source: &BlockSource,
        window: &SendWindow,
        retry: &mut RetryController,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let unit: Vec<Bytes> = window
            .blocks_to_send()
            .filter_map(|n| source.block(n).map(|b| packet::encode_data(wire_block(n), &b)))
            .collect();

        retry.transmit(&self.transport, unit, self.peer, stats).await
    }
}
