//! 세션 디스패처 (서버측)
//!
//! 리스닝 소켓 하나로 새 피어의 요청만 받아 세션을 만든다.
//! 세션은 각자 소켓과 태스크를 가지고 후속 트래픽을 직접 받으며,
//! 디스패처는 세션 등록/정리만 담당한다.
//!
//! 세션 레지스트리는 디스패처 루프만 추가/삭제하고, 세션은 oneshot
//! 채널로 결과를 알린다.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::provider::FileProvider;
use crate::responder::{Responder, TransferReport};
use crate::transport::is_transient;
use crate::{Config, Result};

/// 실행 중인 세션 핸들
struct SessionHandle {
    /// 세션 결과 수신
    done: oneshot::Receiver<Result<TransferReport>>,

    task: JoinHandle<()>,

    started_at: Instant,
}

/// 세션 디스패처
pub struct Dispatcher<P> {
    config: Config,
    socket: UdpSocket,
    local_addr: SocketAddr,
    provider: Arc<P>,

    /// 피어 주소 -> 세션
    sessions: DashMap<SocketAddr, SessionHandle>,

    running: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl<P: FileProvider> Dispatcher<P> {
    /// 리스닝 소켓 바인딩
    pub async fn bind(config: Config, bind_addr: SocketAddr, provider: Arc<P>) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(bind_addr).await?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            config,
            socket,
            local_addr,
            provider,
            sessions: DashMap::new(),
            running: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 디스패처 루프. `stop()` 호출 후 다음 주기에 종료
    pub async fn run(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("WTFTP server listening on {}", self.local_addr);

        let mut buf = vec![0u8; self.config.recv_buffer_size];

        while self.running.load(Ordering::SeqCst) {
            let received = tokio::select! {
                result = self.socket.recv_from(&mut buf) => Some(result),
                _ = tokio::time::sleep(self.config.reap_interval()) => None,
            };

            match received {
                Some(Ok((len, addr))) => self.handle_datagram(&buf[..len], addr),
                Some(Err(e)) => {
                    if let Err(e) = check_recv_error(e) {
                        self.running.store(false, Ordering::SeqCst);
                        return Err(e);
                    }
                }
                None => {}
            }

            self.reap();
        }

        info!("WTFTP server on {} stopped", self.local_addr);
        Ok(())
    }

    /// 정지
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 진행 중인 세션 수
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_active(&self, peer: &SocketAddr) -> bool {
        self.sessions.contains_key(peer)
    }

    /// 성공한 전송 수
    pub fn completed_transfers(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// 실패한 전송 수 (거부된 요청 포함)
    pub fn failed_transfers(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn handle_datagram(&self, data: &[u8], peer: SocketAddr) {
        if self.sessions.contains_key(&peer) {
            debug!("{}: 이미 진행 중인 세션, 데이터그램 무시", peer);
            return;
        }

        info!("새 클라이언트: {}", peer);
        let handle = self.spawn_session(Bytes::copy_from_slice(data), peer);
        self.sessions.insert(peer, handle);
        debug!("진행 중인 세션: {}", self.sessions.len());
    }

    fn spawn_session(&self, initial: Bytes, peer: SocketAddr) -> SessionHandle {
        let (done_tx, done_rx) = oneshot::channel();
        let config = self.config.clone();
        let provider = self.provider.clone();
        let session_addr = SocketAddr::new(self.local_addr.ip(), 0);

        let task = tokio::spawn(async move {
            let result = match UdpSocket::bind(session_addr).await {
                Ok(socket) => {
                    let mut responder = Responder::new(config, socket, peer, provider);
                    responder.run(&initial).await
                }
                Err(e) => Err(e.into()),
            };
            let _ = done_tx.send(result);
        });

        SessionHandle {
            done: done_rx,
            task,
            started_at: Instant::now(),
        }
    }

    /// 끝난 세션 정리
    fn reap(&self) {
        self.sessions.retain(|peer, handle| match handle.done.try_recv() {
            Ok(Ok(report)) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    "TRANSFER {} DONE SUCCESSFUL ({}, {} bytes, {:.2}s)",
                    report.filename,
                    peer,
                    report.bytes,
                    handle.started_at.elapsed().as_secs_f64()
                );
                false
            }
            Ok(Err(e)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                info!("TRANSFER FAILED ({}): {}", peer, e);
                false
            }
            Err(oneshot::error::TryRecvError::Empty) => true,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!("{}: 세션 태스크가 결과 없이 종료", peer);
                false
            }
        });
    }
}

/// 리스닝 소켓 수신 에러 분류
///
/// 일시적 에러는 무시하고 계속, 나머지는 루프 종료
fn check_recv_error(e: io::Error) -> Result<()> {
    if is_transient(&e) {
        debug!("일시적 수신 에러: {}", e);
        return Ok(());
    }
    error!("리스닝 소켓 수신 에러, 디스패처 종료: {}", e);
    Err(e.into())
}

impl<P> Drop for Dispatcher<P> {
    fn drop(&mut self) {
        for entry in self.sessions.iter() {
            entry.value().task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{self, Packet};
    use crate::provider::MemoryProvider;
    use crate::requester::Requester;
    use crate::simulator::LossyTransport;
    use crate::Error;
    use std::time::Duration;

    fn file(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    async fn start(config: Config, provider: MemoryProvider) -> Arc<Dispatcher<MemoryProvider>> {
        let dispatcher = Arc::new(
            Dispatcher::bind(config, "127.0.0.1:0".parse().unwrap(), Arc::new(provider))
                .await
                .unwrap(),
        );
        let runner = dispatcher.clone();
        tokio::spawn(async move { runner.run().await });
        dispatcher
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    fn client_config() -> Config {
        Config {
            timeout_ms: 300,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_end_to_end_1300_bytes() {
        let content = file(1300);
        let server = start(
            Config::default(),
            MemoryProvider::new().with_file("data.bin", content.clone()),
        )
        .await;

        let mut requester =
            Requester::bind(client_config(), "127.0.0.1:0".parse().unwrap(), server.local_addr())
                .await
                .unwrap();
        let download = requester.download("data.bin").await.unwrap();

        assert_eq!(download.data.len(), 1300);
        assert_eq!(download.data.as_ref(), content.as_slice());
        assert_eq!(download.blocks, 3);
        assert_eq!(download.digest, crc32fast::hash(&content));
        assert_ne!(download.peer, server.local_addr());

        assert!(wait_until(|| server.completed_transfers() == 1).await);
        assert_eq!(server.active_sessions(), 0);
        server.stop();
    }

    #[tokio::test]
    async fn test_exact_multiple_and_empty_files() {
        let server = start(
            Config::default(),
            MemoryProvider::new()
                .with_file("exact", file(1024))
                .with_file("empty", Vec::new()),
        )
        .await;

        let mut requester =
            Requester::bind(client_config(), "127.0.0.1:0".parse().unwrap(), server.local_addr())
                .await
                .unwrap();

        // 블록 크기의 배수는 빈 종료 블록으로 끝남
        let download = requester.download("exact").await.unwrap();
        assert_eq!(download.data.len(), 1024);
        assert_eq!(download.blocks, 3);

        let mut requester =
            Requester::bind(client_config(), "127.0.0.1:0".parse().unwrap(), server.local_addr())
                .await
                .unwrap();
        let download = requester.download("empty").await.unwrap();
        assert!(download.data.is_empty());
        assert_eq!(download.blocks, 1);

        server.stop();
    }

    #[tokio::test]
    async fn test_missing_file_reports_not_found() {
        let server = start(Config::default(), MemoryProvider::new()).await;

        let mut requester =
            Requester::bind(client_config(), "127.0.0.1:0".parse().unwrap(), server.local_addr())
                .await
                .unwrap();
        let err = requester.download("nope").await.unwrap_err();
        assert!(err.is_file_not_found());

        assert!(wait_until(|| server.failed_transfers() == 1).await);
        server.stop();
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_isolated() {
        let a = file(512 * 40 + 3);
        let b: Vec<u8> = file(700).into_iter().rev().collect();
        let server = start(
            Config::default(),
            MemoryProvider::new().with_file("a", a.clone()).with_file("b", b.clone()),
        )
        .await;
        let addr = server.local_addr();

        let task_a = tokio::spawn(async move {
            let mut r = Requester::bind(client_config(), "127.0.0.1:0".parse().unwrap(), addr)
                .await
                .unwrap();
            r.download("a").await
        });
        let task_b = tokio::spawn(async move {
            let mut r = Requester::bind(client_config(), "127.0.0.1:0".parse().unwrap(), addr)
                .await
                .unwrap();
            r.download("b").await
        });
        // 실패하는 세션이 다른 세션에 영향 없음
        let task_c = tokio::spawn(async move {
            let mut r = Requester::bind(client_config(), "127.0.0.1:0".parse().unwrap(), addr)
                .await
                .unwrap();
            r.download("missing").await
        });

        assert_eq!(task_a.await.unwrap().unwrap().data.as_ref(), a.as_slice());
        assert_eq!(task_b.await.unwrap().unwrap().data.as_ref(), b.as_slice());
        assert!(task_c.await.unwrap().is_err());

        assert!(wait_until(|| server.active_sessions() == 0).await);
        assert_eq!(server.completed_transfers(), 2);
        assert_eq!(server.failed_transfers(), 1);
        server.stop();
    }

    #[tokio::test]
    async fn test_repeat_request_from_same_endpoint_is_not_duplicated() {
        let config = Config {
            timeout_ms: 100,
            max_attempts: 3,
            ..Config::default()
        };
        let server = start(config, MemoryProvider::new().with_file("f", file(5000))).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();
        let request = packet::encode_request("f", 4);
        client.send_to(&request, server.local_addr()).await.unwrap();
        client.send_to(&request, server.local_addr()).await.unwrap();

        // 첫 윈도우 4블록, 같은 세션 소켓에서만 옴
        let mut buf = vec![0u8; 2048];
        let mut sources = Vec::new();
        for expected in 1..=4u16 {
            let (len, from) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(Packet::from_bytes(&buf[..len]).unwrap(), Packet::Data { block, .. } if block == expected));
            sources.push(from);
        }
        assert!(sources.iter().all(|&s| s == sources[0]));
        assert!(server.is_active(&client_addr));
        assert_eq!(server.active_sessions(), 1);

        // ACK 없이 방치하면 재시도 한도 후 정리됨
        assert!(wait_until(|| server.active_sessions() == 0).await);
        assert_eq!(server.failed_transfers(), 1);
        server.stop();
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_silently() {
        let server = start(Config::default(), MemoryProvider::new().with_file("f", file(10))).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(b"\x00\x01f\x00octet\x00", server.local_addr())
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let reply = tokio::time::timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await;
        assert!(reply.is_err());

        assert!(wait_until(|| server.failed_transfers() == 1).await);
        assert_eq!(server.active_sessions(), 0);
        server.stop();
    }

    #[tokio::test]
    async fn test_stop_ends_run_loop() {
        let dispatcher = Arc::new(
            Dispatcher::bind(
                Config::default(),
                "127.0.0.1:0".parse().unwrap(),
                Arc::new(MemoryProvider::new()),
            )
            .await
            .unwrap(),
        );
        let runner = dispatcher.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        assert!(wait_until(|| dispatcher.is_running()).await);
        dispatcher.stop();
        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn test_lost_final_ack_does_not_leak_into_next_download() {
        let config = Config {
            timeout_ms: 100,
            ..Config::default()
        };
        let server = start(
            config.clone(),
            MemoryProvider::new()
                .with_file("a", vec![b'A'; 100])
                .with_file("b", vec![b'B'; 100]),
        )
        .await;

        // 첫 세션의 마지막 ACK 손실, 응답자는 블록 1을 계속 재전송
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let lossy = LossyTransport::new(socket).drop_once(|buf| buf.len() == 4 && buf[..2] == [0, 4]);
        let mut first = Requester::with_transport(config.clone(), lossy, server.local_addr()).unwrap();
        let download = first.download("a").await.unwrap();
        assert_eq!(download.data.as_ref(), &[b'A'; 100][..]);
        assert_eq!(first.transport().dropped(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;

        // 끝난 요청자는 재사용 불가
        assert!(matches!(first.download("b").await, Err(Error::SessionFinished)));

        let mut second = Requester::bind(config, "127.0.0.1:0".parse().unwrap(), server.local_addr())
            .await
            .unwrap();
        let download = second.download("b").await.unwrap();
        assert_eq!(download.data.as_ref(), &[b'B'; 100][..]);
        assert_ne!(Some(download.peer), first.peer());

        // 첫 세션은 ACK를 못 받아 재시도 한도 후 실패
        assert!(wait_until(|| server.failed_transfers() == 1).await);
        assert_eq!(server.completed_transfers(), 1);
        server.stop();
    }

    #[test]
    fn test_recv_error_classification() {
        assert!(check_recv_error(io::Error::from(io::ErrorKind::ConnectionReset)).is_ok());
        assert!(matches!(
            check_recv_error(io::Error::from(io::ErrorKind::PermissionDenied)),
            Err(Error::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = Config {
            max_attempts: 0,
            ..Config::default()
        };
        let result = Dispatcher::bind(
            config,
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(MemoryProvider::new()),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
