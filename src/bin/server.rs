//! WTFTP 서버 - Windowed TFTP 읽기 전송 서버
//!
//! 디렉터리 아래 파일을 윈도우 단위로 전송
//! - 피어마다 독립 세션 소켓과 태스크
//! - 연속 타임아웃 한도로 죽은 세션 자동 정리
//!
//! 사용법:
//!   cargo run --release --bin wtftp-server -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin wtftp-server -- --bind 0.0.0.0:6969 --dir ./files

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wtftp::{Config, DirectoryProvider, Dispatcher};

/// 서버 설정
struct ServerConfig {
    bind_addr: SocketAddr,
    root: PathBuf,
    config: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 6969)),
            root: PathBuf::from("."),
            config: Config::default(),
        }
    }
}

fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--dir" | "-d" => {
                if i + 1 < args.len() {
                    config.root = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--block-size" => {
                if i + 1 < args.len() {
                    config.config.block_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--max-window" => {
                if i + 1 < args.len() {
                    config.config.max_window_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--attempts" => {
                if i + 1 < args.len() {
                    config.config.max_attempts = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--timeout-ms" => {
                if i + 1 < args.len() {
                    config.config.timeout_ms = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"WTFTP Server - Windowed TFTP 읽기 전송 서버

사용법:
  cargo run --release --bin wtftp-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>       바인드 주소 (기본: 0.0.0.0:6969)
  -d, --dir <PATH>        제공할 디렉터리 (기본: .)
  --block-size <SIZE>     블록 크기 바이트 (기본: 512)
  --max-window <N>        허용할 최대 윈도우 크기 (기본: 8192)
  --attempts <N>          연속 타임아웃 허용 횟수 (기본: 5)
  --timeout-ms <MS>       수신 타임아웃 (기본: 1000)
  -h, --help              이 도움말 출력

환경 변수:
  RUST_LOG                로그 필터 (기본: info)
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let server_config = parse_args();

    info!("WTFTP Server starting...");
    info!("Serving directory: {:?}", server_config.root);
    info!("Block size: {} bytes", server_config.config.block_size);
    info!("Max attempts: {}", server_config.config.max_attempts);
    info!("Timeout: {} ms", server_config.config.timeout_ms);

    let provider = Arc::new(DirectoryProvider::new(server_config.root));
    let dispatcher =
        Dispatcher::bind(server_config.config, server_config.bind_addr, provider).await?;

    info!("Waiting for clients...");
    dispatcher.run().await?;

    Ok(())
}
