//! WTFTP 클라이언트 - Windowed TFTP 읽기 전송 클라이언트
//!
//! 서버에서 파일 하나를 내려받고 CRC32 체크섬 출력
//!
//! 사용법:
//!   cargo run --release --bin wtftp-client -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin wtftp-client -- --server 127.0.0.1:6969 --file data.bin -o received.bin

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wtftp::{Config, Requester};

/// 클라이언트 설정
struct ClientConfig {
    bind_addr: SocketAddr,
    server_addr: SocketAddr,
    file: Option<String>,
    output_path: Option<PathBuf>,
    config: Config,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            server_addr: SocketAddr::from(([127, 0, 0, 1], 6969)),
            file: None,
            output_path: None,
            config: Config::default(),
        }
    }
}

fn parse_args() -> ClientConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    config.server_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--file" | "-f" => {
                if i + 1 < args.len() {
                    config.file = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    config.output_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--window" | "-w" => {
                if i + 1 < args.len() {
                    config.config.window_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--block-size" => {
                if i + 1 < args.len() {
                    config.config.block_size = args[i + 1].parse().expect("유효한 숫자 필요");
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
                    r#"WTFTP Client - Windowed TFTP 읽기 전송 클라이언트

사용법:
  cargo run --release --bin wtftp-client -- --file <NAME> [OPTIONS]

옵션:
  -s, --server <ADDR>     서버 주소 (기본: 127.0.0.1:6969)
  -b, --bind <ADDR>       로컬 바인드 주소 (기본: 0.0.0.0:0)
  -f, --file <NAME>       요청할 파일 이름
  -o, --output <PATH>     저장 경로 (생략 시 저장하지 않음)
  -w, --window <N>        윈도우 크기 (기본: 32)
  --block-size <SIZE>     블록 크기 바이트 (기본: 512, 서버와 같아야 함)
  --attempts <N>          연속 타임아웃 허용 횟수 (기본: 5)
  --timeout-ms <MS>       수신 타임아웃 (기본: 1000)
  -h, --help              이 도움말 출력
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

    let client_config = parse_args();
    let file = client_config.file.ok_or("--file 필요")?;

    info!("WTFTP Client starting...");
    info!("Server address: {}", client_config.server_addr);
    info!("Window size: {}", client_config.config.window_size);

    let mut requester = Requester::bind(
        client_config.config,
        client_config.bind_addr,
        client_config.server_addr,
    )
    .await?;
    info!("Bound to local address: {}", requester.local_addr()?);

    let download = match requester.download(&file).await {
        Ok(download) => download,
        Err(e) if e.is_file_not_found() => {
            error!("File not found or not accessible: {}", file);
            return Err(e.into());
        }
        Err(e) => {
            error!("Transfer failed: {}", e);
            return Err(e.into());
        }
    };

    let elapsed = download.stats.elapsed();
    info!("Download complete from {}", download.peer);
    info!("  Size: {} bytes", download.data.len());
    info!("  Blocks: {}", download.blocks);
    info!("  Time: {:.3}s", elapsed.as_secs_f64());
    info!(
        "  Throughput: {:.2} KB/s",
        download.stats.throughput(download.data.len() as u64) / 1024.0
    );
    info!("  Stats: {}", download.stats.summary());

    if let Some(path) = &client_config.output_path {
        tokio::fs::write(path, &download.data).await?;
        info!("Saved to {:?}", path);
    }

    println!("FILE CHECKSUM (crc32): {}", download.digest_hex());

    Ok(())
}
