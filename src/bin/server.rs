//! SWFT 서버 - Stop-and-Wait File Transfer
//!
//! 저장소 디렉토리를 기준으로 TCP(원시 스트림)와 UDP(Stop-and-Wait ARQ) 업로드/다운로드 제공
//!
//! 사용법:
//!   cargo run --release --bin swft-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 포트 (TCP 8080, UDP 8081)
//!   cargo run --release --bin swft-server
//!
//!   # 손실 많은 링크용 설정
//!   cargo run --release --bin swft-server -- --storage /srv/files --lossy

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use swft::{Config, Server, ServerConfig};

fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--tcp" | "-t" => {
                if i + 1 < args.len() {
                    config.tcp_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--udp" | "-u" => {
                if i + 1 < args.len() {
                    config.udp_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--storage" | "-s" => {
                if i + 1 < args.len() {
                    config.storage_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--payload-size" => {
                if i + 1 < args.len() {
                    config.config.payload_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--timeout-ms" => {
                if i + 1 < args.len() {
                    config.config.datagram_timeout_ms =
                        args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--retries" => {
                if i + 1 < args.len() {
                    config.config.max_retries = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--lossy" => {
                config.config = Config::lossy_network();
            }
            "--lan" => {
                config.config = Config::lan();
            }
            "--help" | "-h" => {
                println!(
                    r#"SWFT Server - Stop-and-Wait File Transfer 서버

TCP: UPLOAD / DOWNLOAD / ECHO / TIME / QUIT
UDP: UDP_UPLOAD / UDP_DOWNLOAD / TIME (한 번에 하나씩 처리)

사용법:
  cargo run --release --bin swft-server -- [OPTIONS]

옵션:
  -t, --tcp <ADDR>          TCP 바인드 주소 (기본: 0.0.0.0:8080)
  -u, --udp <ADDR>          UDP 바인드 주소 (기본: 0.0.0.0:8081)
  -s, --storage <DIR>       저장소 디렉토리 (기본: uploads)
  --payload-size <BYTES>    ARQ 패킷 페이로드 크기 (기본: 1024)
  --timeout-ms <MS>         UDP 수신 타임아웃 (기본: 2000)
  --retries <N>             ARQ 최대 재전송 횟수 (기본: 5)
  --lossy                   손실 많은 네트워크 프리셋
  --lan                     로컬 네트워크 프리셋
  -h, --help                이 도움말 출력

로그 레벨은 RUST_LOG 로 조정 (기본: info)
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
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let server_config = parse_args();

    info!("SWFT Server starting...");
    info!("Storage: {:?}", server_config.storage_dir);
    info!("ARQ payload: {} bytes", server_config.config.payload_size);
    info!(
        "Datagram timeout: {} ms, retries: {}",
        server_config.config.datagram_timeout_ms, server_config.config.max_retries
    );

    let server = Server::bind(server_config).await?;
    info!("TCP listening on {}", server.tcp_local_addr()?);
    info!("UDP listening on {}", server.udp_local_addr()?);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
    }

    Ok(())
}
