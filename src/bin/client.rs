//! SWFT 클라이언트 - Stop-and-Wait File Transfer
//!
//! TCP(원시 스트림) 또는 UDP(Stop-and-Wait ARQ)로 파일을 주고받는 클라이언트
//!
//! 사용법:
//!   cargo run --release --bin swft-client -- [OPTIONS] <COMMAND>
//!
//! 예시:
//!   # TCP 업로드
//!   cargo run --release --bin swft-client -- --host 127.0.0.1 upload report.pdf
//!
//!   # UDP 다운로드
//!   cargo run --release --bin swft-client -- --udp download report.pdf

use std::path::PathBuf;
use std::process;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use swft::{
    Config, DatagramTransport, Endpoint, Session, StreamTransport, Transport, TransferReport,
    TransportMode,
};

/// 실행할 작업
enum Action {
    Upload(PathBuf),
    Download(String),
    Command(String),
}

/// 클라이언트 설정
struct ClientConfig {
    host: String,
    port: Option<String>,
    mode: TransportMode,
    action: Option<Action>,
    config: Config,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
            mode: TransportMode::Stream,
            action: None,
            config: Config::default(),
        }
    }
}

fn usage() -> ! {
    println!(
        r#"SWFT Client - Stop-and-Wait File Transfer 클라이언트

TCP 는 원시 바이트 스트림, UDP 는 seq/ACK/재전송 기반 Stop-and-Wait ARQ 사용

사용법:
  swft-client [OPTIONS] upload <PATH>
  swft-client [OPTIONS] download <NAME>
  swft-client [OPTIONS] cmd <TEXT...>

옵션:
  -H, --host <IP>            서버 IPv4 주소 (기본: 127.0.0.1)
  -p, --port <PORT>          서버 포트 (기본: TCP 8080, UDP 8081)
  -u, --udp                  UDP + ARQ 사용 (기본: TCP)
  -d, --download-dir <DIR>   다운로드 저장 디렉토리 (기본: downloads)
  --payload-size <BYTES>     ARQ 패킷 페이로드 크기 (기본: 1024)
  --chunk-size <BYTES>       TCP 청크 크기 (기본: 1024)
  --timeout-ms <MS>          UDP 수신 타임아웃 (기본: 2000)
  --retries <N>              ARQ 최대 재전송 횟수 (기본: 5)
  -r, --resume               받다 만 파일이 있으면 이어받기 (TCP)
  -h, --help                 이 도움말 출력

로그 레벨은 RUST_LOG 로 조정 (기본: info)
"#
    );
    process::exit(0);
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> T {
    match value.map(|v| v.parse()) {
        Some(Ok(n)) => n,
        _ => {
            eprintln!("{flag}: 유효한 숫자 필요");
            process::exit(2);
        }
    }
}

fn parse_args() -> ClientConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-H" => {
                if i + 1 < args.len() {
                    config.host = args[i + 1].clone();
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    config.port = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--udp" | "-u" => {
                config.mode = TransportMode::Datagram;
            }
            "--download-dir" | "-d" => {
                if i + 1 < args.len() {
                    config.config.download_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--payload-size" => {
                config.config.payload_size = parse_number(&args[i], args.get(i + 1));
                i += 1;
            }
            "--chunk-size" => {
                config.config.chunk_size = parse_number(&args[i], args.get(i + 1));
                i += 1;
            }
            "--timeout-ms" => {
                config.config.datagram_timeout_ms = parse_number(&args[i], args.get(i + 1));
                i += 1;
            }
            "--retries" => {
                config.config.max_retries = parse_number(&args[i], args.get(i + 1));
                i += 1;
            }
            "--resume" | "-r" => {
                config.config.resume_downloads = true;
            }
            "--help" | "-h" => usage(),
            "upload" if i + 1 < args.len() => {
                config.action = Some(Action::Upload(PathBuf::from(&args[i + 1])));
                i += 1;
            }
            "download" if i + 1 < args.len() => {
                config.action = Some(Action::Download(args[i + 1].clone()));
                i += 1;
            }
            "cmd" if i + 1 < args.len() => {
                config.action = Some(Action::Command(args[i + 1..].join(" ")));
                break;
            }
            other => {
                eprintln!("알 수 없는 인자: {other} (--help 참고)");
                process::exit(2);
            }
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

    let client_config = parse_args();
    let Some(action) = client_config.action else {
        usage();
    };

    let port = client_config
        .port
        .unwrap_or_else(|| client_config.mode.default_port().to_string());
    let endpoint = Endpoint::parse(&client_config.host, &port)?;

    info!("SWFT Client starting...");
    info!("Server: {} ({})", endpoint, client_config.mode);

    match client_config.mode {
        TransportMode::Stream => {
            let transport = StreamTransport::new(endpoint, client_config.config);
            run(Session::new(transport), action).await
        }
        TransportMode::Datagram => {
            let transport = DatagramTransport::new(endpoint, client_config.config);
            run(Session::new(transport), action).await
        }
    }
}

async fn run<T: Transport>(
    mut session: Session<T>,
    action: Action,
) -> Result<(), Box<dyn std::error::Error>> {
    // Ctrl-C → 청크/재전송 사이에서 중단
    let cancel = session.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling...");
            cancel.cancel();
        }
    });

    // 10% 단위 진행 표시
    let mut next_step = 10u32;
    session.on_progress(move |progress| {
        let percent = progress.percent() as u32;
        if percent >= next_step {
            info!(
                "Progress: {}% ({}/{} bytes)",
                percent, progress.transferred, progress.total
            );
            next_step = (percent / 10 + 1) * 10;
        }
    });

    let result = match action {
        Action::Upload(path) => session.upload(&path).await.map(Some),
        Action::Download(name) => session.download(&name).await.map(Some),
        Action::Command(text) => session.send_command(&text).await.map(|response| {
            println!("{}", response);
            None
        }),
    };

    match result {
        Ok(Some(report)) => {
            print_report(&report);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

fn print_report(report: &TransferReport) {
    info!("Transfer complete!");
    info!("  File: {}", report.filename);
    info!("  Bytes: {}/{}", report.bytes, report.total);
    if report.resumed_from > 0 {
        info!("  Resumed at: {}", report.resumed_from);
    }
    info!("  Time: {:.2}s", report.elapsed.as_secs_f64());
    info!("  Bitrate: {}", report.bitrate());
    info!("  Completion: {}", report.completion);
    if let Some(message) = &report.message {
        info!("  Server: {}", message);
    }
    if let Some(arq) = &report.arq {
        info!(
            "  ARQ: {} transmissions, {} retransmits, {} duplicates",
            arq.transmissions, arq.retransmissions, arq.duplicates
        );
    }
}
