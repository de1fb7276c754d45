//! keysync 서버 (송신자)
//!
//! 접속한 클라이언트마다 파일 하나를 키로 알리고 청크 단위로 전송한다.
//! 연결은 순서대로 하나씩 처리한다.
//!
//! 사용법:
//!   cargo run --release --bin keysync-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 전송
//!   cargo run --release --bin keysync-server -- --file data.bin --key 7
//!
//!   # 원형 프레임 + 64바이트 프레임, 연결 하나만 처리
//!   cargo run --release --bin keysync-server -- -f data.bin --framing raw --max-frame-size 64 --once

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use keysync::storage::open_source;
use keysync::{Config, FramedStream, Framing, ProgressHandle, Sender, Sha1Hasher, TransferStats};

/// 서버 인자
#[derive(Debug, Parser)]
#[command(name = "keysync-server", about = "keysync 서버 (송신자)")]
struct Args {
    /// 바인드 주소
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// 전송할 파일 경로
    #[arg(short, long)]
    file: PathBuf,

    /// 파일 키
    #[arg(short, long, default_value_t = 0)]
    key: u32,

    /// KeyAnnounce에 담을 이름 (기본: 파일 이름)
    #[arg(short, long)]
    name: Option<String>,

    /// 최대 프레임 크기 (바이트)
    #[arg(long, default_value_t = keysync::DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// 프레이밍 (raw | length-prefixed)
    #[arg(long, default_value_t = Framing::LengthPrefixed)]
    framing: Framing,

    /// 해시 불일치 시 청크당 재전송 횟수
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// 재개 오프셋
    #[arg(long, default_value_t = 0)]
    resume_from: u64,

    /// 연결 하나만 처리하고 종료
    #[arg(long)]
    once: bool,
}

impl Args {
    fn to_config(&self) -> Config {
        Config {
            max_frame_size: self.max_frame_size,
            framing: self.framing,
            max_chunk_retries: self.retries,
            ..Config::default()
        }
    }

    fn announce_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }
}

/// 주기적으로 진행률 출력
fn spawn_progress_printer(progress: ProgressHandle, interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!("{}", progress.snapshot().summary());
        }
    })
}

/// 연결 하나에 송신 세션 하나
async fn serve_connection(
    stream: TcpStream,
    args: &Args,
    config: &Config,
    name: &str,
) -> keysync::Result<TransferStats> {
    let transport = FramedStream::from_tcp(stream, config.framing, config.max_frame_size)
        .map_err(keysync::Error::Transport)?;
    let source = open_source(&args.file)
        .await
        .map_err(keysync::Error::Storage)?;

    let mut sender = Sender::new(
        config.clone(),
        transport,
        source,
        Sha1Hasher,
        args.key,
        name.to_owned(),
    )?
    .resume_from(args.resume_from);

    let printer = spawn_progress_printer(sender.progress(), config.progress_interval_ms);
    let result = sender.run().await;
    printer.abort();
    result
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.to_config();
    config.validate()?;

    let name = args.announce_name();

    info!("keysync server starting...");
    info!("File: {:?} (key={}, name={:?})", args.file, args.key, name);
    info!("Max frame size: {} bytes", config.max_frame_size);
    info!("Chunk capacity: {} bytes", config.chunk_capacity());
    info!("Framing: {}", config.framing);

    let listener = TcpListener::bind(args.bind).await?;
    info!("Server listening on {}", args.bind);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("Client connected: {}", peer);

        match serve_connection(stream, &args, &config, &name).await {
            Ok(stats) => info!("Transfer to {} complete: {}", peer, stats.summary()),
            Err(e) => error!("Transfer to {} failed ({:?}): {}", peer, e.kind(), e),
        }

        if args.once {
            break;
        }
    }

    Ok(())
}
