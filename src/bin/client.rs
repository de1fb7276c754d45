//! keysync 클라이언트 (수신자)
//!
//! 서버에 접속해 키 하나를 받아 `<storage-root>/key/<key>` 에 저장한다.
//!
//! 사용법:
//!   cargo run --release --bin keysync-client -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin keysync-client -- --server 127.0.0.1:8080 --storage-root ./storage

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use keysync::{Config, FramedStream, Framing, KeyStore, Receiver, Sha1Hasher};

/// 클라이언트 인자
#[derive(Debug, Parser)]
#[command(name = "keysync-client", about = "keysync 클라이언트 (수신자)")]
struct Args {
    /// 서버 주소
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,

    /// 저장소 루트
    #[arg(long, default_value = "./storage")]
    storage_root: PathBuf,

    /// 최대 프레임 크기 (바이트), 서버와 같아야 함
    #[arg(long, default_value_t = keysync::DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// 프레이밍 (raw | length-prefixed)
    #[arg(long, default_value_t = Framing::LengthPrefixed)]
    framing: Framing,
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
    let config = Config {
        max_frame_size: args.max_frame_size,
        framing: args.framing,
        ..Config::default()
    };
    config.validate()?;

    info!("keysync client starting...");
    info!("Server: {}", args.server);
    info!("Storage root: {:?}", args.storage_root);
    info!("Framing: {}, max frame size: {} bytes", config.framing, config.max_frame_size);

    let transport = FramedStream::connect(args.server, config.framing, config.max_frame_size).await?;
    info!("Connected to {}", args.server);

    let store = KeyStore::new(&args.storage_root);
    let mut receiver = Receiver::new(config.clone(), transport, store.clone(), Sha1Hasher)?;

    let progress = receiver.progress();
    let interval_ms = config.progress_interval_ms;
    let printer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!("{}", progress.snapshot().summary());
        }
    });

    let result = receiver.run().await;
    printer.abort();

    match result {
        Ok(stats) => {
            info!("Transfer complete!");
            info!("  {}", stats.summary());
            if let Some(key) = stats.key {
                info!("  Stored at {:?} ({} bytes)", store.path_for(key), stats.high_water_mark);
            }
            if stats.queries_ignored > 0 {
                info!("  Queries ignored: {}", stats.queries_ignored);
            }
            Ok(())
        }
        Err(e) => {
            error!("Transfer failed ({:?}): {}", e.kind(), e);
            Err(e.into())
        }
    }
}
