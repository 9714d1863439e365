//! Snapshot service main entry point
//! 快照服务主入口点

use clap::Parser;
use vss_gateway::config::init_tracing;
use vss_gateway::snapshot::{SnapshotArgs, SnapshotConfig, SnapshotServer, SnapshotState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = SnapshotArgs::parse();
    let log_args = format!("{:?}", args);

    // A missing bucket is fatal here / 缺少存储桶时直接退出
    let config = SnapshotConfig::load_with_cli(&args)?;
    init_tracing(&config.log.to_logging_config())?;

    tracing::info!("Starting snapshot service with args: {}", log_args);
    tracing::info!("Snapshot service starting with:");
    tracing::info!("  - HTTP server on: {}", config.http.addr);
    tracing::info!("  - Bucket: {}", config.storage.bucket);
    tracing::info!("  - Object prefix: {}", config.object_prefix());
    tracing::info!("  - ffmpeg: {}", config.ffmpeg.ffmpeg_path);

    let state = SnapshotState::from_config(&config)?;
    let server = SnapshotServer::new(config.http.addr, state);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let http_handle = tokio::spawn(async move {
        if let Err(e) = server
            .start_with_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            tracing::error!("Snapshot HTTP server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Snapshot service shutting down");
    let _ = shutdown_tx.send(());

    let deadline = tokio::time::Instant::now()
        + std::time::Duration::from_secs(config.http.shutdown_timeout_secs);
    loop {
        if http_handle.is_finished() {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!("Shutdown timeout reached, aborting server");
            http_handle.abort();
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    Ok(())
}
