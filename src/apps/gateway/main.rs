//! VSS gateway main entry point
//! VSS网关主入口点

use clap::Parser;
use vss_gateway::config::init_tracing;
use vss_gateway::gateway::{CliArgs, GatewayConfig, GatewayState, HttpGateway};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments / 解析命令行参数
    let args = CliArgs::parse();
    let log_args = format!("{:?}", args);

    // Load configuration with CLI override / 加载配置并应用命令行覆盖
    let config = GatewayConfig::load_with_cli(&args)?;

    // Initialize logging with configuration / 使用配置初始化日志
    init_tracing(&config.log.to_logging_config())?;

    tracing::info!("Starting VSS gateway with args: {}", log_args);
    tracing::info!("VSS gateway starting with:");
    tracing::info!("  - HTTP gateway on: {}", config.http.addr);
    tracing::info!("  - Identity project: {}", config.auth.project_id);
    tracing::info!("  - Server collection: {}", config.firestore.collection);
    tracing::info!("  - Backend cache TTL: {}s", config.vss.cache_ttl_secs);

    let state = GatewayState::from_config(&config)?;
    let http_gateway = HttpGateway::new(config.http.addr, state);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_gateway
            .start_with_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            tracing::error!("HTTP gateway error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("VSS gateway shutting down");
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
