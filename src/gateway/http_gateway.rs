//! HTTP server for the gateway / 网关HTTP服务器

use anyhow::Result;
use std::net::SocketAddr;
use tracing::{error, info};

use super::state::{create_gateway_router, GatewayState};

/// Gateway HTTP server / 网关HTTP服务器
pub struct HttpGateway {
    addr: SocketAddr,
    state: GatewayState,
}

impl HttpGateway {
    pub fn new(addr: SocketAddr, state: GatewayState) -> Self {
        Self { addr, state }
    }

    /// Get the HTTP address / 获取HTTP地址
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the HTTP gateway / 启动HTTP网关
    pub async fn start(self) -> Result<()> {
        self.start_with_shutdown(std::future::pending()).await
    }

    /// Start HTTP gateway with shutdown signal / 使用关闭信号启动HTTP网关
    pub async fn start_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let (listener, app) = self.prepare().await?;
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("VSS gateway HTTP server error: {}", e);
            return Err(e.into());
        }
        Ok(())
    }

    async fn prepare(self) -> Result<(tokio::net::TcpListener, axum::Router)> {
        info!("Starting VSS gateway on {}", self.addr);
        if let Some(fallback) = self.state.locator.fallback() {
            info!("Fallback VSS base URL: {}", fallback);
        }
        info!(
            "Suggestion endpoints enabled: {}",
            self.state.generator.is_some()
        );
        let app = create_gateway_router(self.state);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("VSS gateway listening on {}", listener.local_addr()?);
        Ok((listener, app))
    }
}
