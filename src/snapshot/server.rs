//! Snapshot service state, routes and HTTP server / 快照服务状态、路由与HTTP服务器

use anyhow::Result;
use axum::{
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::capture::SnapshotCapturer;
use super::config::SnapshotConfig;
use super::ffmpeg::{FfmpegBackend, FfmpegEncoder};
use super::handlers;
use super::storage::{ObjectSnapshotStore, SnapshotStore};
use crate::auth::{self, FirebaseVerifier, IdentityProvider, Principal};
use crate::http::{cors_layer, ApiError, ApiResult};

#[derive(Clone)]
pub struct SnapshotState {
    pub identity: Arc<dyn IdentityProvider>,
    pub capturer: Arc<SnapshotCapturer>,
    pub store: Arc<dyn SnapshotStore>,
    /// Object name prefix without slashes / 不含斜杠的对象名前缀
    pub prefix: String,
    pub signed_url_ttl: Duration,
    pub include_signed_url: bool,
    pub allowed_origins: Vec<String>,
}

impl SnapshotState {
    /// Wire production dependencies from configuration / 根据配置装配生产依赖
    pub fn from_config(config: &SnapshotConfig) -> Result<Self> {
        let capturer = SnapshotCapturer::new(
            Arc::new(FfmpegBackend::new(config.ffmpeg.clone())),
            Arc::new(FfmpegEncoder::new(config.ffmpeg.clone())),
            config.capture.clone(),
        );
        Ok(Self {
            identity: Arc::new(FirebaseVerifier::new(config.auth.clone())?),
            capturer: Arc::new(capturer),
            store: Arc::new(ObjectSnapshotStore::gcs(&config.storage.bucket)?),
            prefix: config.object_prefix().to_string(),
            signed_url_ttl: Duration::from_secs(config.storage.signed_url_ttl_secs),
            include_signed_url: config.storage.include_signed_url,
            allowed_origins: config.cors.allowed_origins.clone(),
        })
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> ApiResult<Principal> {
        Ok(auth::verify(headers, self.identity.as_ref()).await?)
    }
}

/// Create the snapshot service router / 创建快照服务路由器
pub fn create_snapshot_router(state: SnapshotState) -> Router {
    let cors = cors_layer(&state.allowed_origins);
    Router::new()
        .route("/healthz", get(handlers::liveness))
        .route("/take-snapshot", post(handlers::take_snapshot))
        .route("/retrieve-snapshot", post(handlers::retrieve_snapshot))
        .method_not_allowed_fallback(|| async { ApiError::MethodNotAllowed })
        .fallback(|| async { ApiError::NotFound("Not Found".to_string()) })
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Snapshot HTTP server / 快照HTTP服务器
pub struct SnapshotServer {
    addr: SocketAddr,
    state: SnapshotState,
}

impl SnapshotServer {
    pub fn new(addr: SocketAddr, state: SnapshotState) -> Self {
        Self { addr, state }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start with shutdown signal / 使用关闭信号启动
    pub async fn start_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!("Starting snapshot service on {}", self.addr);
        info!("Snapshot bucket: {}", self.state.store.bucket());
        let app = create_snapshot_router(self.state);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("Snapshot service listening on {}", listener.local_addr()?);
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Snapshot HTTP server error: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}
