//! Gateway state and router assembly / 网关状态与路由组装

use axum::{extract::DefaultBodyLimit, http::HeaderMap, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use super::config::GatewayConfig;
use super::locator::BackendLocator;
use super::routes::create_routes;
use super::store::{FirestoreServerStore, ServerStore};
use super::upstream::VssClient;
use crate::auth::{self, FirebaseVerifier, IdentityProvider, Principal};
use crate::gcp::{AccessTokenSource, MetadataTokenSource, StaticTokenSource};
use crate::genai::{GeminiClient, TextGenerator};
use crate::http::{cors_layer, ApiResult};

/// Model names used by the suggestion endpoints / 建议接口使用的模型名
#[derive(Debug, Clone)]
pub struct SuggestionModels {
    pub vision: String,
    pub text: String,
}

/// HTTP gateway state / HTTP网关状态
#[derive(Clone)]
pub struct GatewayState {
    pub identity: Arc<dyn IdentityProvider>,
    pub locator: Arc<BackendLocator>,
    pub vss: VssClient,
    /// `None` while no model API key is configured / 未配置模型密钥时为None
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub models: SuggestionModels,
    pub max_upload_bytes: usize,
    pub allowed_origins: Vec<String>,
}

impl GatewayState {
    /// Wire production dependencies from configuration / 根据配置装配生产依赖
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.vss.timeout_secs);

        let tokens: Arc<dyn AccessTokenSource> = if config.firestore.uses_emulator() {
            Arc::new(StaticTokenSource(None))
        } else {
            Arc::new(MetadataTokenSource::new(
                config.firestore.metadata_host.clone(),
                timeout,
            )?)
        };
        let store: Arc<dyn ServerStore> = Arc::new(FirestoreServerStore::new(
            config.firestore.clone(),
            tokens,
            timeout,
        )?);
        let locator = BackendLocator::new(
            store,
            config.vss.fallback_base_url.as_deref(),
            Duration::from_secs(config.vss.cache_ttl_secs),
        );

        let generator = GeminiClient::from_config(&config.genai)?
            .map(|c| Arc::new(c) as Arc<dyn TextGenerator>);

        Ok(Self {
            identity: Arc::new(FirebaseVerifier::new(config.auth.clone())?),
            locator: Arc::new(locator),
            vss: VssClient::new(
                timeout,
                Duration::from_secs(config.vss.upload_timeout_secs),
            )?,
            generator,
            models: SuggestionModels {
                vision: config.genai.vision_model.clone(),
                text: config.genai.text_model.clone(),
            },
            max_upload_bytes: config.max_upload_bytes,
            allowed_origins: config.cors.allowed_origins.clone(),
        })
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> ApiResult<Principal> {
        Ok(auth::verify(headers, self.identity.as_ref()).await?)
    }
}

/// Create HTTP gateway router / 创建HTTP网关路由器
pub fn create_gateway_router(state: GatewayState) -> Router {
    let cors = cors_layer(&state.allowed_origins);
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);
    create_routes(state)
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
