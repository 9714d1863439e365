//! OAuth access tokens from the instance metadata server
//! 从实例元数据服务器获取OAuth访问令牌

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::cache::TtlCache;

pub const DEFAULT_METADATA_HOST: &str = "http://metadata.google.internal";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const EXPIRY_MARGIN_SECS: u64 = 60;

#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Bearer token for Google APIs, `None` when calls go unauthenticated
    /// (emulators). / 访问Google API的令牌；模拟器场景返回None
    async fn access_token(&self) -> Result<Option<String>>;
}

/// Fixed token, or none at all / 固定令牌或不使用令牌
pub struct StaticTokenSource(pub Option<String>);

#[async_trait]
impl AccessTokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

pub struct MetadataTokenSource {
    host: String,
    client: reqwest::Client,
    cache: TtlCache<String>,
}

impl MetadataTokenSource {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            client,
            cache: TtlCache::new(Duration::from_secs(EXPIRY_MARGIN_SECS)),
        })
    }
}

impl MetadataTokenSource {
    async fn fetch_token(&self) -> Result<(String, Duration)> {
        let url = format!("{}{}", self.host, TOKEN_PATH);
        let resp = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("metadata server unreachable")?;
        if !resp.status().is_success() {
            return Err(anyhow!("metadata server returned {}", resp.status()));
        }
        let body: TokenResponse = resp.json().await.context("invalid token response")?;
        let ttl = body.expires_in.saturating_sub(EXPIRY_MARGIN_SECS);
        debug!(ttl_secs = ttl, "refreshed metadata access token");
        Ok((body.access_token, Duration::from_secs(ttl)))
    }
}

#[async_trait]
impl AccessTokenSource for MetadataTokenSource {
    async fn access_token(&self) -> Result<Option<String>> {
        self.cache
            .get_or_refresh_for(|| self.fetch_token())
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn spawn_metadata(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            TOKEN_PATH,
            get(move |headers: HeaderMap| {
                let hits = hits.clone();
                async move {
                    if headers.get("Metadata-Flavor").map(|v| v.as_bytes()) != Some(b"Google") {
                        return Err(StatusCode::FORBIDDEN);
                    }
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(Json(json!({
                        "access_token": "ya29.test",
                        "expires_in": 3599,
                        "token_type": "Bearer"
                    })))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let host = spawn_metadata(hits.clone()).await;
        let source = MetadataTokenSource::new(host, Duration::from_secs(5)).unwrap();

        assert_eq!(source.access_token().await.unwrap().as_deref(), Some("ya29.test"));
        assert_eq!(source.access_token().await.unwrap().as_deref(), Some("ya29.test"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_static_source() {
        assert!(StaticTokenSource(None).access_token().await.unwrap().is_none());
    }
}
