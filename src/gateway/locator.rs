//! Backend base URL resolution / 后端基础URL解析
//!
//! Resolution order:
//! 1. fresh cache entry
//! 2. system-default record from the document store (cached for the TTL)
//! 3. configured fallback URL (never cached)
//!
//! A store error or a total failure clears the cache.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::store::{ServerRecord, ServerStore, StoreError};
use crate::cache::TtlCache;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().trim_end_matches("://").to_ascii_lowercase().as_str() {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// `{protocol, hostAndPort}` / 后端端点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    pub protocol: Protocol,
    pub host_and_port: String,
}

impl BackendEndpoint {
    /// Complete endpoint from a store record, `None` if a field is unusable
    /// 从记录构造端点；字段不完整时返回None
    pub fn from_record(record: &ServerRecord) -> Option<Self> {
        let protocol = Protocol::parse(record.protocol.as_deref()?)?;
        let host = record.host_and_port.as_deref()?.trim().trim_end_matches('/');
        if host.is_empty() {
            return None;
        }
        Some(Self {
            protocol,
            host_and_port: host.to_string(),
        })
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol.as_str(), self.host_and_port)
    }
}

impl fmt::Display for BackendEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{reason}")]
    NoBackendConfigured { reason: String },
}

const NOT_CONFIGURED: &str = "System default VSS server IP/protocol not configured in the document store and no VSS_API_BASE_URL fallback configured.";

/// Prefix `http://` when no http(s) scheme is present; blank means absent
/// 无http(s)协议时补`http://`；空白视为未配置
pub fn normalize_fallback(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    // "host:port" parses with "host" as the scheme, so check the scheme itself.
    let has_scheme = Url::parse(trimmed).is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
    if has_scheme {
        Some(trimmed.to_string())
    } else {
        Some(format!("http://{trimmed}"))
    }
}

pub struct BackendLocator {
    store: Arc<dyn ServerStore>,
    fallback: Option<String>,
    cache: TtlCache<String>,
}

impl BackendLocator {
    pub fn new(store: Arc<dyn ServerStore>, fallback: Option<&str>, ttl: Duration) -> Self {
        Self {
            store,
            fallback: normalize_fallback(fallback),
            cache: TtlCache::new(ttl),
        }
    }

    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    pub fn is_cached(&self) -> bool {
        self.cache.get().is_some()
    }

    pub async fn resolve_base_url(&self) -> Result<String, ConfigError> {
        match self.cache.get_or_refresh(|| self.lookup_default()).await {
            Ok(Some(url)) => Ok(url),
            Ok(None) => self.use_fallback(None),
            Err(e) => {
                warn!(error = %e, "backend lookup failed");
                self.use_fallback(Some(e.to_string()))
            }
        }
    }

    /// Base URL of a complete system-default record / 完整系统默认记录的基础URL
    async fn lookup_default(&self) -> Result<Option<String>, StoreError> {
        let Some(record) = self.store.find_system_default().await? else {
            debug!("no system default backend record");
            return Ok(None);
        };
        match BackendEndpoint::from_record(&record) {
            Some(endpoint) => {
                let url = endpoint.base_url();
                info!(base_url = %url, "resolved system default backend");
                Ok(Some(url))
            }
            None => {
                warn!(?record, "system default backend record is incomplete");
                Ok(None)
            }
        }
    }

    fn use_fallback(&self, store_error: Option<String>) -> Result<String, ConfigError> {
        if let Some(url) = &self.fallback {
            debug!(base_url = %url, "using fallback backend url");
            return Ok(url.clone());
        }
        let cause = store_error.unwrap_or_else(|| NOT_CONFIGURED.to_string());
        Err(ConfigError::NoBackendConfigured {
            reason: format!("Could not retrieve system default VSS server URL: {cause}"),
        })
    }
}
