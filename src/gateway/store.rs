//! Backend server records in the document store / 文档存储中的后端服务器记录
//!
//! The only query the gateway needs is "which server is the system default".
//! Production talks to the Firestore REST API; tests substitute their own
//! [`ServerStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::gcp::AccessTokenSource;

/// A `servers` document as far as the gateway cares / 网关关心的`servers`文档字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerRecord {
    pub protocol: Option<String>,
    /// `ipAddressWithPort`, or `hostAndPort` in older documents
    /// 取自`ipAddressWithPort`，旧文档中为`hostAndPort`
    pub host_and_port: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store request failed: {0}")]
    Request(String),
    #[error("document store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected document store response: {0}")]
    Decode(String),
    #[error("document store credentials unavailable: {0}")]
    Credentials(String),
}

#[async_trait]
pub trait ServerStore: Send + Sync {
    /// Record flagged `isSystemDefault == true`, if any / 查询系统默认服务器记录
    async fn find_system_default(&self) -> Result<Option<ServerRecord>, StoreError>;
}

/// Firestore connection settings / Firestore连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub collection: String,
    /// REST endpoint / REST地址
    pub endpoint: String,
    /// `host:port` of a local emulator; requests then go unauthenticated
    /// 本地模拟器地址；设置后请求不带认证
    pub emulator_host: Option<String>,
    pub metadata_host: String,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database: "(default)".to_string(),
            collection: "servers".to_string(),
            endpoint: "https://firestore.googleapis.com".to_string(),
            emulator_host: None,
            metadata_host: crate::gcp::metadata::DEFAULT_METADATA_HOST.to_string(),
        }
    }
}

impl FirestoreConfig {
    fn base_url(&self) -> String {
        match self.emulator_host.as_deref() {
            Some(host) if !host.is_empty() => format!("http://{}", host.trim_end_matches('/')),
            _ => self.endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn uses_emulator(&self) -> bool {
        self.emulator_host.as_deref().is_some_and(|h| !h.is_empty())
    }
}

pub struct FirestoreServerStore {
    config: FirestoreConfig,
    client: reqwest::Client,
    tokens: Arc<dyn AccessTokenSource>,
}

impl FirestoreServerStore {
    pub fn new(
        config: FirestoreConfig,
        tokens: Arc<dyn AccessTokenSource>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            config,
            client,
            tokens,
        })
    }

    fn run_query_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/{}/documents:runQuery",
            self.config.base_url(),
            self.config.project_id,
            self.config.database
        )
    }

    fn query_body(&self) -> Value {
        // Limit 2 so a duplicated default can be noticed.
        json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.config.collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "isSystemDefault" },
                        "op": "EQUAL",
                        "value": { "booleanValue": true }
                    }
                },
                "limit": 2
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)?
        .get("stringValue")?
        .as_str()
        .map(str::to_string)
}

fn record_from_fields(fields: &Map<String, Value>) -> ServerRecord {
    ServerRecord {
        protocol: string_field(fields, "protocol"),
        host_and_port: string_field(fields, "ipAddressWithPort")
            .or_else(|| string_field(fields, "hostAndPort")),
    }
}

#[async_trait]
impl ServerStore for FirestoreServerStore {
    async fn find_system_default(&self) -> Result<Option<ServerRecord>, StoreError> {
        let mut req = self.client.post(self.run_query_url()).json(&self.query_body());
        if !self.config.uses_emulator() {
            let token = self
                .tokens
                .access_token()
                .await
                .map_err(|e| StoreError::Credentials(e.to_string()))?;
            if let Some(token) = token {
                req = req.bearer_auth(token);
            }
        }

        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let items: Vec<RunQueryItem> = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let mut docs = items.into_iter().filter_map(|i| i.document);
        let Some(first) = docs.next() else {
            debug!("no system default server record");
            return Ok(None);
        };
        if let Some(extra) = docs.next() {
            warn!(
                chosen = %first.name,
                ignored = %extra.name,
                "more than one system default server record"
            );
        }
        Ok(Some(record_from_fields(&first.fields)))
    }
}
