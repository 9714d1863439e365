//! Gateway service configuration
//! 网关服务配置

use anyhow::Context;
use clap::Parser;
use figment::{providers::Serialized, Figment};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use super::store::FirestoreConfig;
use crate::auth::FirebaseConfig;
use crate::config::{deployment_env, AppConfig, CorsConfig, LogConfig, ServerConfig};
use crate::genai::GenAiConfig;

/// Gateway command line arguments / 网关命令行参数
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "vss-gateway",
    version = "0.1.0",
    about = "VSS Gateway - authenticated proxy for the VSS API\nVSS网关 - VSS API的认证代理"
)]
pub struct CliArgs {
    /// Configuration file path / 配置文件路径
    #[arg(short, long, value_name = "FILE", help = "Configuration file path / 配置文件路径")]
    pub config: Option<String>,

    /// HTTP listen address / HTTP监听地址
    #[arg(long, value_name = "ADDR", help = "HTTP listen address (e.g., 0.0.0.0:8080) / HTTP监听地址")]
    pub http_addr: Option<String>,

    /// Fallback VSS base URL / 备用VSS基础URL
    #[arg(long, value_name = "URL", help = "VSS base URL used when no system default server is stored / 无系统默认服务器时使用的VSS地址")]
    pub vss_base_url: Option<String>,

    /// GCP project id / GCP项目ID
    #[arg(long, value_name = "ID", help = "Project id for token audience and document store / 令牌受众与文档存储的项目ID")]
    pub project_id: Option<String>,

    /// Log level / 日志级别
    #[arg(long, value_name = "LEVEL", help = "Log level (trace, debug, info, warn, error) / 日志级别")]
    pub log_level: Option<String>,
}

/// Backend access settings / 后端访问配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VssConfig {
    /// Used when the document store has no usable default / 文档存储无可用默认值时使用
    pub fallback_base_url: Option<String>,
    pub timeout_secs: u64,
    /// Timeout for file ingestion / 文件上传超时
    pub upload_timeout_secs: u64,
    /// Lifetime of a resolved base URL / 解析结果缓存时长
    pub cache_ttl_secs: u64,
}

impl Default for VssConfig {
    fn default() -> Self {
        Self {
            fallback_base_url: None,
            timeout_secs: 10,
            upload_timeout_secs: 540,
            cache_ttl_secs: 300,
        }
    }
}

/// Gateway service configuration / 网关服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub http: ServerConfig,
    pub log: LogConfig,
    pub vss: VssConfig,
    /// Identity provider / 身份提供方
    pub auth: FirebaseConfig,
    pub firestore: FirestoreConfig,
    pub genai: GenAiConfig,
    pub cors: CorsConfig,
    /// Request body limit for uploads / 上传请求体大小上限
    pub max_upload_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http: ServerConfig::default(),
            log: LogConfig::default(),
            vss: VssConfig::default(),
            auth: FirebaseConfig::default(),
            firestore: FirestoreConfig::default(),
            genai: GenAiConfig::default(),
            cors: CorsConfig::default(),
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

impl AppConfig for GatewayConfig {
    const ENV_PREFIX: &'static str = "VSS_GATEWAY_";

    fn legacy_env() -> Figment {
        let mut figment = deployment_env();
        if let Ok(project) = std::env::var("GOOGLE_CLOUD_PROJECT") {
            figment = figment.merge(Serialized::default("firestore.project_id", project));
        }
        if let Ok(url) = std::env::var("VSS_API_BASE_URL") {
            figment = figment.merge(Serialized::default("vss.fallback_base_url", url));
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            figment = figment.merge(Serialized::default("genai.api_key", key));
        }
        if let Ok(host) = std::env::var("FIRESTORE_EMULATOR_HOST") {
            figment = figment.merge(Serialized::default("firestore.emulator_host", host));
        }
        figment
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.vss.timeout_secs == 0 || self.vss.upload_timeout_secs == 0 {
            anyhow::bail!("vss timeouts must be positive");
        }
        if self.auth.project_id.trim().is_empty() {
            anyhow::bail!("auth.project_id is required (or set GOOGLE_CLOUD_PROJECT)");
        }
        Ok(())
    }
}

impl GatewayConfig {
    /// Load configuration with CLI arguments override / 使用CLI参数覆盖加载配置
    pub fn load_with_cli(args: &CliArgs) -> anyhow::Result<Self> {
        let mut figment = Self::figment(args.config.as_deref().map(Path::new));

        if let Some(addr) = &args.http_addr {
            let addr: SocketAddr = addr.parse().context("invalid --http-addr")?;
            figment = figment.merge(Serialized::default("http.addr", addr.to_string()));
        }
        if let Some(url) = &args.vss_base_url {
            figment = figment.merge(Serialized::default("vss.fallback_base_url", url));
        }
        if let Some(project) = &args.project_id {
            figment = figment
                .merge(Serialized::default("auth.project_id", project))
                .merge(Serialized::default("firestore.project_id", project));
        }
        if let Some(level) = &args.log_level {
            figment = figment.merge(Serialized::default("log.level", level));
        }

        let mut config = Self::extract(figment)?;
        if config.firestore.project_id.is_empty() {
            config.firestore.project_id = config.auth.project_id.clone();
        }
        Ok(config)
    }
}
