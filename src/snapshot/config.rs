//! Snapshot service configuration
//! 快照服务配置

use anyhow::Context;
use clap::Parser;
use figment::{providers::Serialized, Figment};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use super::capture::CaptureOptions;
use super::ffmpeg::FfmpegConfig;
use crate::auth::FirebaseConfig;
use crate::config::{deployment_env, AppConfig, CorsConfig, LogConfig, ServerConfig};

/// Snapshot service command line arguments / 快照服务命令行参数
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "snapshot-service",
    version = "0.1.0",
    about = "Snapshot Service - capture stream frames into object storage\n快照服务 - 抓取视频帧并写入对象存储"
)]
pub struct SnapshotArgs {
    /// Configuration file path / 配置文件路径
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// HTTP listen address / HTTP监听地址
    #[arg(long, value_name = "ADDR")]
    pub http_addr: Option<String>,

    /// Destination bucket / 目标存储桶
    #[arg(long, value_name = "BUCKET")]
    pub bucket: Option<String>,

    /// GCP project id / GCP项目ID
    #[arg(long, value_name = "ID")]
    pub project_id: Option<String>,

    /// Log level / 日志级别
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    /// Object name prefix, without trailing slash / 对象名前缀
    pub prefix: String,
    pub signed_url_ttl_secs: u64,
    /// Also return a signed URL from take-snapshot / 拍摄后同时返回签名链接
    pub include_signed_url: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: "snapshots".to_string(),
            signed_url_ttl_secs: 15 * 60,
            include_signed_url: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub http: ServerConfig,
    pub log: LogConfig,
    pub auth: FirebaseConfig,
    pub cors: CorsConfig,
    pub storage: StorageConfig,
    pub capture: CaptureOptions,
    pub ffmpeg: FfmpegConfig,
}

impl AppConfig for SnapshotConfig {
    const ENV_PREFIX: &'static str = "SNAPSHOT_";

    fn legacy_env() -> Figment {
        let mut figment = deployment_env();
        if let Ok(bucket) = std::env::var("STORAGE_BUCKET") {
            figment = figment.merge(Serialized::default("storage.bucket", bucket));
        }
        figment
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.storage.bucket.trim().is_empty() {
            anyhow::bail!("storage.bucket is required (or set STORAGE_BUCKET)");
        }
        if self.auth.project_id.trim().is_empty() {
            anyhow::bail!("auth.project_id is required (or set GOOGLE_CLOUD_PROJECT)");
        }
        if self.storage.signed_url_ttl_secs == 0 {
            anyhow::bail!("storage.signed_url_ttl_secs must be positive");
        }
        Ok(())
    }
}

impl SnapshotConfig {
    /// Load configuration with CLI arguments override / 使用CLI参数覆盖加载配置
    pub fn load_with_cli(args: &SnapshotArgs) -> anyhow::Result<Self> {
        let mut figment = Self::figment(args.config.as_deref().map(Path::new));

        if let Some(addr) = &args.http_addr {
            let addr: SocketAddr = addr.parse().context("invalid --http-addr")?;
            figment = figment.merge(Serialized::default("http.addr", addr.to_string()));
        }
        if let Some(bucket) = &args.bucket {
            figment = figment.merge(Serialized::default("storage.bucket", bucket));
        }
        if let Some(project) = &args.project_id {
            figment = figment.merge(Serialized::default("auth.project_id", project));
        }
        if let Some(level) = &args.log_level {
            figment = figment.merge(Serialized::default("log.level", level));
        }
        Self::extract(figment)
    }

    pub fn object_prefix(&self) -> &str {
        self.storage.prefix.trim_matches('/')
    }
}
