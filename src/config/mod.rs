//! Configuration management shared by the gateway and snapshot services
//! 网关与快照服务共享的配置管理
//!
//! Every service layers its configuration the same way:
//! 每个服务都以相同方式分层加载配置：
//! - Default values / 默认值
//! - Configuration file (TOML) / 配置文件（TOML）
//! - Prefixed environment variables / 带前缀的环境变量
//! - Well-known deployment variables / 部署约定的环境变量
//! - Command line arguments / 命令行参数

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Base configuration shared by all applications / 所有应用程序共享的基础配置
pub mod base;
pub use base::*;

/// Base configuration trait / 基础配置特征
///
/// Precedence order (highest to lowest):
/// 优先级顺序（从高到低）：
/// 1. Command line arguments / 命令行参数
/// 2. Well-known environment variables / 约定环境变量
/// 3. Prefixed environment variables / 带前缀的环境变量
/// 4. Configuration file / 配置文件
/// 5. Default values / 默认值
pub trait AppConfig:
    for<'de> Deserialize<'de> + Serialize + Clone + Default + std::fmt::Debug
{
    /// Prefix for nested environment overrides, e.g. `VSS_GATEWAY_`
    /// 嵌套环境变量覆盖的前缀
    const ENV_PREFIX: &'static str;

    /// Build the figment without CLI overrides / 构建不含CLI覆盖的figment
    fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .merge(Self::legacy_env())
    }

    /// Plain environment variables kept from earlier deployments
    /// 早期部署沿用的普通环境变量
    fn legacy_env() -> Figment {
        Figment::new()
    }

    /// Extract and validate / 提取并验证
    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    /// 验证配置
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Split a comma separated list, dropping blanks / 拆分逗号分隔列表并去除空项
pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Deployment variables shared by both services / 两个服务共用的部署环境变量
pub fn deployment_env() -> Figment {
    let mut figment = Figment::new();
    if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.trim().parse::<u16>().ok()) {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        figment = figment.merge(Serialized::default("http.addr", addr.to_string()));
    }
    if let Ok(raw) = std::env::var("CORS_ALLOWED_ORIGINS") {
        let origins = split_csv(&raw);
        if !origins.is_empty() {
            figment = figment.merge(Serialized::default("cors.allowed_origins", origins));
        }
    }
    if let Ok(project) = std::env::var("GOOGLE_CLOUD_PROJECT") {
        figment = figment.merge(Serialized::default("auth.project_id", project));
    }
    figment
}

/// Common logging configuration / 通用日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) / 日志级别
    pub level: String,
    /// Log format (json, compact, pretty) / 日志格式
    pub format: String,
    /// Enable file logging / 启用文件日志
    pub file_enabled: bool,
    /// Log file path / 日志文件路径
    pub file_path: Option<PathBuf>,
}

static FILE_LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_enabled: false,
            file_path: None,
        }
    }
}

/// Initialize tracing based on logging configuration
/// 基于日志配置初始化跟踪
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config.level.trim().is_empty() {
            EnvFilter::new("info")
        } else {
            EnvFilter::new(config.level.clone())
        }
    });

    let file_layer = match (config.file_enabled, config.file_path.as_ref()) {
        (true, Some(path)) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create log dir: {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = FILE_LOG_GUARD.set(guard);
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);
            // File output follows stdout for json, compact otherwise.
            // 文件输出：json格式沿用json，其余为compact
            Some(if config.format == "json" {
                layer.json().boxed()
            } else {
                layer.compact().boxed()
            })
        }
        _ => None,
    };

    let stdout_layer = match config.format.as_str() {
        "json" => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .boxed(),
        "compact" => fmt::layer()
            .compact()
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .boxed(),
        _ => fmt::layer()
            .pretty()
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("tracing subscriber already initialised")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_csv_drops_blanks() {
        assert_eq!(
            split_csv(" http://a.test, ,http://b.test ,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(split_csv("").is_empty());
    }

    #[test]
    fn test_default_logging_config() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.level, "info");
        assert!(!cfg.file_enabled);
    }
}
