//! VSS gateway: authenticated VSS API proxy and RTSP snapshot service
//! VSS网关：带认证的VSS API代理与RTSP快照服务

// Shared modules / 共享模块
pub mod auth;
pub mod cache;
pub mod config;
pub mod gcp;
pub mod genai;
pub mod http;

// Service-specific modules / 服务特定模块
pub mod gateway;
pub mod snapshot;

// Re-exports / 重新导出
pub use config::*;
