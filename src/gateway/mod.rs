//! Authenticated VSS API gateway / 带认证的VSS API网关
//!
//! Each operation verifies the caller's identity token, resolves the backend
//! base URL and forwards exactly one request to the VSS API.
//! 每个操作先验证身份令牌，再解析后端地址，并向VSS API转发一次请求。

pub mod config;
pub mod handlers;
pub mod http_gateway;
pub mod locator;
pub mod proxy;
pub mod routes;
pub mod state;
pub mod store;
pub mod upstream;


pub use config::{CliArgs, GatewayConfig};
pub use http_gateway::HttpGateway;
pub use locator::{BackendLocator, ConfigError};
pub use state::{create_gateway_router, GatewayState, SuggestionModels};
