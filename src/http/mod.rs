//! HTTP building blocks shared by both services / 两个服务共用的HTTP组件

pub mod cors;
pub mod envelope;

pub use cors::cors_layer;
pub use envelope::{success, success_fields, ApiError, ApiResult};
