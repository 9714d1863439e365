//! JSON response envelope shared by every handler
//! 所有处理器共用的JSON响应信封
//!
//! Success: `{"status": "success", "data": ...}`
//! Failure: `{"status": "error", "message": ...}`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::AuthError;
use crate::gateway::locator::ConfigError;

/// Handler failure with its HTTP mapping / 带HTTP映射的处理器错误
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Validation(String),

    #[error("VSS API configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Error calling VSS API to {action}: {detail}")]
    Upstream { action: String, detail: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error("Method Not Allowed")]
    MethodNotAllowed,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn upstream(action: &str, detail: impl std::fmt::Display) -> Self {
        ApiError::Upstream {
            action: action.to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        if status.is_server_error() {
            error!(status = status.as_u16(), %message, "request failed");
        } else {
            warn!(status = status.as_u16(), %message, "request rejected");
        }
        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}

/// `{"status":"success","data":...}` / 成功信封
pub fn success<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "status": "success", "data": data }))
}

/// Success envelope with flat fields instead of `data`
/// 将字段平铺在顶层的成功信封
pub fn success_fields<I, K>(fields: I) -> Json<Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    let mut body = Map::new();
    body.insert("status".to_string(), Value::from("success"));
    for (k, v) in fields {
        body.insert(k.into(), v);
    }
    Json(Value::Object(body))
}
