//! HTTP handlers for the gateway / 网关HTTP处理器
//!
//! Every proxied handler runs the same sequence: authenticate, validate the
//! input, then hand a [`ProxyCall`](super::proxy::ProxyCall) to the state.

pub mod config;
pub mod files;
pub mod health;
pub mod metrics;
pub mod models;
pub mod streams;
pub mod suggestions;
pub mod summarization;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::http::{ApiError, ApiResult};

pub const NO_JSON_BODY: &str = "No JSON data provided in the request body";

/// Non-empty JSON object from a raw body / 从原始请求体解析非空JSON对象
pub(crate) fn json_object(body: &Bytes) -> ApiResult<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) if !map.is_empty() => Ok(map),
        _ => Err(ApiError::validation(NO_JSON_BODY)),
    }
}

/// Typed request body; `missing` is the message for any shape problem
/// 类型化请求体；任何结构问题都返回`missing`消息
pub(crate) fn typed_body<T: DeserializeOwned>(body: &Bytes, missing: &str) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|_| ApiError::validation(missing))
}

/// Trimmed, non-empty identifier that is safe as a single path segment
/// 去除空白、非空且可作为单个路径段的标识符
pub(crate) fn require_id(raw: Option<&str>, message: &str) -> ApiResult<String> {
    match raw.map(str::trim) {
        Some(id) if !id.is_empty() && id != "." && id != ".." => Ok(id.to_string()),
        _ => Err(ApiError::validation(message)),
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_object() {
        assert!(json_object(&Bytes::from_static(br#"{"a":1}"#)).is_ok());
        for raw in [&b""[..], b"{}", b"[1]", b"null", b"not json"] {
            let err = json_object(&Bytes::copy_from_slice(raw)).unwrap_err();
            assert_eq!(err.to_string(), NO_JSON_BODY);
        }
    }

    #[test]
    fn test_require_id() {
        assert_eq!(require_id(Some(" f-1 "), "x").unwrap(), "f-1");
        assert!(require_id(Some(""), "x").is_err());
        assert!(require_id(Some(".."), "x").is_err());
        assert!(require_id(None, "File ID is required").is_err());
    }
}
