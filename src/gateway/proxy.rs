//! Authenticated proxy contract / 认证代理流程
//!
//! A handler verifies the caller, validates its input and then describes the
//! downstream call as a [`ProxyCall`]. [`GatewayState::forward`] resolves the
//! backend, performs exactly one request and translates the answer.

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::state::GatewayState;
use super::upstream::{MultipartUpload, Payload};
use crate::http::{success, ApiError, ApiResult};

pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// How a successful downstream answer is returned / 成功响应的转换方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relay {
    /// JSON body wrapped in the success envelope / JSON包装为成功信封
    Envelope,
    /// As `Envelope`, but an empty or non-JSON body becomes `{message}`
    /// 同上，空或非JSON响应体替换为`{message}`
    EnvelopeOr(&'static str),
    /// Status, headers and bytes streamed through unchanged / 原样透传
    Raw,
    /// Body as text with a fixed content type / 以固定内容类型返回文本
    Text(&'static str),
}

#[derive(Debug, Clone)]
pub struct ProxyCall {
    pub method: Method,
    /// Decoded path segments appended to the backend base URL / 追加到后端基础URL的路径段
    pub segments: Vec<String>,
    pub payload: Payload,
    /// Used in "Error calling VSS API to <action>" / 用于错误消息
    pub action: String,
    pub relay: Relay,
}

impl ProxyCall {
    fn new(method: Method, path: &str, action: impl Into<String>) -> Self {
        Self {
            method,
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            payload: Payload::Empty,
            action: action.into(),
            relay: Relay::Envelope,
        }
    }

    pub fn get(path: &str, action: impl Into<String>) -> Self {
        Self::new(Method::GET, path, action)
    }

    pub fn delete(path: &str, action: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, action)
    }

    pub fn post_json(path: &str, action: impl Into<String>, body: Value) -> Self {
        Self {
            payload: Payload::Json(body),
            ..Self::new(Method::POST, path, action)
        }
    }

    pub fn post_multipart(
        path: &str,
        action: impl Into<String>,
        upload: MultipartUpload,
    ) -> Self {
        Self {
            payload: Payload::Multipart(upload),
            ..Self::new(Method::POST, path, action)
        }
    }

    /// Append one segment taken verbatim from caller input / 追加一个来自调用方输入的路径段
    pub fn segment(mut self, raw: impl Into<String>) -> Self {
        self.segments.push(raw.into());
        self
    }

    pub fn relay(mut self, relay: Relay) -> Self {
        self.relay = relay;
        self
    }
}

/// Backend base URL plus percent-encoded path segments / 后端基础URL加编码后的路径段
pub fn downstream_url(base: &str, segments: &[String]) -> Result<Url, String> {
    let mut url = Url::parse(base).map_err(|e| format!("invalid backend URL {base}: {e}"))?;
    url.path_segments_mut()
        .map_err(|_| format!("backend URL {base} cannot carry a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}

impl GatewayState {
    pub async fn forward(&self, call: ProxyCall) -> ApiResult<Response> {
        let base_url = self.locator.resolve_base_url().await?;
        let action = call.action;
        let url = downstream_url(&base_url, &call.segments)
            .map_err(|e| ApiError::upstream(&action, e))?;

        // A raw relay streams its body after this returns, so only the wait
        // for the response head is bounded.
        let sent = match call.relay {
            Relay::Raw => self.vss.send_streaming(call.method, url.as_str(), call.payload).await,
            _ => self.vss.send(call.method, url.as_str(), call.payload).await,
        };
        let resp = sent.map_err(|e| ApiError::upstream(&action, e))?;
        let status = resp.status();
        debug!(%url, status = status.as_u16(), "backend answered");

        match call.relay {
            Relay::Envelope => {
                let data: Value = resp
                    .json()
                    .await
                    .map_err(|e| ApiError::upstream(&action, format!("invalid JSON response: {e}")))?;
                Ok(success(data).into_response())
            }
            Relay::EnvelopeOr(default_message) => {
                let bytes = resp.bytes().await.map_err(|e| ApiError::upstream(&action, e))?;
                let data = serde_json::from_slice::<Value>(&bytes)
                    .unwrap_or_else(|_| json!({ "message": default_message }));
                Ok(success(data).into_response())
            }
            Relay::Text(content_type) => {
                let text = resp.text().await.map_err(|e| ApiError::upstream(&action, e))?;
                Ok((
                    status,
                    [(header::CONTENT_TYPE, HeaderValue::from_static(content_type))],
                    text,
                )
                    .into_response())
            }
            Relay::Raw => {
                let mut builder = Response::builder().status(status);
                for (name, value) in resp.headers() {
                    if !is_hop_by_hop(name) {
                        builder = builder.header(name, value);
                    }
                }
                builder
                    .body(Body::from_stream(resp.bytes_stream()))
                    .map_err(|e| ApiError::internal(e.to_string()))
            }
        }
    }
}
