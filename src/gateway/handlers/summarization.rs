//! Content summarization / 内容摘要

use axum::{extract::State, http::HeaderMap, response::Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{non_blank, typed_body};
use crate::gateway::proxy::ProxyCall;
use crate::gateway::state::GatewayState;
use crate::http::{ApiError, ApiResult};

const MISSING_FIELDS: &str = "Missing required fields (id, prompt, or model) in request body";

/// Summarize request; extra keys pass through to the backend untouched
/// 摘要请求；额外字段原样转发给后端
#[derive(Debug, Serialize, Deserialize)]
pub struct SummarizeRequest {
    pub id: Option<Value>,
    pub prompt: Option<String>,
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SummarizeRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let id_ok = match &self.id {
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        };
        if !id_ok || non_blank(self.prompt.as_deref()).is_none() || non_blank(self.model.as_deref()).is_none() {
            return Err(ApiError::validation(MISSING_FIELDS));
        }
        Ok(())
    }
}

/// POST /summarize-content
pub async fn summarize_content(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    let request: SummarizeRequest = typed_body(&body, MISSING_FIELDS)?;
    request.validate()?;
    let payload = serde_json::to_value(&request).map_err(|e| ApiError::internal(e.to_string()))?;
    state
        .forward(ProxyCall::post_json("/summarize", "summarize content", payload))
        .await
}
