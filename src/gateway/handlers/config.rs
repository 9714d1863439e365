use axum::{extract::State, http::HeaderMap, response::Response};
use bytes::Bytes;
use serde_json::Value;

use super::json_object;
use crate::gateway::proxy::ProxyCall;
use crate::gateway::state::GatewayState;
use crate::http::ApiResult;

/// POST /get-recommended-config
pub async fn get_recommended_config(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    let payload = json_object(&body)?;
    state
        .forward(ProxyCall::post_json(
            "/recommended_config",
            "get recommended config",
            Value::Object(payload),
        ))
        .await
}
