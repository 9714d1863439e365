use axum::{extract::State, http::HeaderMap, response::Response};

use crate::gateway::proxy::ProxyCall;
use crate::gateway::state::GatewayState;
use crate::http::ApiResult;

/// GET /list-models
pub async fn list_models(State(state): State<GatewayState>, headers: HeaderMap) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    state.forward(ProxyCall::get("/models", "list models")).await
}
