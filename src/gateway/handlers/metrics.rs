use axum::{extract::State, http::HeaderMap, response::Response};

use crate::gateway::proxy::{ProxyCall, Relay, PROMETHEUS_CONTENT_TYPE};
use crate::gateway::state::GatewayState;
use crate::http::ApiResult;

/// GET /get-metrics
///
/// Prometheus text from the backend. Requires authentication like every other
/// proxied operation.
pub async fn get_metrics(State(state): State<GatewayState>, headers: HeaderMap) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    state
        .forward(ProxyCall::get("/metrics", "get metrics").relay(Relay::Text(PROMETHEUS_CONTENT_TYPE)))
        .await
}
