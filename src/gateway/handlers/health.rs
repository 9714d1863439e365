//! Health endpoints / 健康检查接口

use axum::{extract::State, http::HeaderMap, response::Response, Json};
use serde_json::{json, Value};

use crate::gateway::proxy::ProxyCall;
use crate::gateway::state::GatewayState;
use crate::http::ApiResult;

/// GET /check-health: backend health through the proxy / 经代理检查后端健康
pub async fn check_health(State(state): State<GatewayState>, headers: HeaderMap) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    state.forward(ProxyCall::get("/health", "check health")).await
}

/// GET /healthz: process liveness, no auth, no I/O / 进程存活检查
pub async fn liveness() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "vss-gateway",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
