//! Live stream handlers / 直播流处理器

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use bytes::Bytes;
use serde_json::Value;

use super::{json_object, require_id};
use crate::gateway::proxy::{ProxyCall, Relay};
use crate::gateway::state::GatewayState;
use crate::http::ApiResult;

/// POST /start-stream
pub async fn start_stream(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    let payload = json_object(&body)?;
    state
        .forward(ProxyCall::post_json("/streams", "start stream", Value::Object(payload)))
        .await
}

/// DELETE /stop-stream/{stream_id}
pub async fn stop_stream(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(stream_id): Path<String>,
) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    let id = require_id(Some(&stream_id), "Stream ID is required")?;
    state
        .forward(
            ProxyCall::delete("/streams", format!("stop stream {id}"))
                .segment(id)
                .relay(Relay::EnvelopeOr("Stream stopped successfully")),
        )
        .await
}

/// GET /list-streams
pub async fn list_streams(State(state): State<GatewayState>, headers: HeaderMap) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    state.forward(ProxyCall::get("/streams", "list streams")).await
}

/// GET /get-stream-details/{stream_id}
pub async fn get_stream_details(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(stream_id): Path<String>,
) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    let id = require_id(Some(&stream_id), "Stream ID is required")?;
    state
        .forward(ProxyCall::get("/streams", format!("get stream details for {id}")).segment(id))
        .await
}

/// GET /get-live-stream-by-id/{stream_id}
pub async fn get_live_stream_by_id(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(stream_id): Path<String>,
) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    let id = require_id(Some(&stream_id), "Live stream ID is required")?;
    state
        .forward(ProxyCall::get("/live-stream", format!("get live stream details for {id}")).segment(id))
        .await
}
