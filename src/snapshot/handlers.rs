//! Snapshot HTTP handlers / 快照HTTP处理器

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};
use url::Url;

use super::capture::redact_uri;
use super::server::SnapshotState;
use super::storage::object_path;
use crate::http::{success_fields, ApiError, ApiResult};

/// Characters allowed in the uid part of an object name / 对象名中uid允许的字符
fn sanitize_uid(uid: &str) -> String {
    uid.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// `<prefix>/snap_<uid>_<YYYYmmddHHMMSSffffff>.jpg`
pub fn snapshot_object_name(prefix: &str, uid: &str) -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S%6f");
    let name = format!("snap_{}_{stamp}.jpg", sanitize_uid(uid));
    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

/// Top-level string field of a JSON object body / JSON对象请求体中的字符串字段
fn string_field(body: &Bytes, field: &str, missing: &str) -> ApiResult<String> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| ApiError::validation("Invalid JSON payload"))?;
    let object = value
        .as_object()
        .ok_or_else(|| ApiError::validation("Invalid JSON payload"))?;
    object
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::validation(missing))
}

/// Schemes a camera stream may use / 视频流允许使用的协议
const STREAM_SCHEMES: [&str; 4] = ["rtsp", "rtsps", "http", "https"];

/// Network stream URL with a host; anything else (local files, ffmpeg
/// pseudo-protocols) is refused before it reaches the capture backend.
/// 仅接受带主机名的网络流地址；本地文件和ffmpeg伪协议在采集前即被拒绝。
fn stream_url(raw: &str) -> ApiResult<String> {
    let url = Url::parse(raw).map_err(|_| ApiError::validation("Invalid RTSP URL"))?;
    let has_host = url.host_str().is_some_and(|h| !h.is_empty());
    if !STREAM_SCHEMES.contains(&url.scheme()) || !has_host {
        warn!(scheme = %url.scheme(), "rejected stream URL");
        return Err(ApiError::validation("Invalid RTSP URL"));
    }
    Ok(raw.to_string())
}

/// POST /take-snapshot
pub async fn take_snapshot(
    State(state): State<SnapshotState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let principal = state.authenticate(&headers).await?;
    let rtsp_url = stream_url(&string_field(&body, "rtsp_url", "No RTSP URL provided")?)?;
    info!(uid = %principal.uid, uri = %redact_uri(&rtsp_url), "snapshot requested");

    let image = state
        .capturer
        .capture(&rtsp_url)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let resolution = image.resolution();

    let name = snapshot_object_name(&state.prefix, &principal.uid);
    state.store.put_jpeg(&name, image.jpeg).await.map_err(|e| {
        error!(object = %name, error = %e, "snapshot upload failed");
        ApiError::internal(format!("An unexpected error occurred: {e}"))
    })?;
    info!(bucket = %state.store.bucket(), object = %name, %resolution, "snapshot stored");

    let mut fields = vec![
        ("gcsObjectName", Value::from(name.clone())),
        ("resolution", Value::from(resolution)),
    ];
    if state.include_signed_url {
        let url = state
            .store
            .signed_url(&name, state.signed_url_ttl)
            .await
            .map_err(|e| ApiError::internal(format!("Error generating signed URL: {e}")))?;
        fields.push(("snapshotUrl", Value::from(url)));
    }
    Ok(success_fields(fields))
}

/// POST /retrieve-snapshot
pub async fn retrieve_snapshot(
    State(state): State<SnapshotState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    state.authenticate(&headers).await?;
    let name = string_field(&body, "gcsObjectName", "No gcsObjectName provided")?;

    let under_prefix = state.prefix.is_empty() || name.starts_with(&format!("{}/", state.prefix));
    if !under_prefix || object_path(&name).is_err() {
        return Err(ApiError::validation("Invalid gcsObjectName"));
    }

    let exists = state
        .store
        .exists(&name)
        .await
        .map_err(|e| ApiError::internal(format!("An unexpected error occurred: {e}")))?;
    if !exists {
        return Err(ApiError::NotFound("Snapshot object not found".to_string()));
    }

    let url = state
        .store
        .signed_url(&name, state.signed_url_ttl)
        .await
        .map_err(|e| ApiError::internal(format!("Error generating signed URL: {e}")))?;
    Ok(success_fields([("signedUrl", Value::from(url))]))
}

/// GET /healthz
pub async fn liveness() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
