//! File management handlers / 文件管理处理器

use axum::{
    extract::{multipart::MultipartRejection, rejection::QueryRejection, Multipart, Query, State},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use tracing::{debug, info};

use super::{non_blank, require_id};
use crate::gateway::proxy::{ProxyCall, Relay};
use crate::gateway::state::GatewayState;
use crate::gateway::upstream::MultipartUpload;
use crate::http::{ApiError, ApiResult};

const FILE_ID_REQUIRED: &str = "File ID is required";
const NO_FILE_PART: &str = "No file part in the request";
const MISSING_FORM: &str = "Missing form data: filename, purpose, or media_type";

#[derive(Debug, Deserialize)]
pub struct FileIdQuery {
    pub file_id: Option<String>,
}

fn file_id(query: Result<Query<FileIdQuery>, QueryRejection>) -> ApiResult<String> {
    let id = query.ok().and_then(|Query(q)| q.file_id);
    require_id(id.as_deref(), FILE_ID_REQUIRED)
}

#[derive(Default)]
struct IngestForm {
    file: Option<(Option<String>, bytes::Bytes)>,
    filename: Option<String>,
    purpose: Option<String>,
    media_type: Option<String>,
}

async fn read_ingest_form(mut multipart: Multipart) -> ApiResult<IngestForm> {
    let mut form = IngestForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("Invalid file part: {e}")))?;
                form.file = Some((content_type, data));
            }
            "filename" | "purpose" | "media_type" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("Invalid form field {name}: {e}")))?;
                let slot = match name.as_str() {
                    "filename" => &mut form.filename,
                    "purpose" => &mut form.purpose,
                    _ => &mut form.media_type,
                };
                *slot = Some(text);
            }
            other => debug!(field = %other, "ignoring unknown form field"),
        }
    }
    Ok(form)
}

/// POST /ingest-file
pub async fn ingest_file(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let principal = state.authenticate(&headers).await?;
    let multipart = multipart.map_err(|_| ApiError::validation(NO_FILE_PART))?;
    let form = read_ingest_form(multipart).await?;

    let (content_type, bytes) = form.file.ok_or_else(|| ApiError::validation(NO_FILE_PART))?;
    let (Some(filename), Some(purpose), Some(media_type)) = (
        non_blank(form.filename.as_deref()),
        non_blank(form.purpose.as_deref()),
        non_blank(form.media_type.as_deref()),
    ) else {
        return Err(ApiError::validation(MISSING_FORM));
    };

    info!(uid = %principal.uid, %filename, size = bytes.len(), "ingesting file");
    let upload = MultipartUpload {
        file_name: filename.to_string(),
        content_type,
        bytes,
        fields: vec![
            ("filename".to_string(), filename.to_string()),
            ("purpose".to_string(), purpose.to_string()),
            ("media_type".to_string(), media_type.to_string()),
        ],
    };
    state
        .forward(ProxyCall::post_multipart("/files", "ingest file", upload))
        .await
}

/// GET /list-files
pub async fn list_files(State(state): State<GatewayState>, headers: HeaderMap) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    state.forward(ProxyCall::get("/files", "list files")).await
}

/// GET /get-file-details?file_id=
pub async fn get_file_details(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    query: Result<Query<FileIdQuery>, QueryRejection>,
) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    let id = file_id(query)?;
    state
        .forward(ProxyCall::get("/files", format!("get file details for {id}")).segment(id))
        .await
}

/// DELETE /delete-file?file_id=
pub async fn delete_file(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    query: Result<Query<FileIdQuery>, QueryRejection>,
) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    let id = file_id(query)?;
    state
        .forward(
            ProxyCall::delete("/files", format!("delete file {id}"))
                .segment(id)
                .relay(Relay::EnvelopeOr("File deleted successfully")),
        )
        .await
}

/// GET /get-file-content?file_id=
///
/// Streams the downstream bytes and headers back unchanged.
/// 原样流式返回下游字节与响应头。
pub async fn get_file_content(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    query: Result<Query<FileIdQuery>, QueryRejection>,
) -> ApiResult<Response> {
    state.authenticate(&headers).await?;
    let id = file_id(query)?;
    state
        .forward(
            ProxyCall::get("/files", format!("get file content for {id}"))
                .segment(id)
                .segment("content")
                .relay(Relay::Raw),
        )
        .await
}
