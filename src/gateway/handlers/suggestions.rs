//! Generative configuration suggestions / 生成式配置建议
//!
//! These endpoints answer with flat success fields
//! (`{"status":"success","sceneDescription":...}`) and the usual error envelope.

use axum::{extract::State, http::HeaderMap, Json};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::typed_body;
use crate::gateway::state::GatewayState;
use crate::genai::prompts::{self, AlertParseError};
use crate::genai::{GenAiError, GenerationRequest, InlineImage, TextGenerator};
use crate::http::{success_fields, ApiError, ApiResult};

const NO_IMAGE: &str = "No image data provided";
const NO_SCENE_CONTEXT: &str = "Missing cameraSceneContext in request body";
const NO_ALERT_INPUT: &str =
    "Missing required data (cameraSceneContext or aiDetectionTarget) in request body";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescriptionRequest {
    pub image_data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionTargetsRequest {
    pub camera_scene_context: Option<String>,
    pub scene_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEventsRequest {
    pub camera_scene_context: Option<String>,
    pub ai_detection_target: Option<String>,
}

impl GatewayState {
    fn generator(&self) -> ApiResult<Arc<dyn TextGenerator>> {
        self.generator
            .clone()
            .ok_or_else(|| ApiError::internal(GenAiError::NotConfigured.to_string()))
    }
}

/// Split an optional `data:<mime>;base64,` prefix and decode
/// 拆分可选的data URI前缀并解码
fn decode_image(raw: &str) -> Result<InlineImage, String> {
    let raw = raw.trim();
    let (mime_type, payload) = match raw.strip_prefix("data:").and_then(|r| r.split_once(',')) {
        Some((meta, data)) => {
            let mime = meta.trim_end_matches(";base64");
            let mime = if mime.is_empty() { "image/jpeg" } else { mime };
            (mime.to_string(), data)
        }
        None => ("image/jpeg".to_string(), raw),
    };
    let data = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| e.to_string())?;
    Ok(InlineImage { mime_type, data })
}

/// POST /suggest-scene-description
pub async fn suggest_scene_description(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    state.authenticate(&headers).await?;
    let request: SceneDescriptionRequest = typed_body(&body, NO_IMAGE)?;
    let raw = request
        .image_data
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::validation(NO_IMAGE))?;
    let image = decode_image(&raw)
        .map_err(|e| ApiError::validation(format!("Failed to decode image data: {e}")))?;

    let generator = state.generator()?;
    let text = generator
        .generate(GenerationRequest {
            model: state.models.vision.clone(),
            prompt: prompts::SCENE_DESCRIPTION_PROMPT.to_string(),
            image: Some(image),
        })
        .await
        .map_err(|e| ApiError::internal(format!("Error generating scene description: {e}")))?;

    let text = text.trim();
    let description = if text.is_empty() {
        prompts::SCENE_DESCRIPTION_FALLBACK
    } else {
        text
    };
    Ok(success_fields([("sceneDescription", json!(description))]))
}

/// POST /suggest-detection-targets
pub async fn suggest_detection_targets(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    state.authenticate(&headers).await?;
    let request: DetectionTargetsRequest = typed_body(&body, NO_SCENE_CONTEXT)?;
    let context = request
        .camera_scene_context
        .ok_or_else(|| ApiError::validation(NO_SCENE_CONTEXT))?;

    let generator = state.generator()?;
    let text = generator
        .generate(GenerationRequest {
            model: state.models.text.clone(),
            prompt: prompts::detection_targets(&context, request.scene_description.as_deref()),
            image: None,
        })
        .await
        .map_err(|e| ApiError::internal(format!("Error generating detection targets: {e}")))?;

    Ok(success_fields([(
        "suggestedTargets",
        json!(prompts::clean_targets(&text)),
    )]))
}

/// POST /suggest-alert-events
pub async fn suggest_alert_events(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    state.authenticate(&headers).await?;
    let request: AlertEventsRequest = typed_body(&body, NO_ALERT_INPUT)?;
    let (Some(context), Some(target)) = (request.camera_scene_context, request.ai_detection_target)
    else {
        return Err(ApiError::validation(NO_ALERT_INPUT));
    };

    let generator = state.generator()?;
    let text = generator
        .generate(GenerationRequest {
            model: state.models.text.clone(),
            prompt: prompts::alert_events(&context, &target),
            image: None,
        })
        .await
        .map_err(|e| ApiError::internal(format!("Error generating alert events: {e}")))?;

    let events = prompts::parse_alert_events(&text).map_err(|e: AlertParseError| {
        warn!(response = %text, "model returned unusable alert events");
        ApiError::internal(e.message())
    })?;
    info!(count = events.len(), "suggested alert events");
    Ok(success_fields([("suggestedEvents", json!(events))]))
}
