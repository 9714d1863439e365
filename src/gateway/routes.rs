//! HTTP route table for the gateway / 网关HTTP路由表

use axum::{
    routing::{delete, get, post},
    Router,
};

use super::handlers::{config, files, health, metrics, models, streams, suggestions, summarization};
use super::state::GatewayState;
use crate::http::ApiError;

/// Create all HTTP routes / 创建所有HTTP路由
pub fn create_routes(state: GatewayState) -> Router {
    Router::new()
        // Liveness / 存活检查
        .route("/healthz", get(health::liveness))
        // Files / 文件
        .route("/ingest-file", post(files::ingest_file))
        .route("/list-files", get(files::list_files))
        .route("/get-file-details", get(files::get_file_details))
        .route("/delete-file", delete(files::delete_file))
        .route("/get-file-content", get(files::get_file_content))
        // Streams / 流
        .route("/start-stream", post(streams::start_stream))
        .route("/stop-stream/{stream_id}", delete(streams::stop_stream))
        .route("/list-streams", get(streams::list_streams))
        .route("/get-stream-details/{stream_id}", get(streams::get_stream_details))
        .route(
            "/get-live-stream-by-id/{stream_id}",
            get(streams::get_live_stream_by_id),
        )
        // Models, summarization and backend status / 模型、摘要与后端状态
        .route("/list-models", get(models::list_models))
        .route("/summarize-content", post(summarization::summarize_content))
        .route("/get-metrics", get(metrics::get_metrics))
        .route("/get-recommended-config", post(config::get_recommended_config))
        .route("/check-health", get(health::check_health))
        // Suggestions / 生成式建议
        .route(
            "/suggest-scene-description",
            post(suggestions::suggest_scene_description),
        )
        .route(
            "/suggest-detection-targets",
            post(suggestions::suggest_detection_targets),
        )
        .route("/suggest-alert-events", post(suggestions::suggest_alert_events))
        .method_not_allowed_fallback(|| async { ApiError::MethodNotAllowed })
        .fallback(|| async { ApiError::NotFound("Not Found".to_string()) })
        .with_state(state)
}
