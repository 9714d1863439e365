//! Gemini `generateContent` REST client / Gemini REST客户端

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{GenAiConfig, GenAiError, GenerationRequest, TextGenerator};

pub struct GeminiClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// `None` when no API key is configured / 未配置API密钥时返回None
    pub fn from_config(config: &GenAiConfig) -> anyhow::Result<Option<Self>> {
        let Some(api_key) = config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
        else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Some(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        }))
    }

    fn url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, model)
    }

    fn build_body(request: &GenerationRequest) -> Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        if let Some(image) = &request.image {
            parts.push(json!({
                "inline_data": {
                    "mime_type": image.mime_type,
                    "data": general_purpose::STANDARD.encode(&image.data),
                }
            }));
        }
        json!({ "contents": [{ "role": "user", "parts": parts }] })
    }

    fn extract_text(body: &Value) -> Result<String, GenAiError> {
        let parts = body
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                let reason = body
                    .pointer("/promptFeedback/blockReason")
                    .and_then(Value::as_str)
                    .unwrap_or("no candidates");
                GenAiError::Decode(reason.to_string())
            })?;
        Ok(parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""))
    }

    fn extract_error_message(body: &Value) -> Option<String> {
        body.pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenAiError> {
        let url = self.url(&request.model);
        debug!(model = %request.model, with_image = request.image.is_some(), "calling gemini");
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_body(&request))
            .send()
            .await
            .map_err(|e| GenAiError::Request(e.to_string()))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| GenAiError::Decode(e.to_string()))?;
        if !status.is_success() {
            return Err(GenAiError::Status {
                status: status.as_u16(),
                message: Self::extract_error_message(&body).unwrap_or_else(|| body.to_string()),
            });
        }
        Self::extract_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genai::InlineImage;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };

    async fn spawn_gemini() -> String {
        let app = Router::new().route(
            "/v1beta/models/{call}",
            post(|Path(call): Path<String>, headers: HeaderMap, Json(body): Json<Value>| async move {
                if headers.get("x-goog-api-key").map(|v| v.as_bytes()) != Some(b"k") {
                    return (
                        StatusCode::FORBIDDEN,
                        Json(json!({"error": {"code": 403, "message": "API key not valid"}})),
                    );
                }
                let parts = body["contents"][0]["parts"].as_array().cloned().unwrap_or_default();
                let text = format!("{call}|parts={}", parts.len());
                (
                    StatusCode::OK,
                    Json(json!({
                        "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }]
                    })),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1beta")
    }

    fn config(endpoint: String, key: &str) -> GenAiConfig {
        GenAiConfig {
            api_key: Some(key.to_string()),
            endpoint,
            ..GenAiConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generate_with_image() {
        let endpoint = spawn_gemini().await;
        let client = GeminiClient::from_config(&config(endpoint, "k")).unwrap().unwrap();
        let out = client
            .generate(GenerationRequest {
                model: "gemini-1.5-flash".to_string(),
                prompt: "describe".to_string(),
                image: Some(InlineImage {
                    mime_type: "image/jpeg".to_string(),
                    data: vec![0xff, 0xd8],
                }),
            })
            .await
            .unwrap();
        assert_eq!(out, "gemini-1.5-flash:generateContent|parts=2");
    }

    #[tokio::test]
    async fn test_error_message_surfaces() {
        let endpoint = spawn_gemini().await;
        let client = GeminiClient::from_config(&config(endpoint, "wrong")).unwrap().unwrap();
        let err = client
            .generate(GenerationRequest {
                model: "m".to_string(),
                prompt: "p".to_string(),
                image: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GenAiError::Status { status: 403, .. }));
        assert!(err.to_string().contains("API key not valid"));
    }

    #[test]
    fn test_blank_key_means_unconfigured() {
        let cfg = GenAiConfig {
            api_key: Some("  ".to_string()),
            ..GenAiConfig::default()
        };
        assert!(GeminiClient::from_config(&cfg).unwrap().is_none());
    }

    #[test]
    fn test_blocked_prompt() {
        let err = GeminiClient::extract_text(&json!({"promptFeedback": {"blockReason": "SAFETY"}}))
            .unwrap_err();
        assert_eq!(err.to_string(), "unexpected model response: SAFETY");
    }
}
