//! Generative model access for configuration suggestions
//! 用于生成配置建议的生成式模型访问

pub mod gemini;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use gemini::GeminiClient;

/// Model settings / 模型配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenAiConfig {
    /// API key; suggestion endpoints fail with 500 while unset
    /// API密钥；未设置时建议接口返回500
    pub api_key: Option<String>,
    pub endpoint: String,
    pub vision_model: String,
    pub text_model: String,
    pub timeout_secs: u64,
}

impl Default for GenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            vision_model: "gemini-1.5-flash".to_string(),
            text_model: "gemini-1.5-flash".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub image: Option<InlineImage>,
}

#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("Gemini API key not configured.")]
    NotConfigured,
    #[error("{0}")]
    Request(String),
    #[error("model returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected model response: {0}")]
    Decode(String),
}

/// Text generation capability / 文本生成能力
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenAiError>;
}
