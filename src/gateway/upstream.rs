//! Outbound calls to the VSS backend / 对VSS后端的出站调用

use bytes::Bytes;
use reqwest::{multipart, Method};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Largest downstream error body echoed into a message / 错误消息中回显的最大响应体长度
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Transport(String),
    #[error("{status} for url: {url}{}", body_suffix(.body))]
    Status {
        status: reqwest::StatusCode,
        url: String,
        body: String,
    },
    #[error("invalid multipart payload: {0}")]
    Payload(String),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" ({body})")
    }
}

/// File part plus form fields forwarded on ingest / 上传时转发的文件与表单字段
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
    pub fields: Vec<(String, String)>,
}

impl MultipartUpload {
    fn into_form(self) -> Result<multipart::Form, UpstreamError> {
        let mut part = multipart::Part::bytes(self.bytes.to_vec()).file_name(self.file_name);
        if let Some(ct) = self.content_type {
            part = part
                .mime_str(&ct)
                .map_err(|e| UpstreamError::Payload(e.to_string()))?;
        }
        let mut form = multipart::Form::new().part("file", part);
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        Ok(form)
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Empty,
    Json(Value),
    Multipart(MultipartUpload),
}

#[derive(Clone)]
pub struct VssClient {
    client: reqwest::Client,
    timeout: Duration,
    upload_timeout: Duration,
}

impl VssClient {
    pub fn new(timeout: Duration, upload_timeout: Duration) -> anyhow::Result<Self> {
        // Per-request timeouts; uploads get the longer one.
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            timeout,
            upload_timeout,
        })
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        payload: Payload,
    ) -> Result<(reqwest::RequestBuilder, Duration), UpstreamError> {
        debug!(%method, %url, "calling backend");
        let req = self.client.request(method, url);
        Ok(match payload {
            Payload::Empty => (req, self.timeout),
            Payload::Json(body) => (req.json(&body), self.timeout),
            Payload::Multipart(upload) => (req.multipart(upload.into_form()?), self.upload_timeout),
        })
    }

    /// One call, no retries. Non-2xx is an error. The timeout covers the
    /// whole exchange including the response body.
    /// 单次调用，不重试；非2xx视为错误；超时覆盖整个交换过程（含响应体）
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        payload: Payload,
    ) -> Result<reqwest::Response, UpstreamError> {
        let (req, timeout) = self.request(method, url, payload)?;
        dispatch(req.timeout(timeout)).await
    }

    /// As [`send`](Self::send), but only the wait for the response head is
    /// bounded so a long body can be streamed to the caller.
    /// 仅限制等待响应头的时间，响应体可以任意时长地流式传输
    pub async fn send_streaming(
        &self,
        method: Method,
        url: &str,
        payload: Payload,
    ) -> Result<reqwest::Response, UpstreamError> {
        let (req, timeout) = self.request(method, url, payload)?;
        tokio::time::timeout(timeout, dispatch(req))
            .await
            .map_err(|_| UpstreamError::Transport(format!("no response within {timeout:?}")))?
    }
}

async fn dispatch(req: reqwest::RequestBuilder) -> Result<reqwest::Response, UpstreamError> {
    let resp = req
        .send()
        .await
        .map_err(|e| UpstreamError::Transport(e.to_string()))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(UpstreamError::Status { status, url, body })
}
