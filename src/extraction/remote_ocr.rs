//! Remote learned OCR over HTTP.
//!
//! Pages are rasterised locally and uploaded as multipart form data to `{base}/ocr`. The service
//! answers with chat-completion style results whose content is either markdown or a JSON object
//! carrying `natural_text`; both are reduced to plain text.

use crate::extraction::engine::OcrEngine;
use crate::extraction::raster::Rasterizer;
use crate::extraction::types::{EngineError, ExtractionMethod};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static HEADING_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}\s+").expect("valid heading regex"));
static BULLET_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)[*+]\s+").expect("valid bullet regex"));
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\*\*|__)(.+?)(\*\*|__)").expect("valid emphasis regex"));

/// Connection settings for the remote OCR service.
#[derive(Debug, Clone)]
pub struct RemoteOcrSettings {
    /// Service base URL, e.g. `https://api.example.ai/v1`.
    pub base_url: String,
    /// Bearer token.
    pub api_key: Option<String>,
    /// Model identifier sent with every page.
    pub model: String,
    /// Request timeout.
    pub timeout: Duration,
}

/// OCR engine backed by a hosted model.
pub struct RemoteOcrEngine {
    http: Client,
    settings: RemoteOcrSettings,
    rasterizer: Rasterizer,
}

impl RemoteOcrEngine {
    /// Build the engine; fails only when the HTTP client cannot be constructed.
    pub fn new(settings: RemoteOcrSettings, rasterizer: Rasterizer) -> Result<Self, EngineError> {
        let http = Client::builder()
            .user_agent("hybrid-rag/ocr")
            .timeout(settings.timeout)
            .build()
            .map_err(|error| EngineError::Unavailable {
                engine: ExtractionMethod::RemoteOcr,
                reason: error.to_string(),
            })?;
        Ok(Self {
            http,
            settings,
            rasterizer,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/ocr", self.settings.base_url.trim_end_matches('/'))
    }

    async fn recognise(&self, png: Vec<u8>) -> Result<String, EngineError> {
        let params = json!({
            "model": self.settings.model,
            "task_type": "default",
            "max_tokens": 16000,
            "temperature": 0.1,
            "top_p": 0.6,
            "repetition_penalty": 1.2,
        });
        let part = Part::bytes(png)
            .file_name("page.png")
            .mime_str("image/png")
            .map_err(|error| request_error(error.to_string()))?;
        let form = Form::new().part("file", part).text("params", params.to_string());

        let mut request = self.http.post(self.endpoint()).multipart(form);
        if let Some(key) = self.settings.api_key.as_deref()
            && !key.is_empty()
        {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                EngineError::Timeout {
                    engine: ExtractionMethod::RemoteOcr,
                    seconds: self.settings.timeout.as_secs(),
                }
            } else {
                request_error(format!("failed to reach {}: {error}", self.settings.base_url))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(request_error(format!("service returned {status}: {body}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|error| request_error(format!("malformed response: {error}")))?;
        let content = response_content(&body)?;
        Ok(strip_markdown(&unwrap_natural_text(&content)))
    }
}

#[async_trait]
impl OcrEngine for RemoteOcrEngine {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::RemoteOcr
    }

    async fn ocr_page(&self, path: &Path, page_no: u32, _language: &str) -> Result<String, EngineError> {
        let png = self
            .rasterizer
            .render_png(ExtractionMethod::RemoteOcr, path, page_no)
            .await?;
        let text = self.recognise(png).await?;
        tracing::debug!(page = page_no, chars = text.chars().count(), "Remote OCR page done");
        Ok(text)
    }
}

fn request_error(message: String) -> EngineError {
    EngineError::Request {
        engine: ExtractionMethod::RemoteOcr,
        message,
    }
}

fn response_content(body: &Value) -> Result<String, EngineError> {
    if let Some(first) = body.get("results").and_then(|results| results.get(0)) {
        if first.get("success").and_then(Value::as_bool) == Some(false) {
            let message = first
                .get("error")
                .map(|error| error.to_string())
                .unwrap_or_else(|| "unsuccessful result".into());
            return Err(request_error(message));
        }
        if let Some(content) = first.get("message").and_then(choice_content) {
            return Ok(content);
        }
    }
    if let Some(content) = choice_content(body) {
        return Ok(content);
    }
    body.get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| request_error("response carried no text content".into()))
}

fn choice_content(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

fn unwrap_natural_text(content: &str) -> String {
    match serde_json::from_str::<Value>(content.trim()) {
        Ok(Value::Object(map)) => map
            .get("natural_text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default(),
        _ => content.to_string(),
    }
}

/// Reduce OCR markdown to plain text: drop code fences, heading markers, bullets and emphasis.
pub fn strip_markdown(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !(trimmed.starts_with("```") || trimmed.starts_with("~~~"))
        })
        .map(|line| {
            let line = HEADING_MARKER.replace(line, "");
            let line = BULLET_MARKER.replace(&line, "$1");
            EMPHASIS.replace_all(&line, "$2").into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
