//! Gemini `generateContent` client with schema-constrained JSON output.
//!
//! Failures are classified from the HTTP status and the provider's
//! structured error status, never from message text:
//! - 429 / RESOURCE_EXHAUSTED → rate limited (transient)
//! - 503, 529 / UNAVAILABLE → overloaded (transient)
//! - 408, 504 / DEADLINE_EXCEEDED, client timeouts → timeout (transient)
//! - everything else → fatal

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{FatalKind, InferenceClient, InferenceError, TransientKind};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Connection settings for the Gemini API
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,

    pub model: String,

    pub base_url: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    pub temperature: f32,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(300),
            temperature: 0.1,
        }
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Error envelope returned by the API
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Gemini API client
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { config, client })
    }

    /// Build API URL
    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn request_body(&self, prompt: &str, schema: &Value) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "responseMimeType": "application/json",
                "responseSchema": to_gemini_schema(schema),
            }
        })
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn extract(&self, prompt: &str, schema: &Value) -> Result<Value, InferenceError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&self.request_body(prompt, schema))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify_transport(&e))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        debug!(model = %self.config.model, bytes = body.len(), "Inference response received");
        parse_generation(&body)
    }
}

/// Map an HTTP failure to the error taxonomy
fn classify_status(status: StatusCode, body: &str) -> InferenceError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let provider_status = envelope.as_ref().map(|e| e.error.status.as_str()).unwrap_or("");
    let message = envelope
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status));

    let transient = match (status.as_u16(), provider_status) {
        (429, _) | (_, "RESOURCE_EXHAUSTED") => Some(TransientKind::RateLimited),
        (503, _) | (529, _) | (_, "UNAVAILABLE") => Some(TransientKind::Overloaded),
        (408, _) | (504, _) | (_, "DEADLINE_EXCEEDED") => Some(TransientKind::Timeout),
        _ => None,
    };

    if let Some(kind) = transient {
        return InferenceError::transient(kind, message);
    }

    let kind = match status.as_u16() {
        401 | 403 => FatalKind::Unauthorized,
        400 | 404 | 422 => FatalKind::InvalidRequest,
        _ => FatalKind::Provider,
    };
    InferenceError::fatal(kind, message)
}

fn classify_transport(err: &reqwest::Error) -> InferenceError {
    if err.is_timeout() {
        InferenceError::transient(TransientKind::Timeout, err.to_string())
    } else if err.is_decode() || err.is_body() {
        InferenceError::fatal(FatalKind::MalformedResponse, err.to_string())
    } else {
        InferenceError::fatal(FatalKind::Transport, err.to_string())
    }
}

/// Pull the JSON document out of the first candidate
fn parse_generation(body: &str) -> Result<Value, InferenceError> {
    let malformed = |msg: String| InferenceError::fatal(FatalKind::MalformedResponse, msg);

    let envelope: Value =
        serde_json::from_str(body).map_err(|e| malformed(format!("Response is not JSON: {}", e)))?;

    let candidate = envelope
        .get("candidates")
        .and_then(|c| c.get(0))
        .ok_or_else(|| {
            let reason = envelope
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates returned");
            InferenceError::fatal(FatalKind::Provider, format!("Generation blocked: {}", reason))
        })?;

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(malformed("Candidate contained no text".to_string()));
    }

    serde_json::from_str(&text).map_err(|e| malformed(format!("Candidate text is not JSON: {}", e)))
}

/// Gemini spells schema types in upper case (`OBJECT`, `ARRAY`, ...)
pub fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let converted = match (key.as_str(), value) {
                        ("type", Value::String(t)) => Value::String(t.to_ascii_uppercase()),
                        _ => to_gemini_schema(value),
                    };
                    (key.clone(), converted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(to_gemini_schema).collect()),
        other => other.clone(),
    }
}
