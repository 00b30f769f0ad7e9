//! Gemini `generateContent` client.
//!
//! One request per attempt: a single user turn holding the instruction text and the detection
//! PNG as inline base64 data. HTTP outcomes are mapped onto [`OracleError`] so the retry loop can
//! tell quota and transport trouble (retried) from bad requests (fatal).

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    foundation::error::{OracleError, RefitError, RefitResult},
    oracle::LayoutOracle,
};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Connection and sampling settings for [`GeminiOracle`].
#[derive(Clone)]
pub struct GeminiConfig {
    /// API key sent as `x-goog-api-key`.
    pub api_key: String,
    /// Model id, e.g. `gemini-2.5-pro`.
    pub model: String,
    /// API base URL without a trailing slash.
    pub endpoint: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on reply tokens.
    pub max_output_tokens: u32,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl GeminiConfig {
    /// Default settings with the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gemini-2.5-pro".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.1,
            max_output_tokens: 32_000,
        }
    }

    /// Default settings with the key taken from `GEMINI_API_KEY`.
    pub fn from_env() -> RefitResult<Self> {
        let key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RefitError::config(format!("{API_KEY_ENV} is not set")))?;
        Ok(Self::new(key))
    }

    /// Reject empty keys, empty model ids and out-of-range sampling values.
    pub fn validate(&self) -> RefitResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(RefitError::config("gemini api_key must be non-empty"));
        }
        if self.model.trim().is_empty() {
            return Err(RefitError::config("gemini model must be non-empty"));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(RefitError::config(format!(
                "gemini endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(RefitError::config("gemini temperature must be in [0, 2]"));
        }
        if self.max_output_tokens == 0 {
            return Err(RefitError::config("gemini max_output_tokens must be > 0"));
        }
        Ok(())
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    Inline {
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

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

/// [`LayoutOracle`] backed by the Gemini HTTP API.
#[derive(Clone, Debug)]
pub struct GeminiOracle {
    client: Client,
    config: GeminiConfig,
}

impl GeminiOracle {
    /// Validate `config` and build a client.
    pub fn new(config: GeminiConfig) -> RefitResult<Self> {
        config.validate()?;
        Ok(Self {
            client: Client::new(),
            config,
        })
    }

    /// Active settings.
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}

#[async_trait]
impl LayoutOracle for GeminiOracle {
    async fn send_layout(&self, prompt: &str, detection_png: &[u8]) -> Result<String, OracleError> {
        let request = build_request(prompt, detection_png, &self.config);

        let response = self
            .client
            .post(self.config.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify_transport(&e))?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }
        extract_text(&body)
    }
}

fn build_request<'a>(
    prompt: &'a str,
    detection_png: &[u8],
    config: &GeminiConfig,
) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![RequestContent {
            role: "user",
            parts: vec![
                RequestPart::Text { text: prompt },
                RequestPart::Inline {
                    inline_data: InlineData {
                        mime_type: "image/png",
                        data: base64::engine::general_purpose::STANDARD.encode(detection_png),
                    },
                },
            ],
        }],
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        },
    }
}

/// Map a non-success HTTP status and its body onto an [`OracleError`].
pub fn classify_status(status: u16, body: &str) -> OracleError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let detail = match &envelope {
        Some(env) if !env.error.message.is_empty() => {
            format!("HTTP {status} {}: {}", env.error.status, env.error.message)
        }
        _ => format!("HTTP {status}: {}", truncate(body, 512)),
    };
    let exhausted = envelope
        .as_ref()
        .is_some_and(|env| env.error.status == "RESOURCE_EXHAUSTED");

    match status {
        429 => OracleError::QuotaExceeded(detail),
        _ if exhausted => OracleError::QuotaExceeded(detail),
        408 | 500..=599 => OracleError::TransientNetwork(detail),
        _ => OracleError::Fatal(detail),
    }
}

/// Map a transport-level failure onto an [`OracleError`].
pub fn classify_transport(err: &reqwest::Error) -> OracleError {
    // Reply bodies are parsed by `extract_text`, so a decode error here is a broken stream.
    if err.is_builder() {
        OracleError::Fatal(format!("build request: {err}"))
    } else {
        OracleError::TransientNetwork(err.to_string())
    }
}

/// Concatenate the text parts of the first candidate of a success body.
pub fn extract_text(body: &str) -> Result<String, OracleError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| OracleError::Fatal(format!("malformed generateContent reply: {e}")))?;
    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| OracleError::Fatal("reply has no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(OracleError::Fatal(format!(
            "reply has no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
#[path = "../../tests/unit/oracle/gemini.rs"]
mod tests;
