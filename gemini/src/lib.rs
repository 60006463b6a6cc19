//! Minimal Google Gemini API client.
//!
//! This crate provides a focused client for the `generateContent` endpoint:
//! - Plain-text and JSON-mode completions
//! - Per-request safety settings
//! - Base-URL override for proxied (geo-restricted) deployments

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://generativelanguage.googleapis.com";
const API_VERSION: &str = "v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Errors that can occur when using the Gemini client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {message}")]
    Network { message: String, timeout: bool },

    #[error("API error (status {status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Response blocked: {0}")]
    Blocked(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status of the failure, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Gemini API client.
#[derive(Clone)]
pub struct Gemini {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for Gemini {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gemini")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Gemini {
    /// Create a new Gemini client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Self::with_timeout(api_key, DEFAULT_TIMEOUT)
    }

    /// Create a client whose requests are bounded by `timeout`.
    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::NoApiKey);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Create a client from `GEMINI_API_KEY`, honouring `GEMINI_PROXY` as a base URL.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| Error::NoApiKey)?;
        let client = Self::new(api_key)?;
        match std::env::var("GEMINI_PROXY") {
            Ok(proxy) if !proxy.trim().is_empty() => Ok(client.with_base_url(proxy)),
            _ => Ok(client),
        }
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Route requests through a different host (e.g. a regional proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The model used when a request does not name one.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a generation request and return the full response.
    pub async fn generate(&self, request: &Request) -> Result<Response, Error> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let url = format!(
            "{}/{API_VERSION}/models/{model}:generateContent",
            self.base_url
        );
        let body = build_api_request(request);

        let response = self
            .client
            .post(url)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network {
                message: e.to_string(),
                timeout: e.is_timeout(),
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| Error::Network {
            message: e.to_string(),
            timeout: e.is_timeout(),
        })?;

        parse_response(status, &text)
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        Ok(headers)
    }
}

// ============================================================================
// Public types
// ============================================================================

/// A generation request.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub json_output: bool,
    pub safety: Vec<SafetySetting>,
}

impl Request {
    /// Create a new single-turn request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            prompt: prompt.into(),
            system: None,
            temperature: None,
            max_output_tokens: None,
            json_output: false,
            safety: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_tokens);
        self
    }

    /// Ask the model for `application/json` output.
    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }

    pub fn with_safety(mut self, safety: Vec<SafetySetting>) -> Self {
        self.safety = safety;
        self
    }
}

/// Harm categories understood by the safety filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmCategory {
    SexuallyExplicit,
    HateSpeech,
    Harassment,
    DangerousContent,
}

impl HarmCategory {
    pub fn all() -> [HarmCategory; 4] {
        [
            HarmCategory::SexuallyExplicit,
            HarmCategory::HateSpeech,
            HarmCategory::Harassment,
            HarmCategory::DangerousContent,
        ]
    }

    fn api_name(&self) -> &'static str {
        match self {
            HarmCategory::SexuallyExplicit => "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            HarmCategory::HateSpeech => "HARM_CATEGORY_HATE_SPEECH",
            HarmCategory::Harassment => "HARM_CATEGORY_HARASSMENT",
            HarmCategory::DangerousContent => "HARM_CATEGORY_DANGEROUS_CONTENT",
        }
    }
}

/// How aggressively a category is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockThreshold {
    Off,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

impl BlockThreshold {
    fn api_name(&self) -> &'static str {
        match self {
            BlockThreshold::Off => "OFF",
            BlockThreshold::BlockOnlyHigh => "BLOCK_ONLY_HIGH",
            BlockThreshold::BlockMediumAndAbove => "BLOCK_MEDIUM_AND_ABOVE",
            BlockThreshold::BlockLowAndAbove => "BLOCK_LOW_AND_ABOVE",
        }
    }
}

/// A single safety-filter setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: BlockThreshold,
}

impl SafetySetting {
    /// The same threshold applied to every category.
    pub fn uniform(threshold: BlockThreshold) -> Vec<SafetySetting> {
        HarmCategory::all()
            .into_iter()
            .map(|category| SafetySetting {
                category,
                threshold,
            })
            .collect()
    }
}

/// A completion response from Gemini.
#[derive(Debug, Clone)]
pub struct Response {
    pub text: String,
    pub finish_reason: Option<String>,
    pub model_version: Option<String>,
    pub usage: Usage,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub output_tokens: u32,
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    generation_config: ApiGenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<ApiSafetySetting>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ApiSafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(default)]
    usage_metadata: Option<ApiUsage>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<ApiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    #[serde(default)]
    content: Option<ApiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

fn build_api_request(request: &Request) -> ApiRequest {
    ApiRequest {
        contents: vec![ApiContent {
            role: Some("user".to_string()),
            parts: vec![ApiPart {
                text: Some(request.prompt.clone()),
            }],
        }],
        system_instruction: request.system.as_ref().map(|system| ApiContent {
            role: None,
            parts: vec![ApiPart {
                text: Some(system.clone()),
            }],
        }),
        generation_config: ApiGenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
            response_mime_type: request.json_output.then_some("application/json"),
        },
        safety_settings: request
            .safety
            .iter()
            .map(|s| ApiSafetySetting {
                category: s.category.api_name(),
                threshold: s.threshold.api_name(),
            })
            .collect(),
    }
}

/// Turn a raw HTTP status and body into a response or a typed error.
///
/// The API sometimes reports errors inside a 200 body, so the error
/// envelope is checked before the status.
fn parse_response(status: u16, body: &str) -> Result<Response, Error> {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        let err = envelope.error;
        return Err(Error::Api {
            status: if err.code != 0 { err.code } else { status },
            code: err.status,
            message: err.message,
        });
    }

    if !(200..300).contains(&status) {
        return Err(Error::Api {
            status,
            code: String::new(),
            message: body.chars().take(500).collect(),
        });
    }

    let api_response: ApiResponse =
        serde_json::from_str(body).map_err(|e| Error::Parse(e.to_string()))?;

    if let Some(reason) = api_response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.clone())
    {
        return Err(Error::Blocked(reason));
    }

    let candidate = api_response.candidates.into_iter().next().ok_or_else(|| {
        Error::Parse(format!(
            "No candidates in response: {}",
            body.chars().take(200).collect::<String>()
        ))
    })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return match candidate.finish_reason {
            Some(reason) if reason != "STOP" => Err(Error::Blocked(reason)),
            _ => Err(Error::Parse("No text in response".to_string())),
        };
    }

    let usage = api_response
        .usage_metadata
        .map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    Ok(Response {
        text,
        finish_reason: candidate.finish_reason,
        model_version: api_response.model_version,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Gemini::new("test-key").unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.base_url, API_BASE);
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(Gemini::new("  "), Err(Error::NoApiKey)));
    }

    #[test]
    fn test_client_with_model_and_proxy() {
        let client = Gemini::new("test-key")
            .unwrap()
            .with_model("gemini-2.5-pro")
            .with_base_url("https://proxy.example.com/");
        assert_eq!(client.model(), "gemini-2.5-pro");
        assert_eq!(client.base_url, "https://proxy.example.com");
    }

    #[test]
    fn test_request_body_shape() {
        let request = Request::new("Hello")
            .with_system("You are a game master")
            .with_temperature(0.8)
            .with_max_output_tokens(4096)
            .json()
            .with_safety(SafetySetting::uniform(BlockThreshold::Off));

        let body = serde_json::to_value(build_api_request(&request)).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are a game master");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(body["safetySettings"][0]["threshold"], "OFF");
    }

    #[test]
    fn test_plain_request_omits_optional_fields() {
        let body = serde_json::to_value(build_api_request(&Request::new("Hi"))).unwrap();
        assert!(body.get("systemInstruction").is_none());
        assert!(body.get("safetySettings").is_none());
        assert!(body["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_parse_success() {
        let body = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": "1}"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 5},
            "modelVersion": "gemini-2.0-flash"
        }"#;
        let response = parse_response(200, body).unwrap();
        assert_eq!(response.text, "{\"a\":1}");
        assert_eq!(response.usage.prompt_tokens, 12);
        assert_eq!(response.usage.output_tokens, 5);
    }

    #[test]
    fn test_parse_error_envelope() {
        let body = r#"{"error": {"code": 429, "status": "RESOURCE_EXHAUSTED", "message": "Quota exceeded"}}"#;
        let err = parse_response(429, body).unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().contains("RESOURCE_EXHAUSTED"));
    }

    #[test]
    fn test_parse_non_json_error() {
        let err = parse_response(503, "Service Unavailable").unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        assert!(matches!(parse_response(200, body), Err(Error::Blocked(r)) if r == "SAFETY"));
    }

    #[test]
    fn test_parse_missing_candidates() {
        assert!(matches!(parse_response(200, "{}"), Err(Error::Parse(_))));
    }
}
