//! Generation client: retries, model fallback and structured output.
//!
//! The client owns a [`Transport`] (normally [`gemini::Gemini`]) and a
//! [`GenerationConfig`]. Transient provider failures are retried on the same
//! model with exponential backoff; once that budget is spent, or on any
//! other non-fatal failure, one attempt is made on the fallback model.
//! Credential and region failures are surfaced immediately.

use crate::ingest::{ingest, IngestError};
use crate::schema::{structured_prompt, Schema};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Characters of a provider message kept in a user-facing error.
const USER_EXCERPT_LEN: usize = 150;

/// Characters of a raw response logged at debug level.
const LOG_EXCERPT_LEN: usize = 500;

// ============================================================================
// Configuration
// ============================================================================

/// Which configured model a call should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    #[default]
    Default,
    /// Longer or more important generations, such as onboarding.
    Heavy,
    /// Cheap calls where latency matters more than quality.
    Light,
}

/// Content policy chosen by the host, mapped to provider safety settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentPolicy {
    #[default]
    Full,
    Moderate,
    Family,
}

impl ContentPolicy {
    /// Parse a policy tag. Unknown tags fall back to [`ContentPolicy::Full`].
    pub fn parse(tag: &str) -> ContentPolicy {
        match tag.trim().to_lowercase().as_str() {
            "moderate" => ContentPolicy::Moderate,
            "family" | "safe" => ContentPolicy::Family,
            _ => ContentPolicy::Full,
        }
    }
}

/// Caller-owned settings for a [`GenerationClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub default_model: String,
    pub heavy_model: Option<String>,
    pub light_model: Option<String>,
    /// Tried once after the primary model gives up. `None` disables it.
    pub fallback_model: Option<String>,
    /// Upper bound on a single provider round trip.
    pub request_timeout: Duration,
    pub max_output_tokens: u32,
    pub narrative_max_output_tokens: u32,
    /// Retries after the first attempt, for transient failures only.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub structured_temperature: f32,
    /// Used for the single retry after unparseable structured output.
    pub reduced_temperature: f32,
    pub narrative_temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_model: gemini::DEFAULT_MODEL.to_string(),
            heavy_model: None,
            light_model: None,
            fallback_model: Some("gemini-2.0-flash-lite".to_string()),
            request_timeout: gemini::DEFAULT_TIMEOUT,
            max_output_tokens: 4096,
            narrative_max_output_tokens: 2048,
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            structured_temperature: 0.8,
            reduced_temperature: 0.4,
            narrative_temperature: 1.0,
        }
    }
}

impl GenerationConfig {
    /// Defaults overridden by `GEMINI_MODEL*` and `NARRATOR_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`GenerationConfig::from_env`], reading variables through
    /// `lookup`. Blank values count as unset; unparseable numbers are
    /// logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(model) = get("GEMINI_MODEL") {
            config.default_model = model;
        }
        if let Some(model) = get("GEMINI_MODEL_HEAVY") {
            config.heavy_model = Some(model);
        }
        if let Some(model) = get("GEMINI_MODEL_LIGHT") {
            config.light_model = Some(model);
        }
        if let Some(model) = get("GEMINI_MODEL_FALLBACK") {
            config.fallback_model = match model.to_lowercase().as_str() {
                "none" | "off" => None,
                _ => Some(model),
            };
        }
        if let Some(secs) = parse_var::<u64>("NARRATOR_TIMEOUT_SECS", get("NARRATOR_TIMEOUT_SECS")) {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(tokens) = parse_var::<u32>("NARRATOR_MAX_TOKENS", get("NARRATOR_MAX_TOKENS")) {
            config.max_output_tokens = tokens;
        }
        if let Some(retries) = parse_var::<u32>("NARRATOR_MAX_RETRIES", get("NARRATOR_MAX_RETRIES")) {
            config.max_retries = retries;
        }
        config
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        let chosen = match tier {
            ModelTier::Default => None,
            ModelTier::Heavy => self.heavy_model.as_deref(),
            ModelTier::Light => self.light_model.as_deref(),
        };
        chosen.unwrap_or(&self.default_model)
    }

    /// Delay before retry number `attempt` (0-based): `base × 2^attempt`,
    /// capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "Ignoring unparseable setting");
            None
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// One fully rendered provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Ask the provider for a JSON response body.
    pub json_output: bool,
    pub policy: ContentPolicy,
}

/// Coarse cause of a failure, used for retry decisions and user messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    RateLimited,
    InvalidCredential,
    GeoRestricted,
    Overloaded,
    /// The provider's safety filter refused the prompt or the answer.
    ContentBlocked,
    Validation,
    Other,
}

impl FailureClass {
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureClass::RateLimited | FailureClass::Overloaded)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FailureClass::InvalidCredential | FailureClass::GeoRestricted)
    }
}

/// A failed provider call, as reported by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("HTTP {status} {code}: {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("response blocked: {0}")]
    Blocked(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify by status code and message pattern.
    pub fn class(&self) -> FailureClass {
        if matches!(self, ProviderError::Blocked(_)) {
            return FailureClass::ContentBlocked;
        }
        let text = self.to_string().to_lowercase();
        let status = self.status();

        if text.contains("location") || text.contains("region") {
            return FailureClass::GeoRestricted;
        }
        if status == Some(429) || text.contains("resource_exhausted") || text.contains("quota") {
            return FailureClass::RateLimited;
        }
        if matches!(status, Some(401) | Some(403))
            || text.contains("api key")
            || text.contains("api_key")
            || text.contains("unauthenticated")
        {
            return FailureClass::InvalidCredential;
        }
        if matches!(self, ProviderError::Timeout | ProviderError::Network(_))
            || matches!(status, Some(500) | Some(502) | Some(503) | Some(504))
            || text.contains("unavailable")
            || text.contains("overloaded")
            || text.contains("deadline_exceeded")
        {
            return FailureClass::Overloaded;
        }
        FailureClass::Other
    }

    pub fn is_transient(&self) -> bool {
        self.class().is_transient()
    }

    pub fn is_fatal(&self) -> bool {
        self.class().is_fatal()
    }
}

/// Sends one request to a text-generation provider.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}

impl From<gemini::Error> for ProviderError {
    fn from(error: gemini::Error) -> Self {
        match error {
            gemini::Error::Api {
                status,
                code,
                message,
            } => ProviderError::Status {
                status,
                code,
                message,
            },
            gemini::Error::Network { timeout: true, .. } => ProviderError::Timeout,
            gemini::Error::Network { message, .. } => ProviderError::Network(message),
            gemini::Error::Blocked(reason) => ProviderError::Blocked(reason),
            other => ProviderError::Other(other.to_string()),
        }
    }
}

fn safety_threshold(policy: ContentPolicy) -> gemini::BlockThreshold {
    match policy {
        ContentPolicy::Full => gemini::BlockThreshold::Off,
        ContentPolicy::Moderate => gemini::BlockThreshold::BlockOnlyHigh,
        ContentPolicy::Family => gemini::BlockThreshold::BlockMediumAndAbove,
    }
}

#[async_trait]
impl Transport for gemini::Gemini {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let mut call = gemini::Request::new(request.prompt.clone())
            .with_model(request.model.clone())
            .with_temperature(request.temperature)
            .with_max_output_tokens(request.max_output_tokens)
            .with_safety(gemini::SafetySetting::uniform(safety_threshold(request.policy)));
        if request.json_output {
            call = call.json();
        }
        let response = gemini::Gemini::generate(self, &call).await?;
        Ok(response.text)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("decision parse failed: {0}")]
    DecisionParseFailed(#[source] IngestError),

    #[error("decision validation failed: {0}")]
    DecisionValidationFailed(#[source] IngestError),

    #[error("provider unavailable: {0}")]
    ProviderTransient(#[source] ProviderError),

    #[error("provider rejected request: {0}")]
    ProviderFatal(#[source] ProviderError),
}

/// A surfaced generation failure, tagged with the operation that failed.
#[derive(Debug, Error)]
#[error("{operation}: {kind}")]
pub struct GenerationError {
    /// e.g. `structured/MechanicsDecision` or `text`
    pub operation: String,
    #[source]
    pub kind: ErrorKind,
}

impl GenerationError {
    fn provider(operation: &str, error: ProviderError) -> Self {
        let kind = if error.is_transient() {
            ErrorKind::ProviderTransient(error)
        } else {
            ErrorKind::ProviderFatal(error)
        };
        Self {
            operation: operation.to_string(),
            kind,
        }
    }

    fn ingest(operation: &str, error: IngestError) -> Self {
        let kind = if error.is_parse_failure() {
            ErrorKind::DecisionParseFailed(error)
        } else {
            ErrorKind::DecisionValidationFailed(error)
        };
        Self {
            operation: operation.to_string(),
            kind,
        }
    }

    pub fn cause_class(&self) -> FailureClass {
        match &self.kind {
            ErrorKind::DecisionParseFailed(_) | ErrorKind::DecisionValidationFailed(_) => {
                FailureClass::Validation
            }
            ErrorKind::ProviderTransient(e) | ErrorKind::ProviderFatal(e) => e.class(),
        }
    }

    /// Short message for the player. `lang` starting with "ru" gives
    /// Russian; anything else gives English.
    pub fn user_message(&self, lang: &str) -> String {
        let russian = lang.trim().to_lowercase().starts_with("ru");
        let text = match (self.cause_class(), russian) {
            (FailureClass::RateLimited, false) => "⚠️ Rate limited. Wait a minute.",
            (FailureClass::RateLimited, true) => "⚠️ Лимит запросов. Подожди минуту.",
            (FailureClass::InvalidCredential, false) => "⚠️ Invalid API key.",
            (FailureClass::InvalidCredential, true) => "⚠️ Неверный API-ключ.",
            (FailureClass::GeoRestricted, false) => "⚠️ API geo-blocked. Check GEMINI_PROXY.",
            (FailureClass::GeoRestricted, true) => {
                "⚠️ API недоступен из региона. Проверь GEMINI_PROXY."
            }
            (FailureClass::Overloaded, false) => "⚠️ The AI is overloaded. Try again shortly.",
            (FailureClass::Overloaded, true) => "⚠️ AI перегружен. Попробуй чуть позже.",
            (FailureClass::ContentBlocked, false) => {
                "⚠️ The AI refused to answer that. Try rephrasing."
            }
            (FailureClass::ContentBlocked, true) => {
                "⚠️ AI отказался отвечать на это. Попробуй переформулировать."
            }
            (FailureClass::Validation, false) => "⚠️ The AI gave a garbled answer. Try again.",
            (FailureClass::Validation, true) => "⚠️ AI ответил неразборчиво. Попробуй ещё раз.",
            (FailureClass::Other, _) => {
                let detail: String = self.kind.to_string().chars().take(USER_EXCERPT_LEN).collect();
                return if russian {
                    format!("⚠️ Ошибка AI: {detail}")
                } else {
                    format!("⚠️ AI error: {detail}")
                };
            }
        };
        text.to_string()
    }
}

// ============================================================================
// Client
// ============================================================================

struct Excerpt<'a>(&'a str);

impl fmt::Display for Excerpt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.char_indices().nth(LOG_EXCERPT_LEN) {
            Some((end, _)) => write!(f, "{}…", &self.0[..end]),
            None => f.write_str(self.0),
        }
    }
}

pub struct GenerationClient<T: Transport> {
    transport: T,
    config: GenerationConfig,
}

impl<T: Transport> GenerationClient<T> {
    pub fn new(transport: T, config: GenerationConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Ask for a JSON object of schema `S` and ingest it.
    ///
    /// Output that cannot be parsed even after repair is requested once more
    /// at `reduced_temperature`. Validation failures are not retried.
    pub async fn generate_structured<S>(
        &self,
        prompt: &str,
        tier: ModelTier,
        policy: ContentPolicy,
    ) -> Result<S, GenerationError>
    where
        S: Schema + DeserializeOwned,
    {
        let operation = format!("structured/{}", S::schema_name());
        let mut request = GenerationRequest {
            model: self.config.model_for(tier).to_string(),
            prompt: structured_prompt::<S>(prompt),
            temperature: self.config.structured_temperature,
            max_output_tokens: self.config.max_output_tokens,
            json_output: true,
            policy,
        };

        tracing::debug!(
            operation = %operation,
            model = %request.model,
            prompt_len = request.prompt.len(),
            "Structured request"
        );
        let raw = self.call(&operation, &request).await?;
        tracing::debug!(operation = %operation, response = %Excerpt(&raw), "Structured response");

        match ingest::<S>(&raw) {
            Ok(value) => Ok(value),
            Err(e) if e.is_parse_failure() => {
                tracing::warn!(
                    operation = %operation,
                    error = %e,
                    temperature = self.config.reduced_temperature,
                    "Unparseable output, retrying at reduced temperature"
                );
                request.temperature = self.config.reduced_temperature;
                let raw = self.call(&operation, &request).await?;
                tracing::debug!(operation = %operation, response = %Excerpt(&raw), "Structured response");
                ingest::<S>(&raw).map_err(|e| GenerationError::ingest(&operation, e))
            }
            Err(e) => Err(GenerationError::ingest(&operation, e)),
        }
    }

    /// Free-form narrative text.
    pub async fn generate_text(
        &self,
        prompt: &str,
        tier: ModelTier,
        policy: ContentPolicy,
    ) -> Result<String, GenerationError> {
        let request = GenerationRequest {
            model: self.config.model_for(tier).to_string(),
            prompt: prompt.to_string(),
            temperature: self.config.narrative_temperature,
            max_output_tokens: self.config.narrative_max_output_tokens,
            json_output: false,
            policy,
        };
        let text = self.call("text", &request).await?;
        Ok(text.trim().to_string())
    }

    /// Retry on the same model, then escalate to the fallback model once.
    async fn call(&self, operation: &str, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut attempt = 0;
        let last_error = loop {
            match self.attempt(request).await {
                Ok(text) => {
                    if attempt > 0 {
                        tracing::info!(operation, attempt = attempt + 1, "Provider call succeeded after retry");
                    }
                    return Ok(text);
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(operation, error = %e, "Provider call failed with fatal error");
                    return Err(GenerationError::provider(operation, e));
                }
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => break e,
            }
        };

        let fallback = match self.config.fallback_model.as_deref() {
            Some(model) if model != request.model => model,
            _ => return Err(GenerationError::provider(operation, last_error)),
        };

        tracing::warn!(
            operation,
            from = %request.model,
            to = fallback,
            error = %last_error,
            "Escalating to fallback model"
        );
        let escalated = GenerationRequest {
            model: fallback.to_string(),
            ..request.clone()
        };
        self.attempt(&escalated).await.map_err(|e| {
            tracing::error!(operation, error = %e, "Fallback model failed");
            GenerationError::provider(operation, e)
        })
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        match tokio::time::timeout(self.config.request_timeout, self.transport.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        }
    }
}
