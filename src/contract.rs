//! # Request/Response Contract
//!
//! The uniform data contract that lets any provider adapter be composed into
//! the same orchestration pipeline despite wildly different wire protocols.
//! This module is pure data: no I/O, no policy, no adapter-specific logic.
//!
//! ```rust
//! use completion_orchestrator::contract::{Request, RequestKind, RequestContext};
//!
//! let request = Request {
//!     kind: RequestKind::ChatCompletion,
//!     prompt: "Summarize the attached report.".to_string(),
//!     system_prompt: Some("You are a concise analyst.".to_string()),
//!     max_tokens: 512,
//!     temperature: 0.2,
//!     image_bytes: None,
//!     image_format: None,
//!     image_urls: Vec::new(),
//!     audio_bytes: None,
//!     audio_format: None,
//!     additional_parameters: Default::default(),
//!     context: RequestContext::new(),
//! };
//! assert_eq!(request.kind, RequestKind::ChatCompletion);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The kind of completion a [`Request`] asks for.
///
/// A request's kind is immutable once constructed; the orchestrator only
/// ever dispatches it to adapters whose declared capabilities include it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    TextCompletion,
    ChatCompletion,
    VisionAnalysis,
    ImageGeneration,
    TextToSpeech,
    AudioTranscription,
}

impl RequestKind {
    /// Whether this kind carries a textual prompt that must be non-empty.
    pub fn is_text_like(self) -> bool {
        matches!(self, RequestKind::TextCompletion | RequestKind::ChatCompletion)
    }

    /// Whether this kind requires image input (bytes or URLs).
    pub fn requires_image_input(self) -> bool {
        matches!(self, RequestKind::VisionAnalysis)
    }

    /// Whether this kind requires audio input bytes.
    pub fn requires_audio_input(self) -> bool {
        matches!(self, RequestKind::AudioTranscription)
    }
}

/// Per-request contextual metadata, separate from the completion payload
/// itself so adapters never have to reach into request internals to find it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub language: String,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            user_id: None,
            session_id: None,
            language: "en".to_string(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// An abstract AI request, uniform across every supported provider.
///
/// Requests are immutable from the moment the orchestrator receives them;
/// any per-provider mutation (e.g. clamping `max_tokens`) happens on a
/// derived payload built by the adapter, never on this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub kind: RequestKind,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub image_bytes: Option<Vec<u8>>,
    pub image_format: Option<String>,
    pub image_urls: Vec<String>,
    pub audio_bytes: Option<Vec<u8>>,
    pub audio_format: Option<String>,
    pub additional_parameters: HashMap<String, Value>,
    pub context: RequestContext,
}

impl Request {
    /// A minimal text-completion request, used by `canHandle` probes and
    /// health checks; never actually dispatched to a remote service.
    pub fn synthetic_probe() -> Self {
        Self {
            kind: RequestKind::TextCompletion,
            prompt: "ping".to_string(),
            system_prompt: None,
            max_tokens: 1,
            temperature: 0.0,
            image_bytes: None,
            image_format: None,
            image_urls: Vec::new(),
            audio_bytes: None,
            audio_format: None,
            additional_parameters: HashMap::new(),
            context: RequestContext::new(),
        }
    }

    /// True when the request shape is missing data its `kind` requires.
    /// Mirrors the orchestrator's step-1 validation (§4.8).
    pub fn is_well_formed(&self) -> bool {
        if self.kind.is_text_like() && self.prompt.trim().is_empty() {
            return false;
        }
        if self.kind.requires_image_input() && self.image_bytes.is_none() && self.image_urls.is_empty() {
            return false;
        }
        if self.kind.requires_audio_input() && self.audio_bytes.is_none() {
            return false;
        }
        true
    }
}

/// The taxonomy of error codes a [`Response`] may carry. `HttpStatus` covers
/// the wire-level `HTTP_<status>` family named in the specification so the
/// discriminant stays finite while still reporting the exact status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    QuotaExceeded,
    RateLimitExceeded,
    Timeout,
    CircuitOpen,
    HttpStatus(u16),
    InvalidRequest,
    InvalidResponse,
    Cancelled,
    UnknownError,
}

impl ErrorCode {
    /// Errors the orchestrator treats as fallback-eligible without consulting
    /// `Adapter::should_fallback` (§4.8 step 4c).
    pub fn is_unconditionally_fallback_eligible(self) -> bool {
        match self {
            ErrorCode::QuotaExceeded
            | ErrorCode::RateLimitExceeded
            | ErrorCode::Timeout
            | ErrorCode::CircuitOpen => true,
            ErrorCode::HttpStatus(status) => status >= 500 || status == 429,
            _ => false,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::QuotaExceeded => write!(f, "QUOTA_EXCEEDED"),
            ErrorCode::RateLimitExceeded => write!(f, "RATE_LIMIT_EXCEEDED"),
            ErrorCode::Timeout => write!(f, "TIMEOUT"),
            ErrorCode::CircuitOpen => write!(f, "CIRCUIT_OPEN"),
            ErrorCode::HttpStatus(s) => write!(f, "HTTP_{s}"),
            ErrorCode::InvalidRequest => write!(f, "INVALID_REQUEST"),
            ErrorCode::InvalidResponse => write!(f, "INVALID_RESPONSE"),
            ErrorCode::Cancelled => write!(f, "CANCELLED"),
            ErrorCode::UnknownError => write!(f, "UNKNOWN_ERROR"),
        }
    }
}

/// The uniform response shape returned by every adapter and by the
/// orchestrator itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub tokens_used: u32,
    pub processing_time: Duration,
    pub is_success: bool,
    pub estimated_cost: f64,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub metadata: HashMap<String, Value>,
}

impl Response {
    /// Construct a successful response. Per invariant 3, a response is
    /// successful iff `is_success=true` AND `error_code` unset AND content
    /// present; this constructor upholds that by never accepting an error.
    pub fn success(provider: impl Into<String>, model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            provider: provider.into(),
            model: model.into(),
            tokens_used: 0,
            processing_time: Duration::ZERO,
            is_success: true,
            estimated_cost: 0.0,
            error_code: None,
            error_message: None,
            metadata: HashMap::new(),
        }
    }

    /// Construct a failure response carrying a taxonomy code and message.
    pub fn failure(provider: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            provider: provider.into(),
            model: String::new(),
            tokens_used: 0,
            processing_time: Duration::ZERO,
            is_success: false,
            estimated_cost: 0.0,
            error_code: Some(code),
            error_message: Some(message.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_tokens_used(mut self, tokens: u32) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub fn with_processing_time(mut self, duration: Duration) -> Self {
        self.processing_time = duration;
        self
    }

    pub fn with_estimated_cost(mut self, cost: f64) -> Self {
        self.estimated_cost = cost;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// True iff all of invariant 3's three conditions hold.
    pub fn is_well_formed_success(&self) -> bool {
        self.is_success && self.error_code.is_none() && !self.content.is_empty()
    }
}

/// Capability advertisement for a single adapter (§3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub text_completion: bool,
    pub chat_completion: bool,
    pub vision_analysis: bool,
    pub image_generation: bool,
    pub text_to_speech: bool,
    pub audio_transcription: bool,
    pub max_tokens_limit: u32,
    pub supported_languages: Vec<String>,
    pub supported_image_formats: Vec<String>,
    pub supported_audio_formats: Vec<String>,
}

impl ProviderCapabilities {
    pub fn supports(&self, kind: RequestKind) -> bool {
        match kind {
            RequestKind::TextCompletion => self.text_completion,
            RequestKind::ChatCompletion => self.chat_completion,
            RequestKind::VisionAnalysis => self.vision_analysis,
            RequestKind::ImageGeneration => self.image_generation,
            RequestKind::TextToSpeech => self.text_to_speech,
            RequestKind::AudioTranscription => self.audio_transcription,
        }
    }

    pub fn supports_language(&self, language: &str) -> bool {
        self.supported_languages.is_empty()
            || self.supported_languages.iter().any(|l| l.eq_ignore_ascii_case(language))
    }

    /// Text-only, every kind disabled by default; callers enable what they need.
    pub fn text_only(max_tokens_limit: u32) -> Self {
        Self {
            text_completion: true,
            chat_completion: true,
            vision_analysis: false,
            image_generation: false,
            text_to_speech: false,
            audio_transcription: false,
            max_tokens_limit,
            supported_languages: vec!["en".to_string()],
            supported_image_formats: Vec::new(),
            supported_audio_formats: Vec::new(),
        }
    }
}

/// Per-adapter static configuration (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfiguration {
    pub name: String,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub is_enabled: bool,
    #[serde(with = "crate::common::duration_serde")]
    pub timeout: Duration,
    pub max_retries: u32,
    pub circuit_breaker_failures_before_breaking: u32,
    #[serde(with = "crate::common::duration_serde")]
    pub circuit_breaker_duration: Duration,
    pub enable_caching: bool,
    pub cache_duration_minutes: u32,
    pub enable_rate_limiting: bool,
    pub requests_per_minute: u32,
    pub additional_settings: HashMap<String, Value>,
}

impl ProviderConfiguration {
    /// Reasonable defaults matching §4.3's defaults (retries=2, breaker
    /// threshold=5, breaker cooldown=30s, timeout=30s).
    pub fn new(name: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            base_url: String::new(),
            api_key: api_key.into(),
            is_enabled: true,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            circuit_breaker_failures_before_breaking: 5,
            circuit_breaker_duration: Duration::from_secs(30),
            enable_caching: true,
            cache_duration_minutes: 5,
            enable_rate_limiting: true,
            requests_per_minute: 60,
            additional_settings: HashMap::new(),
        }
    }

    /// Whether `additional_settings` carries an explicit opt-out of TLS
    /// certificate validation. Default full validation (open question,
    /// decided in DESIGN.md): absent or false means validate.
    pub fn danger_accept_invalid_certs(&self) -> bool {
        self.additional_settings
            .get("danger_accept_invalid_certs")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Result of a quota admission check (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCheckResult {
    pub can_proceed: bool,
    pub remaining_requests: Option<u64>,
    pub remaining_tokens: Option<u64>,
    pub time_until_reset: Option<Duration>,
}

impl QuotaCheckResult {
    pub fn allowed() -> Self {
        Self {
            can_proceed: true,
            remaining_requests: None,
            remaining_tokens: None,
            time_until_reset: None,
        }
    }

    pub fn denied(time_until_reset: Duration) -> Self {
        Self {
            can_proceed: false,
            remaining_requests: Some(0),
            remaining_tokens: Some(0),
            time_until_reset: Some(time_until_reset),
        }
    }
}

/// Rolling-window quota window scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaWindow {
    Daily,
    Monthly,
}

/// Snapshot of quota consumption for one (provider, scope, window) tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub provider: String,
    pub scope: Option<String>,
    pub window: QuotaWindow,
    pub limit_requests: Option<u64>,
    pub limit_tokens: Option<u64>,
    pub limit_cost: Option<f64>,
    pub consumed_requests: u64,
    pub consumed_tokens: u64,
    pub consumed_cost: f64,
    pub expires: DateTime<Utc>,
}
