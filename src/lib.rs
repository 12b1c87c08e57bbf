//! # Completion Orchestrator
//!
//! A provider-agnostic orchestration layer for multi-provider AI completion
//! requests. The crate does not speak any particular vendor's wire protocol
//! itself; instead it defines a small [`adapter::Adapter`] contract that
//! concrete provider integrations implement, and provides everything around
//! that contract that a production deployment needs regardless of which
//! providers are wired in:
//!
//! - **Resilience**: per-adapter timeout, circuit breaker, and retry with
//!   jittered exponential backoff ([`resilience`]).
//! - **Fallback orchestration**: a priority-ordered, capability-aware walk
//!   across registered adapters that treats provider failure as routing
//!   signal rather than a fatal error ([`orchestrator`], [`registry`]).
//! - **Quota management**: daily/monthly request, token, and cost ceilings
//!   per provider and user ([`quota`]).
//! - **Response caching**: deterministic-request caching with an optional
//!   two-tier local/shared backend ([`cache`]).
//! - **Rate limiting**: sliding-window admission control per adapter
//!   ([`rate_limiter`]).
//! - **Observability**: pluggable audit and metrics sinks ([`sinks`]).
//! - **API key management**: static or rotating key pools ([`api_key`]).
//!
//! Two worked adapters ship behind feature flags as concrete examples of the
//! [`adapter::WireCodec`] contract: `openai-compatible` (a Bearer-authenticated
//! `/chat/completions` JSON codec) and `ollama` (a local, unauthenticated
//! `/api/chat` codec). Neither is required to use the orchestrator; wiring in
//! a twenty-first provider means implementing `WireCodec` once, not touching
//! any other module.
//!
//! ## Quick start
//!
//! ```no_run
//! use completion_orchestrator::contract::{ProviderConfiguration, Request, RequestKind};
//! use completion_orchestrator::orchestrator::{Orchestrator, OrchestratorConfig};
//! use completion_orchestrator::registry::ProviderRegistry;
//! use completion_orchestrator::sinks::InMemoryMetricsSink;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[cfg(feature = "openai-compatible")]
//! # async fn run() {
//! use completion_orchestrator::adapter::BaseAdapterDeps;
//! use completion_orchestrator::api_key::StaticApiKeyManager;
//! use completion_orchestrator::cache::InMemoryResponseCache;
//! use completion_orchestrator::providers::openai_compatible::{self, TokenPricing};
//! use completion_orchestrator::quota::NullQuotaManager;
//! use completion_orchestrator::sinks::NullAuditSink;
//! use std::collections::HashMap;
//!
//! let deps = BaseAdapterDeps {
//!     quota: Arc::new(NullQuotaManager),
//!     cache: Some(Arc::new(InMemoryResponseCache::new(256))),
//!     audit: Arc::new(NullAuditSink),
//!     metrics: Arc::new(InMemoryMetricsSink::new()),
//!     api_keys: Arc::new(StaticApiKeyManager::new(HashMap::new())),
//! };
//!
//! let config = ProviderConfiguration::new("primary", "gpt-4o-mini", "sk-test");
//! let adapter = openai_compatible::build(config, 0, 128_000, TokenPricing::default(), deps);
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register(adapter);
//!
//! let metrics = Arc::new(InMemoryMetricsSink::new());
//! let orchestrator = Orchestrator::new(registry, metrics);
//! let _ = OrchestratorConfig::default();
//!
//! let request = Request::synthetic_probe();
//! let response = orchestrator.get_completion(&request, &CancellationToken::new()).await;
//! println!("{}", response.content);
//! # }
//! ```
//!
//! ## Non-goals
//!
//! This crate does not implement a streaming response protocol, a
//! request-routing DSL, or any concrete provider's wire format beyond the two
//! worked examples above. Those concerns live in the application that embeds
//! this crate.

pub mod adapter;
pub mod api_key;
pub mod cache;
pub mod common;
pub mod contract;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod quota;
pub mod rate_limiter;
pub mod registry;
pub mod resilience;
pub mod sinks;

pub use adapter::{Adapter, AdapterOutcome, BaseAdapter, BaseAdapterDeps, WireCodec, WireResponse};
pub use contract::{
    ErrorCode, ProviderCapabilities, ProviderConfiguration, QuotaCheckResult, QuotaStatus,
    QuotaWindow, Request, RequestContext, RequestKind, Response,
};
pub use error::AdapterError;
pub use orchestrator::{AdapterFailure, HealthStatus, Orchestrator, OrchestratorConfig};
pub use registry::ProviderRegistry;

/// Result type for orchestrator-level operations that can fail before ever
/// reaching an adapter (configuration parsing, registry setup).
pub type Result<T> = std::result::Result<T, AdapterError>;
