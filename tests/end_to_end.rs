//! End-to-end scenarios driving the real `BaseAdapter` pipeline (cache,
//! resilience, circuit breaker) through the orchestrator, using stub codecs
//! instead of network I/O. Complements the per-module unit tests with the
//! cache-hit and circuit-open scenarios, which need the concrete pipeline
//! rather than a scripted `Adapter`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use completion_orchestrator::adapter::{Adapter, BaseAdapter, BaseAdapterDeps, WireCodec, WireResponse};
use completion_orchestrator::api_key::StaticApiKeyManager;
use completion_orchestrator::cache::InMemoryResponseCache;
use completion_orchestrator::contract::{
    ErrorCode, ProviderCapabilities, ProviderConfiguration, Request, RequestContext, RequestKind,
};
use completion_orchestrator::error::AdapterError;
use completion_orchestrator::orchestrator::Orchestrator;
use completion_orchestrator::providers::{CodecAdapter, EchoCodec};
use completion_orchestrator::quota::NullQuotaManager;
use completion_orchestrator::registry::ProviderRegistry;
use completion_orchestrator::sinks::{InMemoryAuditSink, InMemoryMetricsSink, NullAuditSink, NullMetricsSink};
use tokio_util::sync::CancellationToken;

fn text_request(prompt: &str, max_tokens: u32) -> Request {
    Request {
        kind: RequestKind::TextCompletion,
        prompt: prompt.to_string(),
        system_prompt: None,
        max_tokens,
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

fn deps(cache: Option<Arc<InMemoryResponseCache>>) -> BaseAdapterDeps {
    BaseAdapterDeps {
        quota: Arc::new(NullQuotaManager),
        cache: cache.map(|c| c as Arc<dyn completion_orchestrator::cache::ResponseCache>),
        audit: Arc::new(NullAuditSink),
        metrics: Arc::new(NullMetricsSink),
        api_keys: Arc::new(StaticApiKeyManager::new(HashMap::new())),
    }
}

/// Scenario 1 (single success) and scenario 4 (cache hit), run against the
/// real pipeline: the same request issued twice must only invoke the codec
/// once.
#[tokio::test]
async fn cache_hit_skips_the_second_adapter_invocation() {
    let calls = Arc::new(AtomicU32::new(0));

    struct CountingEcho {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl WireCodec for CountingEcho {
        async fn send(
            &self,
            _client: &reqwest::Client,
            config: &ProviderConfiguration,
            _api_key: &str,
            request: &Request,
        ) -> Result<WireResponse, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(WireResponse { content: format!("echo: {}", request.prompt), model: config.model.clone(), tokens_used: None })
        }

        fn estimate_cost(&self, _input_tokens: u32, _output_tokens: u32) -> f64 {
            0.0
        }
    }

    let cache = Arc::new(InMemoryResponseCache::new(16));
    let mut config = ProviderConfiguration::new("A", "m", "key");
    config.cache_duration_minutes = 5;
    let capabilities = ProviderCapabilities::text_only(4096);
    let base = BaseAdapter::new(config, capabilities, 1, false, deps(Some(cache)));
    let adapter = Arc::new(CodecAdapter::new(base, CountingEcho { calls: calls.clone() }));

    let mut registry = ProviderRegistry::new();
    registry.register(adapter);
    let orchestrator = Orchestrator::new(registry, Arc::new(InMemoryMetricsSink::new()));

    let request = text_request("hi", 32);
    let first = orchestrator.get_completion(&request, &CancellationToken::new()).await;
    assert!(first.is_success);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let second = orchestrator.get_completion(&request, &CancellationToken::new()).await;
    assert!(second.is_success);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "second call must be served from cache");
    assert_eq!(second.metadata.get("cached").and_then(|v| v.as_bool()), Some(true));
}

/// Scenario 5: three consecutive failures open the breaker; the fourth call
/// within the cooldown window falls back to the next candidate without
/// reaching the network.
#[tokio::test]
async fn circuit_breaker_opens_after_threshold_and_falls_back() {
    struct AlwaysFails;

    #[async_trait]
    impl WireCodec for AlwaysFails {
        async fn send(
            &self,
            _client: &reqwest::Client,
            _config: &ProviderConfiguration,
            _api_key: &str,
            _request: &Request,
        ) -> Result<WireResponse, AdapterError> {
            Err(AdapterError::Http { status: 500, message: "boom".to_string() })
        }

        fn estimate_cost(&self, _input_tokens: u32, _output_tokens: u32) -> f64 {
            0.0
        }
    }

    let mut config_a = ProviderConfiguration::new("A", "m", "key");
    config_a.max_retries = 0;
    config_a.circuit_breaker_failures_before_breaking = 3;
    config_a.circuit_breaker_duration = Duration::from_secs(30);
    config_a.enable_caching = false;
    let capabilities = ProviderCapabilities::text_only(4096);
    let base_a = BaseAdapter::new(config_a, capabilities.clone(), 1, false, deps(None));
    let a = Arc::new(CodecAdapter::new(base_a, AlwaysFails));

    let config_b = ProviderConfiguration::new("B", "m", "key");
    let base_b = BaseAdapter::new(config_b, capabilities, 2, false, deps(None));
    let b = Arc::new(CodecAdapter::new(base_b, EchoCodec { model: "m".to_string() }));

    let mut registry = ProviderRegistry::new();
    registry.register(a.clone() as Arc<dyn Adapter>);
    registry.register(b as Arc<dyn Adapter>);
    let orchestrator = Orchestrator::new(registry, Arc::new(InMemoryMetricsSink::new()));

    for _ in 0..3 {
        let response = orchestrator.get_completion(&text_request("hi", 32), &CancellationToken::new()).await;
        assert_eq!(response.error_code, Some(ErrorCode::HttpStatus(500)));
    }

    assert!(a.circuit_breaker_is_open().await);

    let response = orchestrator.get_completion(&text_request("hi", 32), &CancellationToken::new()).await;
    assert!(response.is_success);
    assert_eq!(response.provider, "B");
    let failures = response.metadata.get("failures").cloned().unwrap();
    let failures: Vec<completion_orchestrator::orchestrator::AdapterFailure> = serde_json::from_value(failures).unwrap();
    assert_eq!(failures[0].error_code, ErrorCode::CircuitOpen);
}

/// Boundary: a request asking for more tokens than the adapter's limit is
/// clamped rather than rejected.
#[tokio::test]
async fn max_tokens_is_clamped_to_the_adapter_limit() {
    let config = ProviderConfiguration::new("A", "m", "key");
    let capabilities = ProviderCapabilities::text_only(4096);
    let base = BaseAdapter::new(config, capabilities, 1, false, deps(None));
    let adapter = Arc::new(CodecAdapter::new(base, EchoCodec { model: "m".to_string() }));

    let mut registry = ProviderRegistry::new();
    registry.register(adapter);
    let orchestrator = Orchestrator::new(registry, Arc::new(InMemoryMetricsSink::new()));

    let response = orchestrator.get_completion(&text_request("hi", 10_000_000), &CancellationToken::new()).await;
    assert!(response.is_success);
}

/// `recordUsage(success=false)` must still count the request without
/// touching token/cost counters; exercised here via an audit sink that keeps
/// the raw entries the pipeline produced on a quota-denied call.
#[tokio::test]
async fn failed_admission_is_audited_without_token_usage() {
    let audit = Arc::new(InMemoryAuditSink::new(16));
    let mut config = ProviderConfiguration::new("A", "m", "key");
    config.requests_per_minute = 0;
    let capabilities = ProviderCapabilities::text_only(4096);
    let deps = BaseAdapterDeps {
        quota: Arc::new(NullQuotaManager),
        cache: None,
        audit: audit.clone() as Arc<dyn completion_orchestrator::sinks::AuditSink>,
        metrics: Arc::new(NullMetricsSink),
        api_keys: Arc::new(StaticApiKeyManager::new(HashMap::new())),
    };
    let base = BaseAdapter::new(config, capabilities, 1, false, deps);
    let adapter = Arc::new(CodecAdapter::new(base, EchoCodec { model: "m".to_string() }));

    let mut registry = ProviderRegistry::new();
    registry.register(adapter);
    let orchestrator = Orchestrator::new(registry, Arc::new(InMemoryMetricsSink::new()));

    let response = orchestrator.get_completion(&text_request("hi", 32), &CancellationToken::new()).await;
    assert!(!response.is_success);
    assert_eq!(response.error_code, Some(ErrorCode::RateLimitExceeded));
    let entries = audit.recent();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tokens_used, 0);
}
