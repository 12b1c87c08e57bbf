//! Provider Adapter (C2): the capability-polymorphic component wrapping one
//! remote inference service (§4.2).
//!
//! `Adapter` is deliberately small: `canHandle`/`execute`/`shouldFallback`/
//! `estimateCost`. Everything every adapter needs in common — the HTTP
//! client, resilience pipeline, cache/quota/audit/metrics hook-points, API
//! key retrieval, and token estimation — lives in [`BaseAdapter`], a shared
//! "pipeline runner" each concrete adapter composes rather than inherits
//! from (§9, composition over inheritance).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::api_key::ApiKeyManager;
use crate::cache::{CacheKeyBuilder, CachedResponse, SharedResponseCache};
use crate::contract::{ErrorCode, ProviderCapabilities, ProviderConfiguration, Request, Response};
use crate::error::AdapterError;
use crate::quota::QuotaManager;
use crate::rate_limiter::RateLimiter;
use crate::resilience::{ResiliencePipeline, ResiliencePipelineConfig};
use crate::sinks::{AuditLogEntry, AuditSink, MetricsSink};

/// Result of running an adapter's `execute`. Replaces exception-driven
/// fallback control flow (§9): the orchestrator branches on the variant
/// instead of catching typed exceptions.
pub enum AdapterOutcome {
    Success(Response),
    /// Non-success response whose error is fallback-eligible.
    RetryElsewhere(Response),
    /// Non-success response that terminates the whole request.
    Terminal(Response),
}

impl AdapterOutcome {
    pub fn into_response(self) -> Response {
        match self {
            AdapterOutcome::Success(r) | AdapterOutcome::RetryElsewhere(r) | AdapterOutcome::Terminal(r) => r,
        }
    }
}

/// The minimal per-provider interface the registry and orchestrator depend
/// on (§4.2).
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;
    fn priority(&self) -> i32;
    fn capabilities(&self) -> &ProviderCapabilities;
    fn is_local(&self) -> bool;

    /// True iff enabled, the request kind matches capabilities, requested
    /// media modes are supported, and the language is supported.
    fn can_handle(&self, request: &Request) -> bool;

    async fn execute(&self, request: &Request, cancel: &CancellationToken) -> AdapterOutcome;

    /// Default classification per §7: transient/rate-limit/quota/5xx/timeout
    /// fall back; client-permanent (4xx except 408/429) does not.
    fn should_fallback(&self, error: &AdapterError) -> bool {
        error.default_should_fallback()
    }

    fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64;

    async fn circuit_breaker_is_open(&self) -> bool {
        false
    }
}

/// Provider-specific wire codec an adapter supplies to [`BaseAdapter`]: how
/// to build the outgoing payload and parse the response. This is the opaque
/// seam the specification places out of its normative scope (§1, §6).
#[async_trait]
pub trait WireCodec: Send + Sync {
    async fn send(
        &self,
        client: &reqwest::Client,
        config: &ProviderConfiguration,
        api_key: &str,
        request: &Request,
    ) -> Result<WireResponse, AdapterError>;

    fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64;
}

pub struct WireResponse {
    pub content: String,
    pub model: String,
    /// `None` when the upstream did not report usage; the base adapter
    /// falls back to the documented token-estimation heuristic.
    pub tokens_used: Option<u32>,
}

/// Heuristic token estimator used when an upstream response does not report
/// usage (§4.2): `max(ceil(words * 1.3), chars / 4)`.
pub fn estimate_tokens(text: &str) -> u32 {
    let words = text.split_whitespace().count() as f64;
    let chars = text.chars().count() as f64;
    let by_words = (words * 1.3).ceil();
    let by_chars = (chars / 4.0).floor();
    by_words.max(by_chars).max(0.0) as u32
}

/// Shared state and collaborators every concrete adapter composes. Owns the
/// per-adapter resilience pipeline and rate limiter (process-global, §3
/// lifecycle) and holds the cross-cutting quota/cache/audit/metrics/api-key
/// collaborators the orchestrator wires in at startup.
pub struct BaseAdapter {
    pub name: String,
    pub config: ProviderConfiguration,
    pub capabilities: ProviderCapabilities,
    pub priority: i32,
    pub is_local: bool,
    pub cache_nondeterministic: bool,
    http_client: reqwest::Client,
    resilience: ResiliencePipeline,
    rate_limiter: RateLimiter,
    quota: Arc<dyn QuotaManager>,
    cache: Option<SharedResponseCache>,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<dyn MetricsSink>,
    api_keys: Arc<dyn ApiKeyManager>,
}

pub struct BaseAdapterDeps {
    pub quota: Arc<dyn QuotaManager>,
    pub cache: Option<SharedResponseCache>,
    pub audit: Arc<dyn AuditSink>,
    pub metrics: Arc<dyn MetricsSink>,
    pub api_keys: Arc<dyn ApiKeyManager>,
}

impl BaseAdapter {
    pub fn new(config: ProviderConfiguration, capabilities: ProviderCapabilities, priority: i32, is_local: bool, deps: BaseAdapterDeps) -> Self {
        let resilience_config = ResiliencePipelineConfig {
            timeout: config.timeout + Duration::from_secs(5),
            circuit_breaker: crate::resilience::CircuitBreakerConfig {
                failure_threshold: config.circuit_breaker_failures_before_breaking,
                recovery_timeout: config.circuit_breaker_duration,
                half_open_max_calls: 1,
            },
            retry: crate::resilience::RetryPolicy::new(config.max_retries),
        };

        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(300))
            .pool_max_idle_per_host(75)
            .gzip(true)
            .deflate(true)
            .danger_accept_invalid_certs(config.danger_accept_invalid_certs())
            .build()
            .unwrap_or_default();

        Self {
            name: config.name.clone(),
            resilience: ResiliencePipeline::new(config.name.clone(), resilience_config),
            rate_limiter: RateLimiter::new(config.requests_per_minute),
            http_client,
            priority,
            is_local,
            cache_nondeterministic: false,
            quota: deps.quota,
            cache: deps.cache,
            audit: deps.audit,
            metrics: deps.metrics,
            api_keys: deps.api_keys,
            capabilities,
            config,
        }
    }

    pub async fn circuit_breaker_is_open(&self) -> bool {
        matches!(self.resilience.breaker_state().await, crate::resilience::CircuitState::Open)
    }

    /// Runs the ten-step per-adapter pipeline of §4.2 against `codec`.
    pub async fn run_pipeline(&self, request: &Request, cancel: &CancellationToken, codec: &dyn WireCodec) -> AdapterOutcome {
        let start = Instant::now();

        // Step 1: clamp max_tokens, validate required media presence.
        let mut clamped = request.clone();
        if clamped.max_tokens > self.capabilities.max_tokens_limit {
            tracing::debug!(adapter = %self.name, requested = clamped.max_tokens, limit = self.capabilities.max_tokens_limit, "clamping max_tokens");
            clamped.max_tokens = self.capabilities.max_tokens_limit;
        }
        if !clamped.is_well_formed() {
            return AdapterOutcome::Terminal(Response::failure(&self.name, ErrorCode::InvalidRequest, "request missing data required by its kind"));
        }

        // Step 2: quota check.
        let est_tokens = estimate_tokens(&clamped.prompt).max(clamped.max_tokens.min(256));
        let est_cost = codec.estimate_cost(est_tokens, 0);
        let quota_result = self
            .quota
            .check_quota(&self.name, clamped.context.user_id.as_deref(), est_tokens, est_cost)
            .await;
        if !quota_result.can_proceed {
            return self.fail_fallback_eligible(&clamped, ErrorCode::QuotaExceeded, "quota exceeded", start).await;
        }

        // Step 3: cache probe.
        let cache_key = CacheKeyBuilder::cache_key(&self.name, &self.config.model, &clamped);
        if self.config.enable_caching {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.get(&cache_key) {
                    let mut response = Response::success(&self.name, hit.model.clone(), hit.response_text.clone())
                        .with_tokens_used(hit.tokens_used)
                        .with_processing_time(start.elapsed());
                    response = response.with_metadata("cached", true);
                    self.metrics.record_cache_hit(&self.name).await;
                    return AdapterOutcome::Success(response);
                }
            }
        }

        // Step 4: rate limit admission.
        if self.config.enable_rate_limiting {
            if let Err(denied) = self.rate_limiter.try_admit().await {
                let message = format!("rate limit exceeded, retry after {:?}", denied.retry_after);
                self.quota.record_usage(&self.name, clamped.context.user_id.as_deref(), 0, 0.0, false).await;
                return self.fail_fallback_eligible(&clamped, ErrorCode::RateLimitExceeded, &message, start).await;
            }
        }

        // Steps 5-6: build payload and send via the resilience pipeline.
        let api_key = self
            .api_keys
            .current_key(&self.name)
            .await
            .unwrap_or_else(|| self.config.api_key.clone());

        let wire_result = self
            .resilience
            .execute(cancel, || codec.send(&self.http_client, &self.config, &api_key, &clamped))
            .await;

        let wire_response = match wire_result {
            Ok(response) => response,
            Err(err) => {
                self.quota.record_usage(&self.name, clamped.context.user_id.as_deref(), 0, 0.0, false).await;
                let entry = self.audit_entry(&clamped, None, 0, 0.0, start.elapsed(), false, Some(err.error_code()), Some(err.to_string()));
                self.audit.log_request(entry).await;
                self.metrics.record_failure(&self.name, err.error_code()).await;

                if matches!(err, AdapterError::Cancelled) {
                    return AdapterOutcome::Terminal(Response::failure(&self.name, ErrorCode::Cancelled, "cancelled"));
                }

                let response = Response::failure(&self.name, err.error_code(), err.to_string());
                return if err.default_should_fallback() {
                    AdapterOutcome::RetryElsewhere(response)
                } else {
                    AdapterOutcome::Terminal(response)
                };
            }
        };

        // Step 7: extract or estimate tokens used.
        let tokens_used = wire_response.tokens_used.unwrap_or_else(|| estimate_tokens(&wire_response.content).max(1));
        let estimated_cost = codec.estimate_cost(est_tokens, tokens_used);

        // Step 8: usage recording + audit/metrics.
        self.quota
            .record_usage(&self.name, clamped.context.user_id.as_deref(), tokens_used, estimated_cost, true)
            .await;
        let entry = self.audit_entry(&clamped, Some(&wire_response.content), tokens_used, estimated_cost, start.elapsed(), true, None, None);
        self.audit.log_request(entry).await;
        self.metrics.record_success(&self.name, tokens_used, start.elapsed()).await;

        let mut response = Response::success(&self.name, wire_response.model, wire_response.content)
            .with_tokens_used(tokens_used)
            .with_processing_time(start.elapsed())
            .with_estimated_cost(estimated_cost);

        // Step 9: store in cache when eligible.
        let cache_eligible = crate::cache::should_cache(clamped.temperature, self.cache_nondeterministic);
        response = response.with_metadata("cache_policy", if cache_eligible { "eligible" } else { "temperature_opt_out" });
        if let Some(cache) = &self.cache {
            if self.config.enable_caching && self.config.cache_duration_minutes > 0 && cache_eligible {
                let entry = CachedResponse::new(
                    cache_key.clone(),
                    &self.name,
                    self.config.model.clone(),
                    response.content.clone(),
                    tokens_used,
                    start.elapsed().as_millis() as u64,
                    Duration::from_secs(self.config.cache_duration_minutes as u64 * 60),
                );
                cache.set(&cache_key, entry);
            }
        }

        // Step 10.
        AdapterOutcome::Success(response)
    }

    async fn fail_fallback_eligible(&self, request: &Request, code: ErrorCode, message: &str, start: Instant) -> AdapterOutcome {
        let entry = self.audit_entry(request, None, 0, 0.0, start.elapsed(), false, Some(code), Some(message.to_string()));
        self.audit.log_request(entry).await;
        self.metrics.record_failure(&self.name, code).await;
        AdapterOutcome::RetryElsewhere(Response::failure(&self.name, code, message))
    }

    #[allow(clippy::too_many_arguments)]
    fn audit_entry(
        &self,
        request: &Request,
        response_text: Option<&str>,
        tokens_used: u32,
        estimated_cost: f64,
        duration: Duration,
        success: bool,
        error_code: Option<ErrorCode>,
        error_message: Option<String>,
    ) -> AuditLogEntry {
        AuditLogEntry {
            timestamp: chrono::Utc::now(),
            request_id: request.context.request_id.clone(),
            provider: self.name.clone(),
            model: self.config.model.clone(),
            user_id: request.context.user_id.clone(),
            session_id: request.context.session_id.clone(),
            kind: request.kind,
            prompt_hash: CacheKeyBuilder::fingerprint(&self.name, &self.config.model, request),
            prompt_length: request.prompt.len(),
            response_length: response_text.map(str::len).unwrap_or(0),
            tokens_used,
            duration_ms: duration.as_millis() as u64,
            estimated_cost,
            success,
            error_code,
            error_message,
            request_metadata: Default::default(),
            response_metadata: Default::default(),
        }
    }
}
