//! Orchestrator (C8): the top-level entry point that accepts a [`Request`],
//! walks the registry's candidate list, drives fallback, and records the
//! outcome (§4.8).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterOutcome;
use crate::contract::{ErrorCode, Request, Response};
use crate::registry::ProviderRegistry;
use crate::sinks::MetricsSink;

/// One recorded adapter failure during a fallback walk, kept for the
/// summary metadata of a terminal failure response (§7 "user-visible
/// failure behaviour").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterFailure {
    pub provider: String,
    pub error_code: ErrorCode,
    pub error_message: String,
    pub at: DateTime<Utc>,
}

/// Structured result of [`Orchestrator::health_check`] (§6).
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub healthy_providers: usize,
    pub total_providers: usize,
    pub recent_failures_5min: usize,
}

struct RecentFailures {
    window: std::time::Duration,
    timestamps: Vec<Instant>,
}

impl RecentFailures {
    fn new(window: std::time::Duration) -> Self {
        Self { window, timestamps: Vec::new() }
    }

    fn record(&mut self) {
        self.timestamps.push(Instant::now());
    }

    fn count_recent(&mut self) -> usize {
        let window = self.window;
        self.timestamps.retain(|t| t.elapsed() < window);
        self.timestamps.len()
    }
}

/// Accepts a [`Request`], asks the [`ProviderRegistry`] for candidates, and
/// drives the sequential fallback walk of §4.8. Owns no per-adapter state;
/// all of that (breaker, rate window, quota) lives inside each adapter.
pub struct Orchestrator {
    registry: ProviderRegistry,
    metrics: Arc<dyn MetricsSink>,
    recent_failures: RwLock<RecentFailures>,
}

impl Orchestrator {
    pub fn new(registry: ProviderRegistry, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            registry,
            metrics,
            recent_failures: RwLock::new(RecentFailures::new(std::time::Duration::from_secs(5 * 60))),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// §4.8's algorithm, steps 1-5.
    pub async fn get_completion(&self, request: &Request, cancel: &CancellationToken) -> Response {
        // Step 1: validate request shape.
        if !request.is_well_formed() {
            return Response::failure("orchestrator", ErrorCode::InvalidRequest, "request missing data required by its kind");
        }

        // Step 2: ask the registry for the ordered candidate list.
        let candidates = self.registry.candidates(request);
        if candidates.is_empty() {
            return Response::failure("orchestrator", ErrorCode::UnknownError, "no eligible provider");
        }

        // Step 3: failures accumulated across the walk.
        let mut failures: Vec<AdapterFailure> = Vec::new();

        // Step 4: walk candidates in order.
        for adapter in &candidates {
            if cancel.is_cancelled() {
                return self.cancelled_response(&failures);
            }

            let outcome = adapter.execute(request, cancel).await;

            match outcome {
                AdapterOutcome::Success(mut response) => {
                    self.metrics.record_success(&response.provider, response.tokens_used, response.processing_time).await;
                    response = response.with_metadata("fallback_count", failures.len() as i64);
                    if !failures.is_empty() {
                        response = response.with_metadata(
                            "failures",
                            serde_json::to_value(&failures).unwrap_or(serde_json::Value::Null),
                        );
                    }
                    return response;
                }
                AdapterOutcome::RetryElsewhere(response) => {
                    self.record_failure(&mut failures, adapter.name(), &response).await;
                    continue;
                }
                AdapterOutcome::Terminal(response) => {
                    // §4.8 step 4c: a handful of error codes are fallback-eligible
                    // unconditionally, regardless of what the adapter itself
                    // concluded via `should_fallback` — this is the safety net for
                    // that case, not the primary classification path (that lives in
                    // `AdapterError::default_should_fallback`/`Adapter::should_fallback`).
                    let unconditionally_eligible =
                        response.error_code.is_some_and(ErrorCode::is_unconditionally_fallback_eligible);
                    self.record_failure(&mut failures, adapter.name(), &response).await;
                    if unconditionally_eligible {
                        continue;
                    }
                    return response.with_metadata(
                        "failures",
                        serde_json::to_value(&failures).unwrap_or(serde_json::Value::Null),
                    );
                }
            }
        }

        // Step 5: every candidate exhausted.
        self.exhausted_response(&failures)
    }

    async fn record_failure(&self, failures: &mut Vec<AdapterFailure>, provider: &str, response: &Response) {
        let code = response.error_code.unwrap_or(ErrorCode::UnknownError);
        failures.push(AdapterFailure {
            provider: provider.to_string(),
            error_code: code,
            error_message: response.error_message.clone().unwrap_or_default(),
            at: Utc::now(),
        });
        self.recent_failures.write().await.record();
    }

    fn cancelled_response(&self, failures: &[AdapterFailure]) -> Response {
        Response::failure("orchestrator", ErrorCode::Cancelled, "request cancelled")
            .with_metadata("failures", serde_json::to_value(failures).unwrap_or(serde_json::Value::Null))
    }

    fn exhausted_response(&self, failures: &[AdapterFailure]) -> Response {
        let last_code = failures.last().map(|f| f.error_code).unwrap_or(ErrorCode::UnknownError);
        let message = format!("all {} eligible provider(s) failed", failures.len());
        Response::failure("orchestrator", last_code, message)
            .with_metadata("failures", serde_json::to_value(failures).unwrap_or(serde_json::Value::Null))
    }

    /// §4.8 `healthCheck`: true iff at least one enabled adapter can handle a
    /// synthetic probe request and its breaker is not open.
    pub async fn health_check(&self) -> HealthStatus {
        let probe = Request::synthetic_probe();
        let mut healthy_providers = 0;
        for adapter in self.registry.all() {
            if adapter.can_handle(&probe) && !adapter.circuit_breaker_is_open().await {
                healthy_providers += 1;
            }
        }
        let recent_failures_5min = self.recent_failures.write().await.count_recent();

        HealthStatus {
            healthy: healthy_providers > 0,
            healthy_providers,
            total_providers: self.registry.all().len(),
            recent_failures_5min,
        }
    }
}

/// Typed, `serde`-deserializable configuration surface (§6, expansion):
/// the orchestrator-level toggles that select between the `{SqlBacked,
/// InMemory, Null}` sink/quota/cache variants, plus a registry ordering
/// override. Loading this from a file or environment is the embedding
/// application's job (Non-goal); this crate supplies the type and its
/// defaults only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub enable_quota_management: bool,
    pub enable_audit_logging: bool,
    pub enable_caching: bool,
    pub enable_metrics_collection: bool,
    /// `AI.Orchestration.fallbackOrder`: an explicit provider-name ordering
    /// that overrides the registry's priority-based sort when present.
    pub fallback_order: Option<Vec<String>>,
    pub providers: HashMap<String, crate::contract::ProviderConfiguration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enable_quota_management: false,
            enable_audit_logging: true,
            enable_caching: true,
            enable_metrics_collection: true,
            fallback_order: None,
            providers: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ProviderCapabilities, RequestContext, RequestKind};
    use crate::sinks::InMemoryMetricsSink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A scripted adapter used to exercise the orchestrator's fallback walk
    /// without any network I/O, matching §8's end-to-end scenarios.
    struct ScriptedAdapter {
        name: &'static str,
        priority: i32,
        capabilities: ProviderCapabilities,
        calls: AtomicU32,
        outcome: fn() -> AdapterOutcome,
    }

    #[async_trait]
    impl crate::adapter::Adapter for ScriptedAdapter {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn capabilities(&self) -> &ProviderCapabilities {
            &self.capabilities
        }
        fn is_local(&self) -> bool {
            false
        }
        fn can_handle(&self, request: &Request) -> bool {
            self.capabilities.supports(request.kind)
        }
        async fn execute(&self, _request: &Request, _cancel: &CancellationToken) -> AdapterOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
        fn estimate_cost(&self, _input_tokens: u32, _output_tokens: u32) -> f64 {
            0.0
        }
    }

    fn text_request() -> Request {
        Request {
            kind: RequestKind::TextCompletion,
            prompt: "hi".to_string(),
            system_prompt: None,
            max_tokens: 32,
            temperature: 0.0,
            image_bytes: None,
            image_format: None,
            image_urls: Vec::new(),
            audio_bytes: None,
            audio_format: None,
            additional_parameters: Default::default(),
            context: RequestContext::new(),
        }
    }

    fn scripted(name: &'static str, priority: i32, outcome: fn() -> AdapterOutcome) -> Arc<ScriptedAdapter> {
        Arc::new(ScriptedAdapter {
            name,
            priority,
            capabilities: ProviderCapabilities::text_only(4096),
            calls: AtomicU32::new(0),
            outcome,
        })
    }

    fn orchestrator_with(adapters: Vec<Arc<ScriptedAdapter>>) -> Orchestrator {
        let mut registry = ProviderRegistry::new();
        for adapter in adapters {
            registry.register(adapter as Arc<dyn crate::adapter::Adapter>);
        }
        Orchestrator::new(registry, Arc::new(InMemoryMetricsSink::new()))
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_without_invoking_any_adapter() {
        let a = scripted("a", 1, || AdapterOutcome::Success(Response::success("a", "m", "ok")));
        let orchestrator = orchestrator_with(vec![a.clone()]);
        let mut request = text_request();
        request.prompt = "   ".to_string();
        let response = orchestrator.get_completion(&request, &CancellationToken::new()).await;
        assert!(!response.is_success);
        assert_eq!(response.error_code, Some(ErrorCode::InvalidRequest));
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_eligible_provider_returns_unknown_error() {
        let orchestrator = orchestrator_with(vec![]);
        let response = orchestrator.get_completion(&text_request(), &CancellationToken::new()).await;
        assert!(!response.is_success);
        assert_eq!(response.error_code, Some(ErrorCode::UnknownError));
    }

    // Scenario 1: single success.
    #[tokio::test]
    async fn scenario_single_success() {
        let a = scripted("A", 1, || AdapterOutcome::Success(Response::success("A", "m", "ok").with_tokens_used(5)));
        let orchestrator = orchestrator_with(vec![a]);
        let response = orchestrator.get_completion(&text_request(), &CancellationToken::new()).await;
        assert!(response.is_success);
        assert_eq!(response.provider, "A");
        assert!(response.tokens_used > 0);
    }

    // Scenario 2: fallback on quota exhaustion.
    #[tokio::test]
    async fn scenario_fallback_on_quota() {
        let a = scripted("A", 1, || AdapterOutcome::RetryElsewhere(Response::failure("A", ErrorCode::QuotaExceeded, "quota exceeded")));
        let b = scripted("B", 2, || AdapterOutcome::Success(Response::success("B", "m", "ok").with_tokens_used(3)));
        let orchestrator = orchestrator_with(vec![a, b]);
        let response = orchestrator.get_completion(&text_request(), &CancellationToken::new()).await;
        assert!(response.is_success);
        assert_eq!(response.provider, "B");
        let failures = response.metadata.get("failures").cloned().unwrap();
        let failures: Vec<AdapterFailure> = serde_json::from_value(failures).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].provider, "A");
        assert_eq!(failures[0].error_code, ErrorCode::QuotaExceeded);
    }

    // Scenario 3: all candidates fail.
    #[tokio::test]
    async fn scenario_all_fail() {
        let a = scripted("A", 1, || AdapterOutcome::RetryElsewhere(Response::failure("A", ErrorCode::HttpStatus(500), "down")));
        let b = scripted("B", 2, || AdapterOutcome::RetryElsewhere(Response::failure("B", ErrorCode::HttpStatus(500), "down")));
        let orchestrator = orchestrator_with(vec![a, b]);
        let response = orchestrator.get_completion(&text_request(), &CancellationToken::new()).await;
        assert!(!response.is_success);
        assert_eq!(response.error_code, Some(ErrorCode::HttpStatus(500)));
        let failures = response.metadata.get("failures").cloned().unwrap();
        let failures: Vec<AdapterFailure> = serde_json::from_value(failures).unwrap();
        assert_eq!(failures.len(), 2);
    }

    // Scenario 6: cancellation short-circuits the walk.
    #[tokio::test]
    async fn scenario_cancellation_stops_the_walk() {
        let a = scripted("A", 1, || AdapterOutcome::Terminal(Response::failure("A", ErrorCode::Cancelled, "cancelled")));
        let b = scripted("B", 2, || AdapterOutcome::Success(Response::success("B", "m", "ok")));
        let orchestrator = orchestrator_with(vec![a.clone(), b.clone()]);
        let response = orchestrator.get_completion(&text_request(), &CancellationToken::new()).await;
        assert_eq!(response.error_code, Some(ErrorCode::Cancelled));
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    // §4.8 step 4c: a `Terminal` outcome carrying an unconditionally
    // fallback-eligible code (e.g. an adapter misclassifying a 503) still
    // falls back rather than stopping the walk.
    #[tokio::test]
    async fn terminal_outcome_with_unconditionally_eligible_code_still_falls_back() {
        let a = scripted("A", 1, || AdapterOutcome::Terminal(Response::failure("A", ErrorCode::HttpStatus(503), "down")));
        let b = scripted("B", 2, || AdapterOutcome::Success(Response::success("B", "m", "ok")));
        let orchestrator = orchestrator_with(vec![a, b.clone()]);
        let response = orchestrator.get_completion(&text_request(), &CancellationToken::new()).await;
        assert!(response.is_success);
        assert_eq!(response.provider, "B");
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminal_non_cancel_error_stops_the_walk_without_trying_next_candidate() {
        let a = scripted("A", 1, || AdapterOutcome::Terminal(Response::failure("A", ErrorCode::InvalidRequest, "bad request")));
        let b = scripted("B", 2, || AdapterOutcome::Success(Response::success("B", "m", "ok")));
        let orchestrator = orchestrator_with(vec![a, b.clone()]);
        let response = orchestrator.get_completion(&text_request(), &CancellationToken::new()).await;
        assert!(!response.is_success);
        assert_eq!(response.provider, "A");
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn health_check_reports_healthy_when_an_eligible_adapter_exists() {
        let a = scripted("A", 1, || AdapterOutcome::Success(Response::success("A", "m", "ok")));
        let orchestrator = orchestrator_with(vec![a]);
        let status = orchestrator.health_check().await;
        assert!(status.healthy);
        assert_eq!(status.healthy_providers, 1);
        assert_eq!(status.total_providers, 1);
    }

    #[tokio::test]
    async fn health_check_counts_recent_failures() {
        let a = scripted("A", 1, || AdapterOutcome::RetryElsewhere(Response::failure("A", ErrorCode::HttpStatus(500), "down")));
        let orchestrator = orchestrator_with(vec![a]);
        let _ = orchestrator.get_completion(&text_request(), &CancellationToken::new()).await;
        let status = orchestrator.health_check().await;
        assert_eq!(status.recent_failures_5min, 1);
    }
}
