//! Audit log and metrics sinks (C9, §4.9): observability hook-points every
//! adapter call feeds, independent of whether anything downstream consumes
//! them.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contract::{ErrorCode, RequestKind};

/// One completed adapter call, independent of success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub provider: String,
    pub model: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub kind: RequestKind,
    /// Fingerprint of the prompt, never the prompt itself (§4.9 privacy note).
    pub prompt_hash: String,
    pub prompt_length: usize,
    pub response_length: usize,
    pub tokens_used: u32,
    pub duration_ms: u64,
    pub estimated_cost: f64,
    pub success: bool,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub request_metadata: HashMap<String, Value>,
    pub response_metadata: HashMap<String, Value>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_request(&self, entry: AuditLogEntry);
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_success(&self, provider: &str, tokens_used: u32, duration: Duration);
    async fn record_failure(&self, provider: &str, error_code: ErrorCode);
    async fn record_cache_hit(&self, provider: &str);
}

pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn log_request(&self, _entry: AuditLogEntry) {}
}

pub struct NullMetricsSink;

#[async_trait]
impl MetricsSink for NullMetricsSink {
    async fn record_success(&self, _provider: &str, _tokens_used: u32, _duration: Duration) {}
    async fn record_failure(&self, _provider: &str, _error_code: ErrorCode) {}
    async fn record_cache_hit(&self, _provider: &str) {}
}

/// Bounded ring buffer of the most recent entries. Reference implementation
/// for tests and small deployments; a production embedder swaps this for a
/// sink that ships to its own observability stack.
pub struct InMemoryAuditSink {
    capacity: usize,
    entries: Mutex<VecDeque<AuditLogEntry>>,
}

impl InMemoryAuditSink {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: Mutex::new(VecDeque::new()) }
    }

    pub fn recent(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn log_request(&self, entry: AuditLogEntry) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderMetricsSnapshot {
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub tokens_used: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

pub struct InMemoryMetricsSink {
    by_provider: Mutex<HashMap<String, ProviderMetricsSnapshot>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self { by_provider: Mutex::new(HashMap::new()) }
    }

    pub fn snapshot(&self, provider: &str) -> ProviderMetricsSnapshot {
        self.by_provider.lock().unwrap().get(provider).cloned().unwrap_or_default()
    }
}

impl Default for InMemoryMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn record_success(&self, provider: &str, tokens_used: u32, _duration: Duration) {
        let mut by_provider = self.by_provider.lock().unwrap();
        let entry = by_provider.entry(provider.to_string()).or_default();
        entry.successes += 1;
        entry.tokens_used += tokens_used as u64;
        entry.last_updated = Some(Utc::now());
    }

    async fn record_failure(&self, provider: &str, _error_code: ErrorCode) {
        let mut by_provider = self.by_provider.lock().unwrap();
        let entry = by_provider.entry(provider.to_string()).or_default();
        entry.failures += 1;
        entry.last_updated = Some(Utc::now());
    }

    async fn record_cache_hit(&self, provider: &str) {
        let mut by_provider = self.by_provider.lock().unwrap();
        let entry = by_provider.entry(provider.to_string()).or_default();
        entry.cache_hits += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(success: bool) -> AuditLogEntry {
        AuditLogEntry {
            timestamp: Utc::now(),
            request_id: "r1".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            user_id: None,
            session_id: None,
            kind: RequestKind::TextCompletion,
            prompt_hash: "abc".to_string(),
            prompt_length: 5,
            response_length: 10,
            tokens_used: 12,
            duration_ms: 42,
            estimated_cost: 0.001,
            success,
            error_code: None,
            error_message: None,
            request_metadata: HashMap::new(),
            response_metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn ring_buffer_drops_oldest_past_capacity() {
        let sink = InMemoryAuditSink::new(2);
        sink.log_request(entry(true)).await;
        sink.log_request(entry(true)).await;
        sink.log_request(entry(false)).await;
        let recent = sink.recent();
        assert_eq!(recent.len(), 2);
        assert!(!recent[1].success);
    }

    #[tokio::test]
    async fn metrics_sink_tracks_per_provider_counters() {
        let metrics = InMemoryMetricsSink::new();
        metrics.record_success("openai", 10, Duration::from_millis(5)).await;
        metrics.record_success("openai", 5, Duration::from_millis(5)).await;
        metrics.record_failure("openai", ErrorCode::Timeout).await;
        let snapshot = metrics.snapshot("openai");
        assert_eq!(snapshot.successes, 2);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.tokens_used, 15);
    }
}
