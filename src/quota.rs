//! Quota Manager (C5): cross-cutting request/token/cost budget enforcement
//! and post-hoc usage recording (§4.5).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::contract::QuotaCheckResult;

/// One rolling window's configured limits. `None` means unlimited on that
/// dimension.
#[derive(Debug, Clone, Default)]
pub struct QuotaLimits {
    pub daily_requests: Option<u64>,
    pub daily_tokens: Option<u64>,
    pub daily_cost: Option<f64>,
    pub monthly_requests: Option<u64>,
    pub monthly_tokens: Option<u64>,
    pub monthly_cost: Option<f64>,
}

/// Cross-cutting quota enforcement, implemented by `{SqlBacked, InMemory,
/// Null}` (§4.5). `SqlBacked` persistence is an embedding-application
/// concern (Non-goal); this trait is the integration seam for it.
#[async_trait]
pub trait QuotaManager: Send + Sync {
    async fn check_quota(&self, provider: &str, user_id: Option<&str>, est_tokens: u32, est_cost: f64) -> QuotaCheckResult;

    /// `success=false` still counts the request attempt but must not debit
    /// token/cost counters (§8 round-trip property).
    async fn record_usage(&self, provider: &str, user_id: Option<&str>, tokens_used: u32, cost_used: f64, success: bool);
}

/// Always admits and records nothing. The contract the rest of the core
/// relies on when quota enforcement is disabled.
pub struct NullQuotaManager;

#[async_trait]
impl QuotaManager for NullQuotaManager {
    async fn check_quota(&self, _provider: &str, _user_id: Option<&str>, _est_tokens: u32, _est_cost: f64) -> QuotaCheckResult {
        QuotaCheckResult::allowed()
    }

    async fn record_usage(&self, _provider: &str, _user_id: Option<&str>, _tokens_used: u32, _cost_used: f64, _success: bool) {}
}

#[derive(Debug, Clone, Default)]
struct Counters {
    requests: u64,
    tokens: u64,
    cost: f64,
    window_started: Option<DateTime<Utc>>,
}

impl Counters {
    fn rolled_over(&self, window: Duration) -> bool {
        match self.window_started {
            None => false,
            Some(start) => Utc::now() - start > chrono::Duration::from_std(window).unwrap_or_default(),
        }
    }
}

/// Reference in-process implementation: per-provider, and per-(provider,
/// user) when a `userId` is present, daily and monthly rolling counters.
pub struct InMemoryQuotaManager {
    limits: HashMap<String, QuotaLimits>,
    daily: RwLock<HashMap<String, Counters>>,
    monthly: RwLock<HashMap<String, Counters>>,
}

impl InMemoryQuotaManager {
    pub fn new(limits: HashMap<String, QuotaLimits>) -> Self {
        Self {
            limits,
            daily: RwLock::new(HashMap::new()),
            monthly: RwLock::new(HashMap::new()),
        }
    }

    fn key(provider: &str, user_id: Option<&str>) -> String {
        match user_id {
            Some(user) => format!("{provider}:{user}"),
            None => provider.to_string(),
        }
    }
}

const DAY: Duration = Duration::from_secs(86_400);
const MONTH: Duration = Duration::from_secs(30 * 86_400);

#[async_trait]
impl QuotaManager for InMemoryQuotaManager {
    async fn check_quota(&self, provider: &str, user_id: Option<&str>, est_tokens: u32, est_cost: f64) -> QuotaCheckResult {
        let Some(limits) = self.limits.get(provider) else {
            return QuotaCheckResult::allowed();
        };
        let key = Self::key(provider, user_id);

        let daily = self.daily.read().await;
        let monthly = self.monthly.read().await;
        let daily_counter = daily.get(&key).cloned().unwrap_or_default();
        let monthly_counter = monthly.get(&key).cloned().unwrap_or_default();
        drop(daily);
        drop(monthly);

        let would_exceed = |consumed: u64, add: u64, limit: Option<u64>| limit.is_some_and(|l| consumed + add > l);
        let would_exceed_cost = |consumed: f64, add: f64, limit: Option<f64>| limit.is_some_and(|l| consumed + add > l);

        if would_exceed(daily_counter.requests, 1, limits.daily_requests)
            || would_exceed(daily_counter.tokens, est_tokens as u64, limits.daily_tokens)
            || would_exceed_cost(daily_counter.cost, est_cost, limits.daily_cost)
            || would_exceed(monthly_counter.requests, 1, limits.monthly_requests)
            || would_exceed(monthly_counter.tokens, est_tokens as u64, limits.monthly_tokens)
            || would_exceed_cost(monthly_counter.cost, est_cost, limits.monthly_cost)
        {
            return QuotaCheckResult::denied(DAY);
        }

        QuotaCheckResult::allowed()
    }

    async fn record_usage(&self, provider: &str, user_id: Option<&str>, tokens_used: u32, cost_used: f64, success: bool) {
        let key = Self::key(provider, user_id);

        for (store, window) in [(&self.daily, DAY), (&self.monthly, MONTH)] {
            let mut store = store.write().await;
            let counter = store.entry(key.clone()).or_default();
            if counter.window_started.is_none() || counter.rolled_over(window) {
                *counter = Counters { window_started: Some(Utc::now()), ..Default::default() };
            }
            counter.requests += 1;
            if success {
                counter.tokens += tokens_used as u64;
                counter.cost += cost_used;
            }
        }
    }
}
