//! Provider Registry (C7): discovery, capability indexing, and priority
//! ordering over the installed adapters (§4.7).

use std::sync::Arc;

use crate::adapter::Adapter;
use crate::contract::Request;

/// Adapters registered at startup, in registration order. Registration order
/// is also this registry's tie-breaker when two adapters share a priority.
pub struct ProviderRegistry {
    adapters: Vec<Arc<dyn Adapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { adapters: Vec::new() }
    }

    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.push(adapter);
    }

    pub fn all(&self) -> &[Arc<dyn Adapter>] {
        &self.adapters
    }

    /// Adapters for which `can_handle(request)` holds, ordered by priority
    /// ascending (lower first, ties broken by registration order), with
    /// local adapters sunk below non-local ones when the request carries no
    /// locality preference — which none of them currently do, so this always
    /// applies.
    pub fn candidates(&self, request: &Request) -> Vec<Arc<dyn Adapter>> {
        let mut eligible: Vec<Arc<dyn Adapter>> = self
            .adapters
            .iter()
            .filter(|a| a.can_handle(request))
            .cloned()
            .collect();

        eligible.sort_by_key(|a| a.priority());
        let (non_local, local): (Vec<_>, Vec<_>) = eligible.into_iter().partition(|a| !a.is_local());
        non_local.into_iter().chain(local).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
