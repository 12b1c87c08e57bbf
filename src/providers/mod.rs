//! Worked provider adapters (§4.2.1, expansion).
//!
//! The per-provider wire protocol is explicitly outside this crate's
//! normative scope (§1 Non-goals): any concrete adapter is an opaque codec
//! behind [`crate::adapter::WireCodec`]. This module ships two worked
//! examples from the same wire-protocol families the teacher corpus already
//! spoke — an OpenAI-compatible chat-completions JSON adapter (the shape
//! `groq`/`openrouter`/`custom` all shared) and a local Ollama-style adapter
//! — enough to exercise every branch of the pipeline end-to-end (remote +
//! local, priority ordering, capability gating). Adding a twenty-first
//! provider means adding another `WireCodec` here; it never touches C3-C10.

#[cfg(feature = "openai-compatible")]
pub mod openai_compatible;

#[cfg(feature = "ollama")]
pub mod ollama;

use std::sync::Arc;

use crate::adapter::{Adapter, AdapterOutcome, BaseAdapter, BaseAdapterDeps, WireCodec};
use crate::contract::{ProviderCapabilities, ProviderConfiguration, Request};
use crate::error::AdapterError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Glues a [`BaseAdapter`] (the shared pipeline runner) to a concrete
/// [`WireCodec`] (the provider-specific payload builder/parser), producing a
/// full [`Adapter`] the registry can hold. This is the composition the
/// specification calls for in place of a deep adapter inheritance hierarchy
/// (§9): every concrete provider is `CodecAdapter::new(base, codec)`, never a
/// subclass.
pub struct CodecAdapter<C: WireCodec> {
    base: BaseAdapter,
    codec: C,
}

impl<C: WireCodec> CodecAdapter<C> {
    pub fn new(base: BaseAdapter, codec: C) -> Self {
        Self { base, codec }
    }
}

#[async_trait]
impl<C: WireCodec + 'static> Adapter for CodecAdapter<C> {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn priority(&self) -> i32 {
        self.base.priority
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.base.capabilities
    }

    fn is_local(&self) -> bool {
        self.base.is_local
    }

    fn can_handle(&self, request: &Request) -> bool {
        if !self.base.config.is_enabled {
            return false;
        }
        if !self.base.capabilities.supports(request.kind) {
            return false;
        }
        if let Some(fmt) = request.image_format.as_deref() {
            if !self.base.capabilities.supported_image_formats.is_empty()
                && !self.base.capabilities.supported_image_formats.iter().any(|f| f.eq_ignore_ascii_case(fmt))
            {
                return false;
            }
        }
        if let Some(fmt) = request.audio_format.as_deref() {
            if !self.base.capabilities.supported_audio_formats.is_empty()
                && !self.base.capabilities.supported_audio_formats.iter().any(|f| f.eq_ignore_ascii_case(fmt))
            {
                return false;
            }
        }
        self.base.capabilities.supports_language(&request.context.language)
    }

    async fn execute(&self, request: &Request, cancel: &CancellationToken) -> AdapterOutcome {
        self.base.run_pipeline(request, cancel, &self.codec).await
    }

    fn should_fallback(&self, error: &AdapterError) -> bool {
        error.default_should_fallback()
    }

    fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        self.codec.estimate_cost(input_tokens, output_tokens)
    }

    async fn circuit_breaker_is_open(&self) -> bool {
        self.base.circuit_breaker_is_open().await
    }
}

/// Helper constructing a registered, ready-to-use adapter from a
/// configuration, capability set, priority, locality flag, and codec. Every
/// concrete provider constructor in this module is a thin wrapper around
/// this function plus its own [`WireCodec`].
pub fn build_adapter<C: WireCodec + 'static>(
    config: ProviderConfiguration,
    capabilities: ProviderCapabilities,
    priority: i32,
    is_local: bool,
    deps: BaseAdapterDeps,
    codec: C,
) -> Arc<dyn Adapter> {
    let base = BaseAdapter::new(config, capabilities, priority, is_local, deps);
    Arc::new(CodecAdapter::new(base, codec))
}

/// A codec that always returns a fixed response, independent of the wire.
/// Used by integration tests that want the real [`BaseAdapter`] pipeline
/// (quota, cache, rate limit, resilience bookkeeping) without real network
/// I/O.
pub struct EchoCodec {
    pub model: String,
}

#[async_trait]
impl WireCodec for EchoCodec {
    async fn send(
        &self,
        _client: &reqwest::Client,
        _config: &ProviderConfiguration,
        _api_key: &str,
        request: &Request,
    ) -> Result<crate::adapter::WireResponse, AdapterError> {
        Ok(crate::adapter::WireResponse {
            content: format!("echo: {}", request.prompt),
            model: self.model.clone(),
            tokens_used: None,
        })
    }

    fn estimate_cost(&self, _input_tokens: u32, _output_tokens: u32) -> f64 {
        0.0
    }
}

pub(crate) fn parse_error_status(status: reqwest::StatusCode, body: String) -> AdapterError {
    AdapterError::Http { status: status.as_u16(), message: body }
}
