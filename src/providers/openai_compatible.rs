//! OpenAI-compatible chat-completions JSON adapter: the wire shape shared by
//! OpenAI itself and the many OpenAI-compatible gateways (Groq, OpenRouter,
//! and countless self-hosted `/v1/chat/completions` servers) in the teacher
//! corpus. One worked example of a remote, Bearer-authenticated codec.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::adapter::{BaseAdapterDeps, WireCodec, WireResponse};
use crate::contract::{ProviderCapabilities, ProviderConfiguration, Request};
use crate::error::AdapterError;
use crate::providers::build_adapter;

#[derive(Debug, Serialize)]
struct ChatCompletionPayload {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionError {
    error: ChatCompletionErrorBody,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionErrorBody {
    message: String,
}

/// Tier-based per-million-token pricing, in the style of the teacher's
/// per-provider cost tables. `(input_per_million, output_per_million)`.
#[derive(Debug, Clone, Copy)]
pub struct TokenPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for TokenPricing {
    fn default() -> Self {
        Self { input_per_million: 0.50, output_per_million: 1.50 }
    }
}

pub struct OpenAiCompatibleCodec {
    pricing: TokenPricing,
}

impl OpenAiCompatibleCodec {
    pub fn new(pricing: TokenPricing) -> Self {
        Self { pricing }
    }
}

#[async_trait]
impl WireCodec for OpenAiCompatibleCodec {
    async fn send(
        &self,
        client: &reqwest::Client,
        config: &ProviderConfiguration,
        api_key: &str,
        request: &Request,
    ) -> Result<WireResponse, AdapterError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage { role: "system", content: system.clone() });
        }
        messages.push(ChatMessage { role: "user", content: request.prompt.clone() });

        let payload = ChatCompletionPayload {
            model: config.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let http_response = client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = http_response.status();
        let body = http_response.text().await.map_err(AdapterError::from)?;

        if !status.is_success() {
            let message = serde_json::from_str::<ChatCompletionError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AdapterError::Http { status: status.as_u16(), message });
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::InvalidResponse("no choices in response".to_string()))?;

        Ok(WireResponse {
            content: choice.message.content,
            model: parsed.model.unwrap_or_else(|| config.model.clone()),
            tokens_used: parsed.usage.map(|u| u.completion_tokens).filter(|t| *t > 0),
        })
    }

    fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.pricing.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.pricing.output_per_million
    }
}

/// Builds a registry-ready adapter speaking the OpenAI-compatible protocol.
/// `base_url` must already include the API version path segment (e.g.
/// `https://api.groq.com/openai/v1`); `max_tokens_limit` reflects the
/// target model's context window.
pub fn build(
    config: ProviderConfiguration,
    priority: i32,
    max_tokens_limit: u32,
    pricing: TokenPricing,
    deps: BaseAdapterDeps,
) -> Arc<dyn crate::adapter::Adapter> {
    let capabilities = ProviderCapabilities::text_only(max_tokens_limit);
    build_adapter(config, capabilities, priority, false, deps, OpenAiCompatibleCodec::new(pricing))
}
