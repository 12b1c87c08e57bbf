//! Local Ollama-style adapter: no API key, no per-token billing, and
//! `is_local = true` so the registry sinks it below remote candidates unless
//! nothing else can handle the request (§4.7).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::adapter::{BaseAdapterDeps, WireCodec, WireResponse};
use crate::contract::{ProviderCapabilities, ProviderConfiguration, Request};
use crate::error::AdapterError;
use crate::providers::build_adapter;

#[derive(Debug, Serialize)]
struct OllamaChatPayload {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

pub struct OllamaCodec;

#[async_trait]
impl WireCodec for OllamaCodec {
    async fn send(
        &self,
        client: &reqwest::Client,
        config: &ProviderConfiguration,
        _api_key: &str,
        request: &Request,
    ) -> Result<WireResponse, AdapterError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(OllamaMessage { role: "system", content: system.clone() });
        }
        messages.push(OllamaMessage { role: "user", content: request.prompt.clone() });

        let payload = OllamaChatPayload {
            model: config.model.clone(),
            messages,
            stream: false,
            options: OllamaOptions { temperature: request.temperature },
        };

        let url = format!("{}/api/chat", config.base_url.trim_end_matches('/'));
        let http_response = client.post(&url).json(&payload).send().await?;

        let status = http_response.status();
        let body = http_response.text().await.map_err(AdapterError::from)?;
        if !status.is_success() {
            return Err(crate::providers::parse_error_status(status, body));
        }

        let parsed: OllamaChatResponse =
            serde_json::from_str(&body).map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

        Ok(WireResponse {
            content: parsed.message.content,
            model: config.model.clone(),
            tokens_used: Some(parsed.eval_count).filter(|t| *t > 0),
        })
    }

    fn estimate_cost(&self, _input_tokens: u32, _output_tokens: u32) -> f64 {
        // Self-hosted: no per-token billing.
        0.0
    }
}

/// Builds a registry-ready local adapter. `base_url` defaults to
/// `http://localhost:11434` when the caller leaves it empty.
pub fn build(mut config: ProviderConfiguration, priority: i32, max_tokens_limit: u32, deps: BaseAdapterDeps) -> Arc<dyn crate::adapter::Adapter> {
    if config.base_url.is_empty() {
        config.base_url = "http://localhost:11434".to_string();
    }
    let capabilities = ProviderCapabilities::text_only(max_tokens_limit);
    build_adapter(config, capabilities, priority, true, deps, OllamaCodec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_key::StaticApiKeyManager;
    use crate::cache::InMemoryResponseCache;
    use crate::contract::RequestContext;
    use crate::quota::NullQuotaManager;
    use crate::sinks::{NullAuditSink, NullMetricsSink};
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn deps() -> BaseAdapterDeps {
        BaseAdapterDeps {
            quota: Arc::new(NullQuotaManager),
            cache: Some(Arc::new(InMemoryResponseCache::new(16))),
            audit: Arc::new(NullAuditSink),
            metrics: Arc::new(NullMetricsSink),
            api_keys: Arc::new(StaticApiKeyManager::new(HashMap::new())),
        }
    }

    fn request() -> Request {
        Request {
            kind: crate::contract::RequestKind::TextCompletion,
            prompt: "hello".to_string(),
            system_prompt: None,
            max_tokens: 64,
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

    #[tokio::test]
    async fn is_local_and_free() {
        let mut config = ProviderConfiguration::new("ollama", "llama3", "");
        config.base_url = "http://localhost:11434".to_string();
        let adapter = build(config, 10, 4096, deps());
        assert!(adapter.is_local());
        assert_eq!(adapter.estimate_cost(1000, 1000), 0.0);
    }

    #[tokio::test]
    async fn executes_against_a_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "hi from ollama"},
                "eval_count": 9
            })))
            .mount(&server)
            .await;

        let mut config = ProviderConfiguration::new("ollama", "llama3", "");
        config.base_url = server.uri();
        let adapter = build(config, 10, 4096, deps());

        let response = adapter.execute(&request(), &CancellationToken::new()).await.into_response();
        assert!(response.is_success);
        assert_eq!(response.content, "hi from ollama");
        assert_eq!(response.tokens_used, 9);
        assert_eq!(response.estimated_cost, 0.0);
    }
}
