use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ChatRequest, ChatResponse, Message, VariantDraft};
use crate::config::{GenerationConfig, RequestConfig};
use crate::error::{GenerationError, GenerationResult};
use crate::prompts::SECTION_DRAFT_PROMPT;
use crate::storage::Component;

/// Client for the variant-drafting chat-completions API
#[derive(Clone)]
pub struct GenerationClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    request_config: RequestConfig,
}

impl GenerationClient {
    /// Create a new generation client.
    ///
    /// Fails with [`GenerationError::NotConfigured`] when no API key is set.
    pub fn new(config: &GenerationConfig, request_config: RequestConfig) -> GenerationResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(GenerationError::NotConfigured)?;

        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(GenerationError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            request_config,
        })
    }

    /// Draft challenger content for a component.
    ///
    /// The incumbent's markup and the component's generation parameters are
    /// given as context so the draft is a real alternative, not a rewrite
    /// from nothing.
    pub async fn draft_variant(
        &self,
        component: &Component,
        incumbent_html: &str,
    ) -> GenerationResult<VariantDraft> {
        let messages = self.build_messages(component, incumbent_html);
        let request = ChatRequest::new(&self.model, messages)
            .with_temperature(0.7)
            .with_max_tokens(2000);

        let response = self.call_with_retries(request).await?;

        let completion = response
            .completion()
            .ok_or_else(|| GenerationError::InvalidResponse {
                message: "completion has no content".to_string(),
            })?;

        Ok(VariantDraft::from_completion(completion))
    }

    /// Call the completions endpoint with bounded exponential backoff.
    async fn call_with_retries(&self, request: ChatRequest) -> GenerationResult<ChatResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying generation request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    info!(
                        model = %request.model,
                        latency_ms = start.elapsed().as_millis(),
                        "Generation request succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        model = %request.model,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Generation request failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(GenerationError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &ChatRequest,
    ) -> GenerationResult<ChatResponse> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling generation API"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    GenerationError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let chat_response: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| GenerationError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(chat_response)
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_messages(&self, component: &Component, incumbent_html: &str) -> Vec<Message> {
        let mut messages = vec![Message::system(SECTION_DRAFT_PROMPT)];

        let mut context = format!("Section type: {}\n", component.kind);
        if let Some(params) = &component.generation_params {
            context.push_str(&format!("Generation parameters: {}\n", params));
        }
        context.push_str(&format!(
            "Current production markup:\n{}\n\nDraft the challenger.",
            incumbent_html
        ));
        messages.push(Message::user(context));

        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = GenerationConfig {
            api_key: Some("test_key".to_string()),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
        };

        let client = GenerationClient::new(&config, RequestConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = GenerationConfig {
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
        };

        let client = GenerationClient::new(&config, RequestConfig::default());
        assert!(matches!(client, Err(GenerationError::NotConfigured)));
    }
}
