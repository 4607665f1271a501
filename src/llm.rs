//! Chat-completion provider abstraction and the Anthropic implementation.
//!
//! The answering pipeline issues three kinds of completions (standalone
//! rewrite, relevance judgment, grounded answer) through the same
//! [`ChatModel`] handle, constructed once at process start. Calls are
//! fallible remote calls; transient failures retry with the same backoff
//! policy as the embedding client, and exhausted retries propagate — no
//! fallback answer is fabricated locally.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::PipelineError;

/// The chat-completion collaborator contract.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Complete a single-turn prompt and return the response text.
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError>;
}

/// Provider calling the Anthropic Messages API.
/// Requires the `ANTHROPIC_API_KEY` environment variable.
pub struct AnthropicChat {
    model: String,
    api_key: String,
    client: reqwest::Client,
    max_tokens: u32,
    temperature: f64,
    max_retries: u32,
}

impl AnthropicChat {
    pub fn new(config: &ChatConfig) -> Result<Self, PipelineError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            PipelineError::Configuration("ANTHROPIC_API_KEY environment variable not set".into())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            client,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChatModel for AnthropicChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, ?delay, "retrying completion call");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.anthropic.com/v1/messages")
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| PipelineError::ModelCall(e.to_string()))?;
                        return parse_messages_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(PipelineError::ModelCall(format!(
                            "Anthropic API error {status}: {body_text}"
                        )));
                        continue;
                    }

                    return Err(PipelineError::ModelCall(format!(
                        "Anthropic API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(PipelineError::ModelCall(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| PipelineError::ModelCall("completion failed after retries".into())))
    }
}

/// Concatenate the text blocks of a Messages API response.
fn parse_messages_response(json: &serde_json::Value) -> Result<String, PipelineError> {
    let content = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| PipelineError::ModelCall("invalid response: missing content".into()))?;

    let text: String = content
        .iter()
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        return Err(PipelineError::ModelCall(
            "invalid response: no text blocks".into(),
        ));
    }
    Ok(text)
}

/// Build the configured chat provider.
pub fn create_chat(config: &ChatConfig) -> Result<Arc<dyn ChatModel>, PipelineError> {
    Ok(Arc::new(AnthropicChat::new(config)?))
}
