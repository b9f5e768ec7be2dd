use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};

use super::base::{ChunkStream, Provider};
use super::configs::{ImageDialect, OpenAiCompatibleConfig};
use super::utils::{messages_to_openai_spec, response_format_spec};
use crate::errors::{HttpStatusError, LlmError};
use crate::models::message::Message;

const DONE_SENTINEL: &str = "[DONE]";

/// Streaming transport for any server speaking the openai chat completions api
/// (LM Studio, vLLM, llama.cpp, OpenAI itself).
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, LlmError> {
        // No timeout: a long generation is not a failure
        let client = Client::builder().build().map_err(LlmError::request_failed)?;

        Ok(Self { client, config })
    }

    pub fn with_client(client: Client, config: OpenAiCompatibleConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &OpenAiCompatibleConfig {
        &self.config
    }

    fn build_payload(
        &self,
        messages: &[Message],
        tools: &[Value],
        response_format: Option<&Value>,
    ) -> Result<Value, LlmError> {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_openai_spec(messages)?,
            "stream": true,
            "tools": tools,
        });

        if let Some(body) = payload.as_object_mut() {
            if let Some(schema) = response_format {
                body.insert("response_format".to_string(), response_format_spec(schema));
            }
            if let Some(temperature) = self.config.temperature {
                body.insert("temperature".to_string(), json!(temperature));
            }
            if let Some(max_tokens) = self.config.max_tokens {
                body.insert("max_tokens".to_string(), json!(max_tokens));
            }
        }
        Ok(payload)
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(payload)
            .send()
            .await
            .map_err(LlmError::request_failed)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::request_failed(HttpStatusError {
                status: status.as_u16(),
                body,
            }));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    fn image_dialect(&self) -> ImageDialect {
        self.config.image_dialect
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[Value],
        response_format: Option<&Value>,
    ) -> Result<ChunkStream, LlmError> {
        let payload = self.build_payload(messages, tools, response_format)?;
        let response = self.post(&payload).await?;

        let mut events = Box::pin(response.bytes_stream().eventsource());
        let chunks = async_stream::stream! {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        let data = event.data.trim();
                        if data.is_empty() {
                            continue;
                        }
                        if data == DONE_SENTINEL {
                            break;
                        }
                        match serde_json::from_str::<Value>(data) {
                            Ok(chunk) => yield Ok(chunk),
                            Err(e) => tracing::debug!("Skipping undecodable chunk {:?}: {}", data, e),
                        }
                    }
                    Err(e) => {
                        yield Err(LlmError::request_failed(format!("Stream interrupted: {}", e)));
                        break;
                    }
                }
            }
        };

        Ok(chunks.boxed())
    }
}
