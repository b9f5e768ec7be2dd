use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::configs::LmStudioControlConfig;
use crate::errors::LlmError;

/// Control plane of a local model server. Every operation is optional for the core request
/// flow; backends that lack one return [`LlmError::Unsupported`].
#[async_trait]
pub trait ModelControl: Send + Sync {
    /// Identifiers of the models currently loaded
    async fn list_loaded(&self) -> Result<Vec<String>, LlmError>;

    async fn unload(&self, model: &str) -> Result<(), LlmError>;

    /// Number of tokens `text` encodes to with the tokenizer of `model`
    async fn count_tokens(&self, model: &str, text: &str) -> Result<usize, LlmError>;

    /// Context window of `model`, in tokens
    async fn context_length(&self, model: &str) -> Result<u64, LlmError>;
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    id: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    max_context_length: Option<u64>,
}

impl ModelInfo {
    fn is_loaded(&self) -> bool {
        self.state.as_deref() == Some("loaded")
    }
}

/// [`ModelControl`] over the LM Studio REST api.
pub struct LmStudioControl {
    client: Client,
    config: LmStudioControlConfig,
}

impl LmStudioControl {
    pub fn new(config: LmStudioControlConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::Backend(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.host.trim_end_matches('/'), path)
    }

    async fn models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let response = self
            .client
            .get(self.url("/api/v0/models"))
            .send()
            .await
            .map_err(|e| LlmError::Backend(format!("Could not list models: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Backend(format!(
                "Could not list models: HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| LlmError::Backend(format!("Unexpected model list: {}", e)))?;
        Ok(list.data)
    }
}

#[async_trait]
impl ModelControl for LmStudioControl {
    async fn list_loaded(&self) -> Result<Vec<String>, LlmError> {
        Ok(self
            .models()
            .await?
            .into_iter()
            .filter(ModelInfo::is_loaded)
            .map(|model| model.id)
            .collect())
    }

    async fn unload(&self, model: &str) -> Result<(), LlmError> {
        let response = self
            .client
            .post(self.url("/api/v1/models/unload"))
            .json(&json!({ "instance_id": model }))
            .send()
            .await
            .map_err(|e| LlmError::Backend(format!("Could not unload {}: {}", model, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Backend(format!(
                "Could not unload {}: HTTP {}: {}",
                model,
                status.as_u16(),
                body
            )));
        }
        Ok(())
    }

    async fn count_tokens(&self, _model: &str, _text: &str) -> Result<usize, LlmError> {
        Err(LlmError::Unsupported(
            "the LM Studio REST api has no tokenize endpoint".to_string(),
        ))
    }

    async fn context_length(&self, model: &str) -> Result<u64, LlmError> {
        let info = self
            .models()
            .await?
            .into_iter()
            .find(|info| info.id == model)
            .ok_or_else(|| LlmError::Backend(format!("Unknown model: {}", model)))?;

        info.max_context_length
            .ok_or_else(|| LlmError::Backend(format!("No context length reported for {}", model)))
    }
}
