use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::{Arc, Mutex};

use super::base::{ChunkStream, Provider};
use super::configs::ImageDialect;
use crate::errors::{HttpStatusError, LlmError};
use crate::models::message::Message;

/// What the mock received for one request
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<Value>,
    pub response_format: Option<Value>,
}

/// A mock provider that replays pre-configured chunks for testing
pub struct MockProvider {
    chunks: Vec<Result<Value, String>>,
    status: Option<u16>,
    image_dialect: ImageDialect,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockProvider {
    /// Create a new mock provider that streams `chunks` for every request
    pub fn new(chunks: Vec<Value>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Ok).collect(),
            status: None,
            image_dialect: ImageDialect::Embed,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail the stream with a transport error after the configured chunks
    pub fn with_interruption<S: Into<String>>(mut self, message: S) -> Self {
        self.chunks.push(Err(message.into()));
        self
    }

    /// Refuse every request with the given status, before any stream is opened
    pub fn failing(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_image_dialect(mut self, image_dialect: ImageDialect) -> Self {
        self.image_dialect = image_dialect;
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn model(&self) -> &str {
        "mock-model"
    }

    fn image_dialect(&self) -> ImageDialect {
        self.image_dialect
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[Value],
        response_format: Option<&Value>,
    ) -> Result<ChunkStream, LlmError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            response_format: response_format.cloned(),
        });

        if let Some(status) = self.status {
            return Err(LlmError::request_failed(HttpStatusError {
                status,
                body: "mock failure".to_string(),
            }));
        }

        let chunks: Vec<Result<Value, LlmError>> = self
            .chunks
            .iter()
            .cloned()
            .map(|chunk| chunk.map_err(LlmError::request_failed))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}
