use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use super::configs::ImageDialect;
use crate::errors::LlmError;
use crate::models::message::Message;

/// Raw chunk payloads as decoded from the server, in arrival order.
///
/// An `Err` item is a transport failure after the stream was opened.
pub type ChunkStream = BoxStream<'static, Result<Value, LlmError>>;

/// Base trait for chat-completion transports
#[async_trait]
pub trait Provider: Send + Sync {
    /// The model requests are sent to
    fn model(&self) -> &str;

    /// How image blocks must look before they are sent to this transport
    fn image_dialect(&self) -> ImageDialect {
        ImageDialect::Embed
    }

    /// Open a streaming completion.
    ///
    /// `messages` are already normalized and `tools` are wire schemas. Errors returned
    /// here mean no stream was opened at all.
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[Value],
        response_format: Option<&Value>,
    ) -> Result<ChunkStream, LlmError>;
}
