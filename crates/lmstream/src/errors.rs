use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Problems with the request itself, detected before anything is sent.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("At least one message is required")]
    MissingMessages,

    #[error("Tool '{tool}' has no description")]
    MissingToolDescription { tool: String },

    #[error("Tool '{tool}' declares parameter '{param}' with unsupported type '{type_name}'")]
    UnsupportedParameterType {
        tool: String,
        param: String,
        type_name: String,
    },

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Model backend error: {0}")]
    Backend(String),

    #[error("No model backend is configured")]
    BackendUnavailable,

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(String),
}

impl LlmError {
    pub fn request_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        LlmError::RequestFailed(error.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, LlmError::Configuration(_))
    }
}

/// Non-2xx answer from the chat endpoint; wrapped by [`LlmError::RequestFailed`].
#[derive(Error, Debug)]
#[error("HTTP {status}: {body}")]
pub struct HttpStatusError {
    pub status: u16,
    pub body: String,
}

/// Failure reported by a locally registered tool.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

pub type ToolResult<T> = Result<T, ToolError>;
