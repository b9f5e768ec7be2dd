use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "http://localhost:1234/v1";
pub const DEFAULT_API_KEY: &str = "lm-studio";
pub const DEFAULT_CONTROL_HOST: &str = "http://localhost:1234";

/// How a server expects image blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDialect {
    /// Every image is sent inline as a base64 data uri (vLLM and friends)
    #[default]
    Embed,
    /// Paths and urls are forwarded for the server to resolve; only in-memory images are
    /// embedded
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiCompatibleConfig {
    /// Base url including the api version, e.g. `http://localhost:1234/v1`
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub image_dialect: ImageDialect,
}

impl OpenAiCompatibleConfig {
    pub fn new<S: Into<String>>(model: S) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
            image_dialect: ImageDialect::default(),
        }
    }

    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_image_dialect(mut self, image_dialect: ImageDialect) -> Self {
        self.image_dialect = image_dialect;
        self
    }
}

/// Where the LM Studio REST api lives. This is the server root, without `/v1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LmStudioControlConfig {
    pub host: String,
}

impl Default for LmStudioControlConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CONTROL_HOST.to_string(),
        }
    }
}
