use crate::error::{to_env_var, ConfigError, ENV_PREFIX};
use config::{Config, Environment};
use lmstream::providers::configs::{
    ImageDialect, LmStudioControlConfig, OpenAiCompatibleConfig, DEFAULT_API_KEY,
    DEFAULT_CONTROL_HOST, DEFAULT_HOST,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_key")]
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub image_dialect: ImageDialect,
}

impl ProviderSettings {
    pub fn into_config(self) -> OpenAiCompatibleConfig {
        OpenAiCompatibleConfig {
            host: self.host,
            api_key: self.api_key,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            image_dialect: self.image_dialect,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ControlSettings {
    #[serde(default = "default_control_host")]
    pub host: String,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            host: default_control_host(),
        }
    }
}

impl ControlSettings {
    pub fn into_config(self) -> LmStudioControlConfig {
        LmStudioControlConfig { host: self.host }
    }
}

/// Values given on the command line; they win over the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub model: Option<String>,
    pub host: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub control: ControlSettings,
}

impl Settings {
    pub fn new(overrides: &Overrides) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("provider.host", default_host())?
            .set_default("provider.api_key", default_api_key())?
            .set_default("control.host", default_control_host())?
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("provider.model", overrides.model.clone())?
            .set_override_option("provider.host", overrides.host.clone())?
            .set_override_option("provider.api_key", overrides.api_key.clone())?
            .build()?;

        config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            match missing_field(&err) {
                // Only provider settings are required
                Some(field) => ConfigError::MissingEnvVar {
                    env_var: to_env_var(&format!("provider.{}", field)),
                },
                None => ConfigError::Other(err),
            }
        })
    }
}

/// Name of the field in a "missing field `name`" deserialization error
fn missing_field(err: &config::ConfigError) -> Option<String> {
    if let config::ConfigError::NotFound(path) = err {
        return path.rsplit('.').next().map(String::from);
    }
    let message = err.to_string();
    let rest = message.strip_prefix("missing field `")?;
    rest.split('`').next().map(String::from)
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_api_key() -> String {
    DEFAULT_API_KEY.to_string()
}

fn default_control_host() -> String {
    DEFAULT_CONTROL_HOST.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("LMSTREAM_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("LMSTREAM_PROVIDER__MODEL", "qwen3-8b");

        let settings = Settings::new(&Overrides::default()).unwrap();
        assert_eq!(settings.provider.host, "http://localhost:1234/v1");
        assert_eq!(settings.provider.api_key, "lm-studio");
        assert_eq!(settings.provider.model, "qwen3-8b");
        assert_eq!(settings.provider.temperature, None);
        assert_eq!(settings.provider.max_tokens, None);
        assert_eq!(settings.provider.image_dialect, ImageDialect::Embed);
        assert_eq!(settings.control.host, "http://localhost:1234");

        clean_env();
    }

    #[test]
    #[serial]
    fn test_environment_settings() {
        clean_env();
        env::set_var("LMSTREAM_PROVIDER__MODEL", "llava-1.6");
        env::set_var("LMSTREAM_PROVIDER__HOST", "http://gpu-box:8000/v1");
        env::set_var("LMSTREAM_PROVIDER__TEMPERATURE", "0.7");
        env::set_var("LMSTREAM_PROVIDER__MAX_TOKENS", "2000");
        env::set_var("LMSTREAM_PROVIDER__IMAGE_DIALECT", "passthrough");
        env::set_var("LMSTREAM_CONTROL__HOST", "http://gpu-box:1234");

        let settings = Settings::new(&Overrides::default()).unwrap();
        let control = settings.control.into_config();
        let config = settings.provider.into_config();
        assert_eq!(config.host, "http://gpu-box:8000/v1");
        assert_eq!(config.model, "llava-1.6");
        assert_eq!(config.temperature, Some(0.7));
        assert_eq!(config.max_tokens, Some(2000));
        assert_eq!(config.image_dialect, ImageDialect::Passthrough);
        assert_eq!(control.host, "http://gpu-box:1234");

        clean_env();
    }

    #[test]
    #[serial]
    fn test_overrides_win() {
        clean_env();
        env::set_var("LMSTREAM_PROVIDER__MODEL", "qwen3-8b");
        env::set_var("LMSTREAM_PROVIDER__API_KEY", "from-env");

        let overrides = Overrides {
            model: Some("gemma-3-4b".to_string()),
            api_key: Some("from-flag".to_string()),
            host: None,
        };
        let settings = Settings::new(&overrides).unwrap();
        assert_eq!(settings.provider.model, "gemma-3-4b");
        assert_eq!(settings.provider.api_key, "from-flag");
        assert_eq!(settings.provider.host, "http://localhost:1234/v1");

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_model() {
        clean_env();

        match Settings::new(&Overrides::default()) {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert_eq!(env_var, "LMSTREAM_PROVIDER__MODEL")
            }
            other => panic!("Expected MissingEnvVar, got {:?}", other),
        }
    }
}
