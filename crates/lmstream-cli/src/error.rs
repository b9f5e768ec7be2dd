use thiserror::Error;

pub const ENV_PREFIX: &str = "LMSTREAM";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting, set {env_var} or pass the matching flag")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Environment variable for a dotted settings path, e.g. `provider.model` is
/// `LMSTREAM_PROVIDER__MODEL`.
pub fn to_env_var(path: &str) -> String {
    let parts: Vec<String> = path.split('.').map(str::to_uppercase).collect();
    format!("{}_{}", ENV_PREFIX, parts.join("__"))
}
