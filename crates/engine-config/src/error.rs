use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration '{origin}': {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration '{0}' must be a JSON object")]
    NotAnObject(String),

    #[error("Circular 'extend' chain through '{0}'")]
    ExtendCycle(PathBuf),

    #[error("Configuration validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),
}
