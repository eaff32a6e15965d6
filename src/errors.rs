//! Error types for portscout

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortscoutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Runtime probe error: {0}")]
    RuntimeProbe(String),
}

pub type Result<T> = std::result::Result<T, PortscoutError>;
