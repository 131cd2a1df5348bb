//! Conversion and configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why a backend could not convert a rule.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The rule uses a feature the target query language cannot express.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Any other conversion failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend does not implement this feature yet.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// A value would only match part of a full-text indexed field.
    #[error("partial field match: {0}")]
    PartialMatch(String),

    /// The query needs more full-text matches than the target allows.
    #[error("full field match: {0}")]
    FullMatch(String),
}

impl From<ipnet::AddrParseError> for ConvertError {
    fn from(e: ipnet::AddrParseError) -> Self {
        ConvertError::Backend(format!("invalid CIDR: {e}"))
    }
}

/// Failure to load or apply a mapping configuration or backend options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
