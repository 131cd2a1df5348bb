use thiserror::Error;

/// Why a rule document could not be read.
#[derive(Debug, Error)]
pub enum SigmaParserError {
    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid condition: {0}")]
    Condition(String),

    #[error("unknown modifier '{0}'")]
    UnknownModifier(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("invalid detection: {0}")]
    InvalidDetection(String),

    #[error("condition references unknown detection '{0}'")]
    UnknownDetection(String),

    #[error("invalid collection action '{0}'")]
    InvalidAction(String),

    #[error("{0} documents cannot be converted")]
    UnsupportedDocument(String),
}

impl SigmaParserError {
    /// `true` when the document text itself is not well-formed YAML, as
    /// opposed to well-formed YAML that is not a valid Sigma rule.
    pub fn is_yaml(&self) -> bool {
        matches!(self, SigmaParserError::Yaml(_))
    }
}

pub type Result<T> = std::result::Result<T, SigmaParserError>;
