//! Failure kinds and the process exit codes they map to.

use rsigmac_backend::{ConfigError, ConvertError};
use rsigmac_parser::SigmaParserError;

pub const EXIT_OK: i32 = 0;

/// Every way a run can fail. Each kind has exactly one exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Output file could not be opened or written.
    Output,
    /// Input document is not well-formed YAML.
    InputYaml,
    /// Well-formed YAML that is not a valid rule.
    RuleParse,
    /// Input or configuration file could not be read.
    Io,
    ConfigYaml,
    ConfigInvalid,
    /// Generic backend failure, unsupported feature or construction failure.
    Backend,
    Filter,
    UnknownTarget,
    NotImplemented,
    PartialMatch,
    FullMatch,
}

impl Failure {
    pub fn code(self) -> i32 {
        match self {
            Failure::Output => 1,
            Failure::InputYaml => 3,
            Failure::RuleParse => 4,
            Failure::Io => 5,
            Failure::ConfigYaml => 6,
            Failure::ConfigInvalid => 7,
            Failure::Backend => 8,
            Failure::Filter => 9,
            Failure::UnknownTarget => 10,
            Failure::NotImplemented => 42,
            Failure::PartialMatch => 80,
            Failure::FullMatch => 90,
        }
    }

    /// Backend-family failures, which `--ignore-backend-errors` suppresses.
    pub fn is_tolerable(self) -> bool {
        matches!(
            self,
            Failure::Backend | Failure::NotImplemented | Failure::PartialMatch | Failure::FullMatch
        )
    }
}

impl From<&ConvertError> for Failure {
    fn from(e: &ConvertError) -> Self {
        match e {
            ConvertError::NotSupported(_) | ConvertError::Backend(_) => Failure::Backend,
            ConvertError::NotImplemented(_) => Failure::NotImplemented,
            ConvertError::PartialMatch(_) => Failure::PartialMatch,
            ConvertError::FullMatch(_) => Failure::FullMatch,
        }
    }
}

impl From<&SigmaParserError> for Failure {
    fn from(e: &SigmaParserError) -> Self {
        if e.is_yaml() {
            Failure::InputYaml
        } else {
            Failure::RuleParse
        }
    }
}

impl From<&ConfigError> for Failure {
    fn from(e: &ConfigError) -> Self {
        match e {
            ConfigError::Io { .. } => Failure::Io,
            ConfigError::Yaml(_) => Failure::ConfigYaml,
            ConfigError::Invalid(_) => Failure::ConfigInvalid,
        }
    }
}
