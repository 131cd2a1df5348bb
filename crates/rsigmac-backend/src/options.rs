//! Free-form backend options from `-O KEY=VALUE` and `--backend-config`.

use std::path::Path;

use indexmap::IndexMap;
use serde_yaml::Value;

use crate::error::ConfigError;

/// String-valued options handed to a backend at construction time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendOptions {
    values: IndexMap<String, String>,
}

impl BackendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `KEY=VALUE` arguments. A bare `KEY` means `KEY=true`.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Self {
        let mut options = Self::new();
        for arg in args {
            let arg = arg.as_ref();
            match arg.split_once('=') {
                Some((key, value)) => options.set(key.trim(), value),
                None => options.set(arg.trim(), "true"),
            }
        }
        options
    }

    /// Load options from a YAML mapping of scalars.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_yaml::from_str(text)?;
        let mut options = Self::new();
        let mapping = match value {
            Value::Null => return Ok(options),
            Value::Mapping(m) => m,
            _ => {
                return Err(ConfigError::Invalid(
                    "backend configuration must be a mapping".into(),
                ));
            }
        };
        for (k, v) in mapping {
            let key = k.as_str().ok_or_else(|| {
                ConfigError::Invalid(format!("backend option name {k:?} is not a string"))
            })?;
            let value = match v {
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "backend option '{key}' must be a scalar, got {other:?}"
                    )));
                }
            };
            options.set(key, &value);
        }
        Ok(options)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Apply `other` on top of `self`; `other` wins per key.
    pub fn merged_with(mut self, other: &BackendOptions) -> Self {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Boolean view of an option; unset means `false`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(str::to_ascii_lowercase).as_deref(),
            Some("true" | "yes" | "1" | "on")
        )
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
