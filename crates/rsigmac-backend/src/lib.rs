//! # rsigmac-backend
//!
//! Turns parsed Sigma rules into target query languages.
//!
//! - **Mapping configuration**: field mappings, logsource indices and
//!   conditions, chained from several YAML files
//! - **Query tree**: conditions, selectors and field modifiers resolved into
//!   a backend-neutral [`QueryNode`]
//! - **Backends**: a static registry of targets (`es-qs`, `es-dsl`,
//!   `splunk`, `grep`, `sql`, `fieldlist`) behind the [`Backend`] trait
//!
//! ## Quick Start
//!
//! ```rust
//! use rsigmac_backend::{BackendOptions, SigmaConfig, lookup};
//! use rsigmac_parser::parse_sigma_yaml;
//!
//! let yaml = r#"
//! title: Detect Whoami
//! logsource:
//!     product: windows
//!     category: process_creation
//! detection:
//!     selection:
//!         CommandLine|contains: 'whoami'
//!     condition: selection
//! "#;
//!
//! let rule = &parse_sigma_yaml(yaml).unwrap().rules[0];
//! let config = SigmaConfig::from_yaml("fieldmappings:\n  CommandLine: process.command_line\n").unwrap();
//! let mut backend = lookup("es-qs")
//!     .unwrap()
//!     .create(config, &BackendOptions::new())
//!     .unwrap();
//! assert_eq!(backend.convert(rule).unwrap(), ["process.command_line:*whoami*"]);
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod modifiers;
pub mod options;
pub mod query;
pub mod render;

pub use backends::{
    BACKENDS, Backend, BackendInfo, DEFAULT_TARGET, EsDslBackend, EsQsBackend, FieldListBackend,
    GrepBackend, SplunkBackend, SqlBackend, lookup,
};
pub use config::{LogsourceMapping, SigmaConfig};
pub use error::{ConfigError, ConvertError, Result};
pub use options::BackendOptions;
pub use query::{QueryBuilder, QueryNode, QueryValue, RuleQuery};
pub use render::TextDialect;
