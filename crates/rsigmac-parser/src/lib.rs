//! # rsigmac-parser
//!
//! Parser for Sigma detection rules as consumed by the `rsigmac` batch
//! converter.
//!
//! - **Detection rules**: field matching, wildcards, boolean conditions, field modifiers
//! - **Condition expressions**: `and`, `or`, `not`, `1 of`, `all of`, parenthesized
//!   groups and the legacy `| count(field) by group > N` aggregation suffix
//! - **Rule collections**: multi-document YAML, `action: global/reset/repeat`,
//!   parsed lazily one document at a time
//! - **Rule filters**: `level>=high,status=stable,logsource=windows`
//!
//! ## Quick Start
//!
//! ```rust
//! use rsigmac_parser::{RuleFilter, parse_sigma_yaml};
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
//! level: medium
//! "#;
//!
//! let collection = parse_sigma_yaml(yaml).unwrap();
//! let filter = RuleFilter::compile(Some("level>=medium")).unwrap();
//! assert!(filter.matches(&collection.rules[0]));
//! ```

pub mod ast;
pub mod condition;
pub mod error;
pub mod filter;
pub mod parser;
pub mod value;

pub use ast::{
    AggregateFunction, Aggregation, Condition, ConditionExpr, ConditionOperator, Detection,
    DetectionItem, Detections, FieldSpec, Level, LogSource, Modifier, Quantifier,
    SelectorPattern, SigmaCollection, SigmaRule, Status,
};
pub use condition::parse_condition;
pub use error::{Result, SigmaParserError};
pub use filter::{FilterError, RuleFilter};
pub use parser::{SigmaCollectionParser, parse_field_spec, parse_sigma_yaml};
pub use value::{SigmaString, SigmaValue, SpecialChar, StringPart};
