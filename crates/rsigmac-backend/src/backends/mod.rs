//! Conversion backends and the static target registry.

mod es_dsl;
mod es_qs;
mod fieldlist;
mod grep;
mod splunk;
mod sql;

use rsigmac_parser::SigmaRule;

use crate::config::SigmaConfig;
use crate::error::Result;
use crate::options::BackendOptions;
use crate::query::RuleQuery;

pub use es_dsl::EsDslBackend;
pub use es_qs::EsQsBackend;
pub use fieldlist::FieldListBackend;
pub use grep::GrepBackend;
pub use splunk::SplunkBackend;
pub use sql::SqlBackend;

/// Converts rules into one target query language.
pub trait Backend {
    /// Zero or more queries for one rule, in output order.
    fn convert(&mut self, rule: &SigmaRule) -> Result<Vec<String>>;

    /// Output produced once after the last rule.
    fn finalize(&mut self) -> Option<String> {
        None
    }
}

pub type Constructor = fn(SigmaConfig, &BackendOptions) -> Result<Box<dyn Backend>>;

/// A registry entry.
pub struct BackendInfo {
    pub name: &'static str,
    pub description: &'static str,
    constructor: Constructor,
}

impl BackendInfo {
    pub fn create(&self, config: SigmaConfig, options: &BackendOptions) -> Result<Box<dyn Backend>> {
        log::debug!("constructing backend '{}'", self.name);
        (self.constructor)(config, options)
    }
}

impl std::fmt::Debug for BackendInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendInfo")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

pub const DEFAULT_TARGET: &str = "es-qs";

/// Warn when an aggregating rule declares a `timeframe` the target
/// cannot window on; returns the dropped window.
pub(crate) fn dropped_timeframe<'r>(rule: &'r SigmaRule, queries: &[RuleQuery]) -> Option<&'r str> {
    let timeframe = rule.detection.timeframe.as_deref()?;
    if !queries.iter().any(|q| q.aggregation.is_some()) {
        return None;
    }
    log::warn!(
        "rule '{}': timeframe {timeframe} ignored, the aggregation counts over all events",
        rule.title
    );
    Some(timeframe)
}

pub static BACKENDS: &[BackendInfo] = &[
    BackendInfo {
        name: "es-qs",
        description: "Elasticsearch query string",
        constructor: |c, o| Ok(Box::new(EsQsBackend::new(c, o))),
    },
    BackendInfo {
        name: "es-dsl",
        description: "Elasticsearch query DSL, emitted as one JSON array",
        constructor: |c, o| Ok(Box::new(EsDslBackend::new(c, o))),
    },
    BackendInfo {
        name: "splunk",
        description: "Splunk SPL search",
        constructor: |c, o| Ok(Box::new(SplunkBackend::new(c, o))),
    },
    BackendInfo {
        name: "grep",
        description: "grep -P regular expression over raw log lines",
        constructor: |c, o| Ok(Box::new(GrepBackend::new(c, o))),
    },
    BackendInfo {
        name: "sql",
        description: "SQL SELECT statement",
        constructor: |c, o| Ok(Box::new(SqlBackend::new(c, o)?)),
    },
    BackendInfo {
        name: "fieldlist",
        description: "Sorted list of the fields referenced by all rules",
        constructor: |c, _| Ok(Box::new(FieldListBackend::new(c))),
    },
];

pub fn lookup(name: &str) -> Option<&'static BackendInfo> {
    BACKENDS.iter().find(|b| b.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_are_unique_and_default_exists() {
        let mut names: Vec<&str> = BACKENDS.iter().map(|b| b.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BACKENDS.len());
        assert!(lookup(DEFAULT_TARGET).is_some());
        assert!(lookup("qradar").is_none());
    }

    #[test]
    fn every_backend_constructs_with_defaults() {
        for info in BACKENDS {
            assert!(
                info.create(SigmaConfig::default(), &BackendOptions::new()).is_ok(),
                "{} failed to construct",
                info.name
            );
        }
    }

    #[test]
    fn timeframe_is_reported_only_for_aggregations() {
        let yaml = |condition: &str| {
            format!(
                "title: T\nlogsource: {{product: linux}}\ndetection:\n  sel: {{a: 1}}\n  timeframe: 5m\n  condition: {condition}\n"
            )
        };
        let builder = crate::query::QueryBuilder::new(SigmaConfig::default());

        let rule = rsigmac_parser::parse_sigma_yaml(&yaml("sel | count() by Host > 3"))
            .unwrap()
            .rules
            .remove(0);
        let queries = builder.build(&rule).unwrap();
        assert_eq!(dropped_timeframe(&rule, &queries), Some("5m"));

        let rule = rsigmac_parser::parse_sigma_yaml(&yaml("sel")).unwrap().rules.remove(0);
        let queries = builder.build(&rule).unwrap();
        assert_eq!(dropped_timeframe(&rule, &queries), None);
    }
}
