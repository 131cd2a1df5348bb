//! Field and index mapping configuration.
//!
//! ```yaml
//! title: Winlogbeat
//! order: 20
//! backends: [es-qs, es-dsl]
//! fieldmappings:
//!   EventID: winlog.event_id
//!   CommandLine: [process.command_line, process.args]
//! logsources:
//!   windows-sysmon:
//!     product: windows
//!     service: sysmon
//!     index: winlogbeat-*
//!     conditions:
//!       winlog.channel: Microsoft-Windows-Sysmon/Operational
//! defaultindex: logs-*
//! ```
//!
//! Several files can be chained; see [`SigmaConfig::merge`].

use std::path::Path;

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

use rsigmac_parser::LogSource;

use crate::error::ConfigError;

type Result<T> = std::result::Result<T, ConfigError>;

/// One `logsources:` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogsourceMapping {
    pub category: Option<String>,
    pub product: Option<String>,
    pub service: Option<String>,
    pub index: Vec<String>,
    /// Extra field conditions AND-ed to every query; a list means any value.
    pub conditions: IndexMap<String, Vec<String>>,
}

impl LogsourceMapping {
    /// Every declared attribute must match the rule's, ignoring case.
    pub fn matches(&self, ls: &LogSource) -> bool {
        fn attr(wanted: &Option<String>, actual: &Option<String>) -> bool {
            match (wanted, actual) {
                (None, _) => true,
                (Some(w), Some(a)) => w.eq_ignore_ascii_case(a),
                (Some(_), None) => false,
            }
        }
        attr(&self.category, &ls.category)
            && attr(&self.product, &ls.product)
            && attr(&self.service, &ls.service)
    }
}

/// A merged mapping configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SigmaConfig {
    pub title: Option<String>,
    pub order: Option<i64>,
    /// Targets this configuration is meant for; `None` means any.
    pub backends: Option<Vec<String>>,
    pub fieldmappings: IndexMap<String, Vec<String>>,
    pub logsources: IndexMap<String, LogsourceMapping>,
    pub defaultindex: Vec<String>,
}

impl SigmaConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        match value {
            Value::Null => Ok(Self::default()),
            Value::Mapping(m) => Self::from_mapping(&m),
            _ => Err(ConfigError::Invalid(
                "configuration must be a mapping".into(),
            )),
        }
    }

    fn from_mapping(m: &Mapping) -> Result<Self> {
        let mut config = SigmaConfig::default();

        for (k, v) in m {
            let key = k
                .as_str()
                .ok_or_else(|| ConfigError::Invalid(format!("key {k:?} is not a string")))?;
            match key {
                "title" => config.title = Some(expect_str(v, "title")?.to_string()),
                "order" => {
                    config.order = Some(v.as_i64().ok_or_else(|| {
                        ConfigError::Invalid("'order' must be an integer".into())
                    })?)
                }
                "backends" => config.backends = Some(str_or_list(v, "backends")?),
                "fieldmappings" => {
                    for (field, target) in expect_mapping(v, "fieldmappings")? {
                        let field = expect_str(field, "field mapping name")?;
                        let targets = str_or_list(target, field)?;
                        if targets.is_empty() {
                            return Err(ConfigError::Invalid(format!(
                                "field mapping '{field}' has no target"
                            )));
                        }
                        config.fieldmappings.insert(field.to_string(), targets);
                    }
                }
                "logsources" => {
                    for (name, entry) in expect_mapping(v, "logsources")? {
                        let name = expect_str(name, "logsource name")?;
                        config
                            .logsources
                            .insert(name.to_string(), parse_logsource(name, entry)?);
                    }
                }
                "defaultindex" => config.defaultindex = str_or_list(v, "defaultindex")?,
                other => log::debug!("ignoring unknown configuration key '{other}'"),
            }
        }

        Ok(config)
    }

    /// Chain `next` after `self`.
    ///
    /// Field mappings and logsources accumulate with later entries winning
    /// per key; `defaultindex`, `backends` and `title` are replaced when
    /// `next` declares them.
    pub fn merge(mut self, next: SigmaConfig) -> Self {
        if let (Some(prev), Some(order)) = (self.order, next.order)
            && order < prev
        {
            log::warn!(
                "configuration order decreases from {prev} to {order}; check the -c sequence"
            );
        }
        if next.title.is_some() {
            self.title = next.title;
        }
        if next.order.is_some() {
            self.order = next.order;
        }
        if next.backends.is_some() {
            self.backends = next.backends;
        }
        if !next.defaultindex.is_empty() {
            self.defaultindex = next.defaultindex;
        }
        self.fieldmappings.extend(next.fieldmappings);
        self.logsources.extend(next.logsources);
        self
    }

    /// Fail when a `backends:` list excludes `target`.
    pub fn check_backend(&self, target: &str) -> Result<()> {
        match &self.backends {
            Some(list) if !list.iter().any(|b| b == target) => Err(ConfigError::Invalid(format!(
                "configuration is not meant for target '{target}' (allowed: {})",
                list.join(", ")
            ))),
            _ => Ok(()),
        }
    }

    /// Target names for a rule field; unmapped fields map to themselves.
    pub fn map_field(&self, field: &str) -> Vec<String> {
        match self.fieldmappings.get(field) {
            Some(targets) => targets.clone(),
            None => vec![field.to_string()],
        }
    }

    pub fn matching_logsources<'a>(
        &'a self,
        ls: &'a LogSource,
    ) -> impl Iterator<Item = &'a LogsourceMapping> + 'a {
        self.logsources.values().filter(move |m| m.matches(ls))
    }

    /// Indices for a rule: the union over matching logsources, else the
    /// default index.
    pub fn indices(&self, ls: &LogSource) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for m in self.matching_logsources(ls) {
            for idx in &m.index {
                if !out.contains(idx) {
                    out.push(idx.clone());
                }
            }
        }
        if out.is_empty() {
            out = self.defaultindex.clone();
        }
        out
    }

    /// Field conditions contributed by every matching logsource.
    pub fn logsource_conditions(&self, ls: &LogSource) -> Vec<(String, Vec<String>)> {
        self.matching_logsources(ls)
            .flat_map(|m| m.conditions.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }
}

fn parse_logsource(name: &str, value: &Value) -> Result<LogsourceMapping> {
    let m = expect_mapping(value, name)?;
    let mut entry = LogsourceMapping::default();

    for (k, v) in m {
        let key = expect_str(k, name)?;
        match key {
            "category" => entry.category = Some(expect_str(v, key)?.to_string()),
            "product" => entry.product = Some(expect_str(v, key)?.to_string()),
            "service" => entry.service = Some(expect_str(v, key)?.to_string()),
            "index" => entry.index = str_or_list(v, "index")?,
            "conditions" => {
                for (field, cond) in expect_mapping(v, "conditions")? {
                    let field = expect_str(field, "condition field")?;
                    entry
                        .conditions
                        .insert(field.to_string(), str_or_list(cond, field)?);
                }
            }
            other => log::debug!("logsource '{name}': ignoring unknown key '{other}'"),
        }
    }

    if entry.category.is_none() && entry.product.is_none() && entry.service.is_none() {
        return Err(ConfigError::Invalid(format!(
            "logsource '{name}' needs at least one of category, product or service"
        )));
    }
    Ok(entry)
}

// =============================================================================
// YAML Helpers
// =============================================================================

fn expect_str<'a>(v: &'a Value, what: &str) -> Result<&'a str> {
    v.as_str()
        .ok_or_else(|| ConfigError::Invalid(format!("'{what}' must be a string")))
}

fn expect_mapping<'a>(v: &'a Value, what: &str) -> Result<&'a Mapping> {
    v.as_mapping()
        .ok_or_else(|| ConfigError::Invalid(format!("'{what}' must be a mapping")))
}

/// A scalar or a list of scalars, rendered as strings.
fn str_or_list(v: &Value, what: &str) -> Result<Vec<String>> {
    fn scalar(v: &Value) -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
    let bad = || ConfigError::Invalid(format!("'{what}' must be a string or a list of strings"));
    match v {
        Value::Sequence(seq) => seq.iter().map(|i| scalar(i).ok_or_else(bad)).collect(),
        other => scalar(other).map(|s| vec![s]).ok_or_else(bad),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINLOGBEAT: &str = r#"
title: Winlogbeat
order: 20
backends: [es-qs, es-dsl]
fieldmappings:
  EventID: winlog.event_id
  CommandLine: [process.command_line, process.args]
logsources:
  windows-sysmon:
    product: windows
    service: sysmon
    index: winlogbeat-*
    conditions:
      winlog.channel: Microsoft-Windows-Sysmon/Operational
  windows:
    product: windows
    index: [winlogbeat-*, windows-*]
defaultindex: logs-*
"#;

    fn sysmon() -> LogSource {
        LogSource {
            product: Some("Windows".into()),
            service: Some("sysmon".into()),
            ..Default::default()
        }
    }

    #[test]
    fn parses_full_config() {
        let cfg = SigmaConfig::from_yaml(WINLOGBEAT).unwrap();
        assert_eq!(cfg.title.as_deref(), Some("Winlogbeat"));
        assert_eq!(cfg.map_field("EventID"), ["winlog.event_id"]);
        assert_eq!(
            cfg.map_field("CommandLine"),
            ["process.command_line", "process.args"]
        );
        assert_eq!(cfg.map_field("Image"), ["Image"]);
    }

    #[test]
    fn indices_and_conditions_follow_logsource() {
        let cfg = SigmaConfig::from_yaml(WINLOGBEAT).unwrap();
        assert_eq!(cfg.indices(&sysmon()), ["winlogbeat-*", "windows-*"]);
        assert_eq!(
            cfg.logsource_conditions(&sysmon()),
            vec![(
                "winlog.channel".to_string(),
                vec!["Microsoft-Windows-Sysmon/Operational".to_string()]
            )]
        );

        let linux = LogSource {
            product: Some("linux".into()),
            ..Default::default()
        };
        assert_eq!(cfg.indices(&linux), ["logs-*"]);
        assert!(cfg.logsource_conditions(&linux).is_empty());
    }

    #[test]
    fn backend_restriction() {
        let cfg = SigmaConfig::from_yaml(WINLOGBEAT).unwrap();
        assert!(cfg.check_backend("es-qs").is_ok());
        assert!(matches!(
            cfg.check_backend("splunk"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(SigmaConfig::default().check_backend("splunk").is_ok());
    }

    #[test]
    fn chained_configs_merge() {
        let base = SigmaConfig::from_yaml(WINLOGBEAT).unwrap();
        let overlay = SigmaConfig::from_yaml(
            "order: 30\nfieldmappings:\n  EventID: event.code\n  User: user.name\ndefaultindex: other-*\n",
        )
        .unwrap();
        let merged = base.merge(overlay);
        assert_eq!(merged.map_field("EventID"), ["event.code"]);
        assert_eq!(merged.map_field("User"), ["user.name"]);
        assert_eq!(merged.map_field("CommandLine").len(), 2);
        assert_eq!(merged.defaultindex, ["other-*"]);
        assert_eq!(merged.backends.as_ref().map(Vec::len), Some(2));
        assert_eq!(merged.order, Some(30));
    }

    #[test]
    fn semantic_errors() {
        for bad in [
            "fieldmappings: [a, b]\n",
            "fieldmappings:\n  EventID: {a: b}\n",
            "logsources:\n  empty:\n    index: x\n",
            "logsources:\n  w:\n    product: [windows]\n",
            "order: high\n",
            "- just\n- a list\n",
        ] {
            assert!(
                matches!(SigmaConfig::from_yaml(bad), Err(ConfigError::Invalid(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn malformed_yaml() {
        assert!(matches!(
            SigmaConfig::from_yaml("fieldmappings: {a: [\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn missing_file_is_io() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SigmaConfig::load(&dir.path().join("nope.yml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
