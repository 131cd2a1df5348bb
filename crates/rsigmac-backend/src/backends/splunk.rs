//! Splunk SPL searches.

use rsigmac_parser::{
    AggregateFunction, Aggregation, ConditionOperator, SigmaRule, SpecialChar, StringPart,
};

use crate::backends::{Backend, dropped_timeframe};
use crate::config::SigmaConfig;
use crate::error::{ConvertError, Result};
use crate::options::BackendOptions;
use crate::query::{QueryBuilder, QueryNode, QueryValue};
use crate::render::{TextDialect, number, render};

#[derive(Debug, Clone, Default)]
struct Spl;

impl Spl {
    fn quoted(&self, value: &QueryValue) -> Result<String> {
        let body = match value {
            QueryValue::String(s) => {
                let mut out = String::new();
                for part in &s.parts {
                    match part {
                        StringPart::Plain(text) => {
                            for c in text.chars() {
                                if c == '"' || c == '\\' {
                                    out.push('\\');
                                }
                                out.push(c);
                            }
                        }
                        StringPart::Special(SpecialChar::WildcardMulti) => out.push('*'),
                        StringPart::Special(SpecialChar::WildcardSingle) => {
                            return Err(ConvertError::NotSupported(
                                "splunk has no single-character wildcard".into(),
                            ));
                        }
                    }
                }
                out
            }
            QueryValue::Cidr(net) => net.to_string(),
            QueryValue::Regex(_) => {
                return Err(ConvertError::NotSupported(
                    "regular expressions are not supported in splunk searches".into(),
                ));
            }
            QueryValue::Null => {
                return Err(ConvertError::Backend("null has no splunk literal".into()));
            }
            scalar => return Ok(scalar.scalar_text().unwrap_or_default()),
        };
        Ok(format!("\"{body}\""))
    }
}

impl TextDialect for Spl {
    fn and_token(&self) -> &'static str {
        " "
    }

    fn field_value(&self, field: &str, value: &QueryValue) -> Result<String> {
        if *value == QueryValue::Null {
            return Ok(self.not(&format!("{field}=\"*\"")));
        }
        Ok(format!("{field}={}", self.quoted(value)?))
    }

    fn keyword(&self, value: &QueryValue) -> Result<String> {
        self.quoted(value)
    }

    fn exists(&self, field: &str, exists: bool) -> Result<String> {
        let test = format!("{field}=*");
        Ok(if exists { test } else { self.not(&test) })
    }

    fn compare(&self, field: &str, op: ConditionOperator, value: f64) -> Result<String> {
        Ok(format!("{field}{op}{}", number(value)))
    }
}

fn stats(agg: &Aggregation) -> String {
    let function = match (agg.function, &agg.field) {
        (AggregateFunction::Count, None) => "count".to_string(),
        (AggregateFunction::Count, Some(field)) => format!("dc({field})"),
        (func, Some(field)) => format!("{func}({field})"),
        (func, None) => func.to_string(),
    };
    let mut out = format!(" | stats {function} as val");
    if let Some(group) = &agg.group_by {
        out.push_str(&format!(" by {group}"));
    }
    out.push_str(&format!(" | search val {} {}", agg.operator, number(agg.threshold)));
    out
}

/// `splunk`: one search per rule condition, prefixed with the configured
/// indices.
pub struct SplunkBackend {
    builder: QueryBuilder,
    dialect: Spl,
}

impl SplunkBackend {
    pub fn new(config: SigmaConfig, _options: &BackendOptions) -> Self {
        SplunkBackend {
            builder: QueryBuilder::new(config),
            dialect: Spl,
        }
    }

    fn index_prefix(&self, rule: &SigmaRule) -> Option<String> {
        let indices: Vec<String> = self
            .builder
            .config()
            .indices(&rule.logsource)
            .iter()
            .map(|i| format!("index=\"{i}\""))
            .collect();
        match indices.len() {
            0 => None,
            1 => Some(indices[0].clone()),
            _ => Some(format!("({})", indices.join(" OR "))),
        }
    }
}

impl Backend for SplunkBackend {
    fn convert(&mut self, rule: &SigmaRule) -> Result<Vec<String>> {
        let prefix = self.index_prefix(rule);
        let queries = self.builder.build(rule)?;
        dropped_timeframe(rule, &queries);
        let mut out = Vec::new();
        for q in queries {
            let mut search = render(&self.dialect, &q.node)?;
            if prefix.is_some() && matches!(q.node, QueryNode::Or(_)) {
                search = self.dialect.group(&search);
            }
            if let Some(prefix) = &prefix {
                search = format!("{prefix} {search}");
            }
            if let Some(agg) = &q.aggregation {
                search.push_str(&stats(agg));
            }
            out.push(search);
        }
        Ok(out)
    }
}
