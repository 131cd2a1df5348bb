//! Elasticsearch query string (Lucene syntax).

use rsigmac_parser::{ConditionOperator, SigmaRule, SpecialChar, StringPart};

use crate::backends::Backend;
use crate::config::SigmaConfig;
use crate::error::{ConvertError, Result};
use crate::options::BackendOptions;
use crate::query::{QueryBuilder, QueryValue};
use crate::render::{TextDialect, number, render};

const RESERVED: &str = "+-=&|><!(){}[]^\"~*?:\\/ ";

/// Lucene query string dialect, shared with the DSL backend.
#[derive(Debug, Clone, Default)]
pub(crate) struct QueryString {
    /// Field used for keywords; full-text search when unset.
    keyword_field: Option<String>,
}

impl QueryString {
    pub(crate) fn new(options: &BackendOptions) -> Self {
        QueryString {
            keyword_field: options.get("keyword_field").map(str::to_string),
        }
    }

    fn value(&self, value: &QueryValue) -> Result<String> {
        Ok(match value {
            QueryValue::String(s) if s.parts.is_empty() => "\"\"".to_string(),
            QueryValue::String(s) => {
                let mut out = String::new();
                for part in &s.parts {
                    match part {
                        StringPart::Plain(text) => {
                            for c in text.chars() {
                                if RESERVED.contains(c) {
                                    out.push('\\');
                                }
                                out.push(c);
                            }
                        }
                        StringPart::Special(SpecialChar::WildcardMulti) => out.push('*'),
                        StringPart::Special(SpecialChar::WildcardSingle) => out.push('?'),
                    }
                }
                out
            }
            QueryValue::Regex(re) => format!("/{}/", re.replace('/', "\\/")),
            QueryValue::Cidr(net) => format!("\"{net}\""),
            QueryValue::Null => {
                return Err(ConvertError::Backend("null has no query string literal".into()));
            }
            scalar => scalar.scalar_text().unwrap_or_default(),
        })
    }
}

fn field_name(field: &str) -> String {
    field.replace(' ', "\\ ")
}

impl TextDialect for QueryString {
    fn field_value(&self, field: &str, value: &QueryValue) -> Result<String> {
        if *value == QueryValue::Null {
            return self.exists(field, false);
        }
        Ok(format!("{}:{}", field_name(field), self.value(value)?))
    }

    fn keyword(&self, value: &QueryValue) -> Result<String> {
        let text = self.value(value)?;
        Ok(match &self.keyword_field {
            Some(field) => format!("{}:{text}", field_name(field)),
            None => text,
        })
    }

    fn exists(&self, field: &str, exists: bool) -> Result<String> {
        let test = format!("_exists_:{}", field_name(field));
        Ok(if exists { test } else { self.not(&test) })
    }

    fn compare(&self, field: &str, op: ConditionOperator, value: f64) -> Result<String> {
        let op = match op {
            ConditionOperator::Eq => "",
            other => other.symbol(),
        };
        Ok(format!("{}:{op}{}", field_name(field), number(value)))
    }
}

/// `es-qs`: one query string line per rule condition.
pub struct EsQsBackend {
    builder: QueryBuilder,
    dialect: QueryString,
}

impl EsQsBackend {
    pub fn new(config: SigmaConfig, options: &BackendOptions) -> Self {
        EsQsBackend {
            builder: QueryBuilder::new(config),
            dialect: QueryString::new(options),
        }
    }
}

impl Backend for EsQsBackend {
    fn convert(&mut self, rule: &SigmaRule) -> Result<Vec<String>> {
        self.builder
            .build(rule)?
            .iter()
            .map(|q| {
                if q.aggregation.is_some() {
                    return Err(ConvertError::NotImplemented(
                        "aggregations are not implemented for es-qs".into(),
                    ));
                }
                render(&self.dialect, &q.node)
            })
            .collect()
    }
}
