//! `grep -P` command lines. Each condition becomes one anchored Perl regex
//! built from lookaheads, so AND/OR/NOT work on unstructured lines.

use rsigmac_parser::{SigmaRule, SpecialChar, StringPart};

use crate::backends::Backend;
use crate::config::SigmaConfig;
use crate::error::{ConvertError, Result};
use crate::options::BackendOptions;
use crate::query::{QueryBuilder, QueryNode, QueryValue};

pub struct GrepBackend {
    builder: QueryBuilder,
    ignore_case: bool,
}

impl GrepBackend {
    pub fn new(config: SigmaConfig, options: &BackendOptions) -> Self {
        GrepBackend {
            builder: QueryBuilder::new(config),
            ignore_case: options.flag("ignore_case"),
        }
    }

    fn command(&self, pattern: &str) -> String {
        let flags = if self.ignore_case { "-P -i" } else { "-P" };
        format!("grep {flags} '^{}'", pattern.replace('\'', "'\"'\"'"))
    }
}

fn pattern(value: &QueryValue) -> Result<String> {
    match value {
        QueryValue::String(s) => Ok(s
            .parts
            .iter()
            .map(|part| match part {
                StringPart::Plain(text) => regex::escape(text),
                StringPart::Special(SpecialChar::WildcardMulti) => ".*".to_string(),
                StringPart::Special(SpecialChar::WildcardSingle) => ".".to_string(),
            })
            .collect()),
        QueryValue::Regex(re) => Ok(re.clone()),
        QueryValue::Cidr(_) | QueryValue::Null => Err(ConvertError::NotSupported(
            "grep matches text only; network and null values are not supported".into(),
        )),
        scalar => Ok(regex::escape(&scalar.scalar_text().unwrap_or_default())),
    }
}

/// Fields are ignored: a value matches anywhere on the line.
fn lookahead(node: &QueryNode) -> Result<String> {
    match node {
        QueryNode::And(children) | QueryNode::Or(children) if children.is_empty() => Err(
            ConvertError::Backend("empty boolean group cannot be rendered".into()),
        ),
        QueryNode::And(children) => children.iter().map(lookahead).collect(),
        QueryNode::Or(children) => {
            let alts = children
                .iter()
                .map(lookahead)
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("(?:{})", alts.join("|")))
        }
        QueryNode::Not(inner) => Ok(format!("(?!{})", lookahead(inner)?)),
        QueryNode::Field { value, .. } | QueryNode::Keyword(value) => {
            Ok(format!("(?=.*{})", pattern(value)?))
        }
        QueryNode::Exists { .. } | QueryNode::Compare { .. } => Err(ConvertError::NotSupported(
            "grep cannot test field presence or numeric ranges".into(),
        )),
    }
}

impl Backend for GrepBackend {
    fn convert(&mut self, rule: &SigmaRule) -> Result<Vec<String>> {
        self.builder
            .build(rule)?
            .iter()
            .map(|q| {
                if q.aggregation.is_some() {
                    return Err(ConvertError::NotImplemented(
                        "aggregations are not implemented for grep".into(),
                    ));
                }
                Ok(self.command(&lookahead(&q.node)?))
            })
            .collect()
    }
}
