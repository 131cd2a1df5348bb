//! SQL `SELECT` statements over a single event table.
//!
//! Keywords use a full-text `MATCH` on the table, which can only express
//! one exact term per query: wildcard keywords raise `PartialMatch` and
//! several keywords in one query raise `FullMatch`.

use rsigmac_parser::{
    AggregateFunction, Aggregation, ConditionOperator, SigmaRule, SpecialChar, StringPart,
};

use crate::backends::{Backend, dropped_timeframe};
use crate::config::SigmaConfig;
use crate::error::{ConvertError, Result};
use crate::options::BackendOptions;
use crate::query::{QueryBuilder, QueryValue};
use crate::render::{TextDialect, number, render};

const DEFAULT_TABLE: &str = "eventlog";

fn quote_ident(name: &str) -> String {
    let mut chars = name.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

struct Sql<'a> {
    table: &'a str,
}

impl Sql<'_> {
    fn like_pattern(parts: &[StringPart]) -> String {
        let mut out = String::new();
        for part in parts {
            match part {
                StringPart::Plain(text) => {
                    for c in text.chars() {
                        if matches!(c, '%' | '_' | '\\') {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                }
                StringPart::Special(SpecialChar::WildcardMulti) => out.push('%'),
                StringPart::Special(SpecialChar::WildcardSingle) => out.push('_'),
            }
        }
        out
    }
}

impl TextDialect for Sql<'_> {
    fn field_value(&self, field: &str, value: &QueryValue) -> Result<String> {
        let field = quote_ident(field);
        Ok(match value {
            QueryValue::String(s) if s.contains_wildcards() => format!(
                "{field} LIKE {} ESCAPE '\\'",
                quote_literal(&Self::like_pattern(&s.parts))
            ),
            QueryValue::String(s) => format!("{field} = {}", quote_literal(&s.literal_text())),
            QueryValue::Null => format!("{field} IS NULL"),
            QueryValue::Regex(re) => format!("{field} REGEXP {}", quote_literal(re)),
            QueryValue::Cidr(net) => {
                return Err(ConvertError::NotSupported(format!(
                    "network match {net} has no SQL equivalent"
                )));
            }
            scalar => format!("{field} = {}", scalar.scalar_text().unwrap_or_default()),
        })
    }

    fn keyword(&self, value: &QueryValue) -> Result<String> {
        let term = match value {
            QueryValue::String(s) if s.contains_wildcards() => {
                return Err(ConvertError::PartialMatch(format!(
                    "keyword '{s}' needs a partial full-text match"
                )));
            }
            QueryValue::String(s) => s.literal_text(),
            QueryValue::Regex(_) | QueryValue::Cidr(_) | QueryValue::Null => {
                return Err(ConvertError::NotSupported(
                    "only literal keywords can be matched in full text".into(),
                ));
            }
            scalar => scalar.scalar_text().unwrap_or_default(),
        };
        Ok(format!(
            "{} MATCH ({})",
            quote_ident(self.table),
            quote_literal(&format!("\"{term}\""))
        ))
    }

    fn exists(&self, field: &str, exists: bool) -> Result<String> {
        let test = if exists { "IS NOT NULL" } else { "IS NULL" };
        Ok(format!("{} {test}", quote_ident(field)))
    }

    fn compare(&self, field: &str, op: ConditionOperator, value: f64) -> Result<String> {
        Ok(format!("{} {op} {}", quote_ident(field), number(value)))
    }
}

fn aggregate_expr(agg: &Aggregation) -> String {
    match (agg.function, &agg.field) {
        (AggregateFunction::Count, Some(field)) => format!("COUNT(DISTINCT {})", quote_ident(field)),
        (_, None) => "COUNT(*)".to_string(),
        (func, Some(field)) => format!("{}({})", func.to_string().to_uppercase(), quote_ident(field)),
    }
}

/// `sql`: one statement per rule condition.
pub struct SqlBackend {
    builder: QueryBuilder,
    table: Option<String>,
}

impl SqlBackend {
    pub fn new(config: SigmaConfig, options: &BackendOptions) -> Result<Self> {
        let table = match options.get("table") {
            Some(t) if t.trim().is_empty() => {
                return Err(ConvertError::Backend("option 'table' must not be empty".into()));
            }
            Some(t) => Some(t.trim().to_string()),
            None => None,
        };
        Ok(SqlBackend {
            builder: QueryBuilder::new(config),
            table,
        })
    }

    /// The `table` option, else the first configured index, else `eventlog`.
    fn table(&self, rule: &SigmaRule) -> String {
        self.table
            .clone()
            .or_else(|| self.builder.config().indices(&rule.logsource).into_iter().next())
            .unwrap_or_else(|| DEFAULT_TABLE.to_string())
    }
}

impl Backend for SqlBackend {
    fn convert(&mut self, rule: &SigmaRule) -> Result<Vec<String>> {
        let table = self.table(rule);
        let dialect = Sql { table: &table };
        let from = quote_ident(&table);

        let queries = self.builder.build(rule)?;
        dropped_timeframe(rule, &queries);
        let mut out = Vec::new();
        for q in queries {
            if q.node.keywords().len() > 1 {
                return Err(ConvertError::FullMatch(
                    "query needs more than one full-text match".into(),
                ));
            }
            let cond = render(&dialect, &q.node)?;
            let statement = match &q.aggregation {
                None => format!("SELECT * FROM {from} WHERE {cond}"),
                Some(agg) => {
                    let expr = aggregate_expr(agg);
                    let having = format!("agg {} {}", agg.operator, number(agg.threshold));
                    match &agg.group_by {
                        Some(group) => {
                            let group = quote_ident(group);
                            format!(
                                "SELECT {group}, {expr} AS agg FROM {from} WHERE {cond} GROUP BY {group} HAVING {having}"
                            )
                        }
                        None => format!(
                            "SELECT * FROM (SELECT {expr} AS agg FROM {from} WHERE {cond}) WHERE {having}"
                        ),
                    }
                }
            };
            out.push(statement);
        }
        Ok(out)
    }
}
