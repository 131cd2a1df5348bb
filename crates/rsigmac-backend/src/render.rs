//! Shared infix rendering for text query languages.

use rsigmac_parser::ConditionOperator;

use crate::error::{ConvertError, Result};
use crate::query::{QueryNode, QueryValue};

/// Leaf syntax of an infix query language.
///
/// [`render`] takes care of boolean structure and grouping; a dialect only
/// spells operators and leaves.
pub trait TextDialect {
    fn and_token(&self) -> &'static str {
        " AND "
    }

    fn or_token(&self) -> &'static str {
        " OR "
    }

    fn not(&self, inner: &str) -> String {
        format!("NOT {inner}")
    }

    fn group(&self, inner: &str) -> String {
        format!("({inner})")
    }

    fn field_value(&self, field: &str, value: &QueryValue) -> Result<String>;

    fn keyword(&self, value: &QueryValue) -> Result<String>;

    fn exists(&self, field: &str, exists: bool) -> Result<String>;

    fn compare(&self, field: &str, op: ConditionOperator, value: f64) -> Result<String>;
}

/// Render a query tree; nested AND/OR children are grouped.
pub fn render<D: TextDialect + ?Sized>(dialect: &D, node: &QueryNode) -> Result<String> {
    match node {
        QueryNode::And(children) => join(dialect, children, dialect.and_token()),
        QueryNode::Or(children) => join(dialect, children, dialect.or_token()),
        QueryNode::Not(inner) => Ok(dialect.not(&grouped(dialect, inner)?)),
        QueryNode::Field { field, value } => dialect.field_value(field, value),
        QueryNode::Keyword(value) => dialect.keyword(value),
        QueryNode::Exists { field, exists } => dialect.exists(field, *exists),
        QueryNode::Compare { field, op, value } => dialect.compare(field, *op, *value),
    }
}

fn grouped<D: TextDialect + ?Sized>(dialect: &D, node: &QueryNode) -> Result<String> {
    let text = render(dialect, node)?;
    Ok(if node.is_composite() {
        dialect.group(&text)
    } else {
        text
    })
}

fn join<D: TextDialect + ?Sized>(dialect: &D, children: &[QueryNode], sep: &str) -> Result<String> {
    if children.is_empty() {
        return Err(ConvertError::Backend(
            "empty boolean group cannot be rendered".into(),
        ));
    }
    let parts = children
        .iter()
        .map(|c| grouped(dialect, c))
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join(sep))
}

/// Format a number without a trailing `.0` for integral values.
pub fn number(value: f64) -> String {
    value.to_string()
}
