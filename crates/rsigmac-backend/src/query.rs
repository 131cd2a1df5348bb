//! Backend-neutral query tree.
//!
//! [`QueryBuilder`] resolves each rule condition against the named
//! detections, applies field modifiers and the mapping configuration, and
//! produces one [`RuleQuery`] per condition. Backends only render trees.

use std::collections::BTreeSet;

use ipnet::IpNet;

use rsigmac_parser::{
    Aggregation, ConditionExpr, ConditionOperator, Detection, DetectionItem, Quantifier,
    SigmaRule, SigmaString,
};

use crate::config::SigmaConfig;
use crate::error::{ConvertError, Result};
use crate::modifiers::{ModCtx, Match};

// =============================================================================
// Tree types
// =============================================================================

/// A value a field or keyword is compared against.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// Literal text with wildcards.
    String(SigmaString),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// Regular expression, inline flags already applied.
    Regex(String),
    Cidr(IpNet),
}

impl QueryValue {
    pub fn has_wildcards(&self) -> bool {
        matches!(self, QueryValue::String(s) if s.contains_wildcards())
    }

    /// Text of a scalar value; `None` for null, regex and network values.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            QueryValue::Integer(n) => Some(n.to_string()),
            QueryValue::Float(n) => Some(n.to_string()),
            QueryValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
    Field { field: String, value: QueryValue },
    /// Full-text match without a field.
    Keyword(QueryValue),
    Exists { field: String, exists: bool },
    Compare {
        field: String,
        op: ConditionOperator,
        value: f64,
    },
}

impl QueryNode {
    /// AND-combine, flattening nested ANDs and unwrapping single children.
    pub fn and(nodes: Vec<QueryNode>) -> QueryNode {
        Self::combine(nodes, true)
    }

    /// OR-combine, flattening nested ORs and unwrapping single children.
    pub fn or(nodes: Vec<QueryNode>) -> QueryNode {
        Self::combine(nodes, false)
    }

    fn combine(nodes: Vec<QueryNode>, and: bool) -> QueryNode {
        let mut flat = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                QueryNode::And(children) if and => flat.extend(children),
                QueryNode::Or(children) if !and => flat.extend(children),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        if and {
            QueryNode::And(flat)
        } else {
            QueryNode::Or(flat)
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, QueryNode::And(_) | QueryNode::Or(_))
    }

    /// Every field name referenced in the tree.
    pub fn fields(&self, out: &mut BTreeSet<String>) {
        match self {
            QueryNode::And(children) | QueryNode::Or(children) => {
                for c in children {
                    c.fields(out);
                }
            }
            QueryNode::Not(inner) => inner.fields(out),
            QueryNode::Field { field, .. }
            | QueryNode::Exists { field, .. }
            | QueryNode::Compare { field, .. } => {
                out.insert(field.clone());
            }
            QueryNode::Keyword(_) => {}
        }
    }

    /// Keyword leaves in the tree, in order.
    pub fn keywords(&self) -> Vec<&QueryValue> {
        let mut out = Vec::new();
        self.collect_keywords(&mut out);
        out
    }

    fn collect_keywords<'a>(&'a self, out: &mut Vec<&'a QueryValue>) {
        match self {
            QueryNode::And(children) | QueryNode::Or(children) => {
                for c in children {
                    c.collect_keywords(out);
                }
            }
            QueryNode::Not(inner) => inner.collect_keywords(out),
            QueryNode::Keyword(v) => out.push(v),
            _ => {}
        }
    }
}

/// The query for one rule condition.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleQuery {
    pub node: QueryNode,
    /// Aggregation with field names already mapped.
    pub aggregation: Option<Aggregation>,
}

// =============================================================================
// Builder
// =============================================================================

/// Builds query trees for rules under a mapping configuration.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    config: SigmaConfig,
}

impl QueryBuilder {
    pub fn new(config: SigmaConfig) -> Self {
        QueryBuilder { config }
    }

    pub fn config(&self) -> &SigmaConfig {
        &self.config
    }

    /// One query per rule condition, in condition order.
    pub fn build(&self, rule: &SigmaRule) -> Result<Vec<RuleQuery>> {
        let ls_conditions: Vec<QueryNode> = self
            .config
            .logsource_conditions(&rule.logsource)
            .into_iter()
            .map(|(field, values)| {
                QueryNode::or(
                    values
                        .into_iter()
                        .map(|v| QueryNode::Field {
                            field: field.clone(),
                            value: QueryValue::String(SigmaString::new(&v)),
                        })
                        .collect(),
                )
            })
            .collect();

        let mut queries = Vec::with_capacity(rule.detection.conditions.len());
        for condition in &rule.detection.conditions {
            let mut node = self.resolve(&condition.expr, rule)?;
            if !ls_conditions.is_empty() {
                let mut parts = ls_conditions.clone();
                parts.push(node);
                node = QueryNode::and(parts);
            }
            let aggregation = condition.aggregation.clone().map(|mut agg| {
                agg.field = agg.field.map(|f| self.primary_field(&f));
                agg.group_by = agg.group_by.map(|g| self.primary_field(&g));
                agg
            });
            queries.push(RuleQuery { node, aggregation });
        }
        Ok(queries)
    }

    /// Aggregations name a single field; use the first mapping target.
    fn primary_field(&self, field: &str) -> String {
        self.config
            .map_field(field)
            .into_iter()
            .next()
            .unwrap_or_else(|| field.to_string())
    }

    fn resolve(&self, expr: &ConditionExpr, rule: &SigmaRule) -> Result<QueryNode> {
        let named = &rule.detection.named;
        match expr {
            ConditionExpr::Identifier(name) => {
                let det = named.get(name).ok_or_else(|| {
                    ConvertError::Backend(format!("condition references unknown detection '{name}'"))
                })?;
                self.detection(det)
            }
            ConditionExpr::And(args) => Ok(QueryNode::and(
                args.iter()
                    .map(|a| self.resolve(a, rule))
                    .collect::<Result<_>>()?,
            )),
            ConditionExpr::Or(args) => Ok(QueryNode::or(
                args.iter()
                    .map(|a| self.resolve(a, rule))
                    .collect::<Result<_>>()?,
            )),
            ConditionExpr::Not(inner) => Ok(QueryNode::Not(Box::new(self.resolve(inner, rule)?))),
            ConditionExpr::Selector {
                quantifier,
                pattern,
            } => {
                if let Quantifier::Count(n) = quantifier {
                    return Err(ConvertError::NotSupported(format!(
                        "'{n} of' selectors cannot be expressed as a query"
                    )));
                }
                let matched = named
                    .iter()
                    .filter(|(name, _)| pattern.matches(name))
                    .map(|(_, det)| self.detection(det))
                    .collect::<Result<Vec<_>>>()?;
                if matched.is_empty() {
                    return Err(ConvertError::Backend(format!(
                        "selector '{quantifier} of {pattern}' matches no detection"
                    )));
                }
                Ok(match quantifier {
                    Quantifier::All => QueryNode::and(matched),
                    _ => QueryNode::or(matched),
                })
            }
        }
    }

    fn detection(&self, det: &Detection) -> Result<QueryNode> {
        match det {
            Detection::AllOf(items) => Ok(QueryNode::and(
                items
                    .iter()
                    .map(|i| self.item(i))
                    .collect::<Result<_>>()?,
            )),
            Detection::AnyOf(subs) => Ok(QueryNode::or(
                subs.iter()
                    .map(|d| self.detection(d))
                    .collect::<Result<_>>()?,
            )),
            Detection::Keywords(values) => {
                let ctx = ModCtx::default();
                let mut nodes = Vec::new();
                for v in values {
                    for m in ctx.expand(v)? {
                        nodes.push(keyword_node(m)?);
                    }
                }
                Ok(QueryNode::or(nodes))
            }
        }
    }

    fn item(&self, item: &DetectionItem) -> Result<QueryNode> {
        let ctx = ModCtx::from_modifiers(&item.field.modifiers)?;

        let Some(field) = &item.field.name else {
            if ctx.exists {
                return Err(ConvertError::Backend(
                    "'exists' needs a field name".into(),
                ));
            }
            let per_value = item
                .values
                .iter()
                .map(|v| {
                    let matches = ctx.expand(v)?;
                    Ok(QueryNode::or(
                        matches.into_iter().map(keyword_node).collect::<Result<_>>()?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(ctx.link(per_value));
        };

        let targets = self.config.map_field(field);
        let per_field = targets
            .iter()
            .map(|target| {
                if ctx.exists {
                    let exists = ctx.exists_flag(&item.values);
                    return Ok(QueryNode::Exists {
                        field: target.clone(),
                        exists,
                    });
                }
                let per_value = item
                    .values
                    .iter()
                    .map(|v| {
                        let matches = ctx.expand(v)?;
                        Ok(QueryNode::or(
                            matches.into_iter().map(|m| field_node(target, m)).collect(),
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ctx.link(per_value))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(QueryNode::or(per_field))
    }
}

fn field_node(field: &str, m: Match) -> QueryNode {
    match m {
        Match::Value(value) => QueryNode::Field {
            field: field.to_string(),
            value,
        },
        Match::Compare(op, value) => QueryNode::Compare {
            field: field.to_string(),
            op,
            value,
        },
    }
}

fn keyword_node(m: Match) -> Result<QueryNode> {
    match m {
        Match::Value(QueryValue::Null) => {
            Err(ConvertError::Backend("null keyword has no meaning".into()))
        }
        Match::Value(value) => Ok(QueryNode::Keyword(value)),
        Match::Compare(..) => Err(ConvertError::Backend(
            "numeric comparison needs a field name".into(),
        )),
    }
}
