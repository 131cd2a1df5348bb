//! AST types for Sigma detection rules: metadata, detections, conditions
//! and legacy aggregation expressions.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;

use crate::value::SigmaValue;

// =============================================================================
// Enumerations
// =============================================================================

/// Rule maturity status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Stable,
    Test,
    Experimental,
    Deprecated,
    Unsupported,
}

impl FromStr for Status {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stable" => Ok(Status::Stable),
            // older rules spell it "testing"
            "test" | "testing" => Ok(Status::Test),
            "experimental" => Ok(Status::Experimental),
            "deprecated" => Ok(Status::Deprecated),
            "unsupported" => Ok(Status::Unsupported),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Stable => "stable",
            Status::Test => "test",
            Status::Experimental => "experimental",
            Status::Deprecated => "deprecated",
            Status::Unsupported => "unsupported",
        })
    }
}

/// Severity level of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for Level {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "informational" => Ok(Level::Informational),
            "low" => Ok(Level::Low),
            "medium" => Ok(Level::Medium),
            "high" => Ok(Level::High),
            "critical" => Ok(Level::Critical),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Informational => "informational",
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
            Level::Critical => "critical",
        })
    }
}

// =============================================================================
// Field Modifiers
// =============================================================================

/// Field modifiers recognised in detection keys (`Field|mod1|mod2`).
///
/// Parsing accepts every modifier a rule may legally carry; whether a
/// backend can express it is decided at conversion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Contains,
    StartsWith,
    EndsWith,
    All,
    Base64,
    Base64Offset,
    Wide,
    WindAsh,
    Re,
    Cidr,
    Cased,
    Exists,
    Expand,
    FieldRef,
    Gt,
    Gte,
    Lt,
    Lte,
    #[serde(rename = "i")]
    IgnoreCase,
    #[serde(rename = "m")]
    Multiline,
    #[serde(rename = "s")]
    DotAll,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl FromStr for Modifier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let m = match s {
            "contains" => Modifier::Contains,
            "startswith" => Modifier::StartsWith,
            "endswith" => Modifier::EndsWith,
            "all" => Modifier::All,
            "base64" => Modifier::Base64,
            "base64offset" => Modifier::Base64Offset,
            "wide" | "utf16le" => Modifier::Wide,
            "windash" => Modifier::WindAsh,
            "re" => Modifier::Re,
            "cidr" => Modifier::Cidr,
            "cased" => Modifier::Cased,
            "exists" => Modifier::Exists,
            "expand" => Modifier::Expand,
            "fieldref" => Modifier::FieldRef,
            "gt" => Modifier::Gt,
            "gte" => Modifier::Gte,
            "lt" => Modifier::Lt,
            "lte" => Modifier::Lte,
            "i" | "ignorecase" => Modifier::IgnoreCase,
            "m" | "multiline" => Modifier::Multiline,
            "s" | "dotall" => Modifier::DotAll,
            "minute" => Modifier::Minute,
            "hour" => Modifier::Hour,
            "day" => Modifier::Day,
            "week" => Modifier::Week,
            "month" => Modifier::Month,
            "year" => Modifier::Year,
            _ => return Err(()),
        };
        Ok(m)
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Modifier::Contains => "contains",
            Modifier::StartsWith => "startswith",
            Modifier::EndsWith => "endswith",
            Modifier::All => "all",
            Modifier::Base64 => "base64",
            Modifier::Base64Offset => "base64offset",
            Modifier::Wide => "wide",
            Modifier::WindAsh => "windash",
            Modifier::Re => "re",
            Modifier::Cidr => "cidr",
            Modifier::Cased => "cased",
            Modifier::Exists => "exists",
            Modifier::Expand => "expand",
            Modifier::FieldRef => "fieldref",
            Modifier::Gt => "gt",
            Modifier::Gte => "gte",
            Modifier::Lt => "lt",
            Modifier::Lte => "lte",
            Modifier::IgnoreCase => "i",
            Modifier::Multiline => "m",
            Modifier::DotAll => "s",
            Modifier::Minute => "minute",
            Modifier::Hour => "hour",
            Modifier::Day => "day",
            Modifier::Week => "week",
            Modifier::Month => "month",
            Modifier::Year => "year",
        })
    }
}

// =============================================================================
// Field Specification
// =============================================================================

/// A field name with its modifiers, parsed from keys like `Image|endswith`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// `None` for keyword items (a bare `|contains` key).
    pub name: Option<String>,
    pub modifiers: Vec<Modifier>,
}

impl FieldSpec {
    pub fn new(name: Option<String>, modifiers: Vec<Modifier>) -> Self {
        FieldSpec { name, modifiers }
    }

    pub fn has_modifier(&self, m: Modifier) -> bool {
        self.modifiers.contains(&m)
    }

    pub fn is_keyword(&self) -> bool {
        self.name.is_none()
    }
}

// =============================================================================
// Condition Expression AST
// =============================================================================

/// Boolean part of a condition, e.g. `selection and not 1 of filter_*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConditionExpr {
    And(Vec<ConditionExpr>),
    Or(Vec<ConditionExpr>),
    Not(Box<ConditionExpr>),
    /// Reference to a named detection.
    Identifier(String),
    /// `1 of selection_*`, `all of them`, ...
    Selector {
        quantifier: Quantifier,
        pattern: SelectorPattern,
    },
}

impl ConditionExpr {
    /// Every detection name referenced directly (selectors excluded).
    pub fn identifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ConditionExpr::Identifier(name) => out.push(name),
            ConditionExpr::And(args) | ConditionExpr::Or(args) => {
                for a in args {
                    a.collect_identifiers(out);
                }
            }
            ConditionExpr::Not(inner) => inner.collect_identifiers(out),
            ConditionExpr::Selector { .. } => {}
        }
    }
}

impl fmt::Display for ConditionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionExpr::And(args) => {
                let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "({})", parts.join(" and "))
            }
            ConditionExpr::Or(args) => {
                let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "({})", parts.join(" or "))
            }
            ConditionExpr::Not(arg) => write!(f, "not {arg}"),
            ConditionExpr::Identifier(id) => write!(f, "{id}"),
            ConditionExpr::Selector {
                quantifier,
                pattern,
            } => write!(f, "{quantifier} of {pattern}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Quantifier {
    /// `1 of` / `any of`
    Any,
    /// `all of`
    All,
    /// `N of` with N > 1
    Count(u64),
}

impl fmt::Display for Quantifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantifier::Any => write!(f, "1"),
            Quantifier::All => write!(f, "all"),
            Quantifier::Count(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SelectorPattern {
    /// `them`: every detection not starting with `_`.
    Them,
    /// A name pattern where `*` matches any run of characters.
    Pattern(String),
}

impl SelectorPattern {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            SelectorPattern::Them => !name.starts_with('_'),
            SelectorPattern::Pattern(p) => glob_match(p, name),
        }
    }
}

impl fmt::Display for SelectorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorPattern::Them => write!(f, "them"),
            SelectorPattern::Pattern(p) => write!(f, "{p}"),
        }
    }
}

fn glob_match(pattern: &str, name: &str) -> bool {
    let Some((first, rest)) = pattern.split_once('*') else {
        return pattern == name;
    };
    let Some(mut remaining) = name.strip_prefix(first) else {
        return false;
    };
    let mut pieces: Vec<&str> = rest.split('*').collect();
    let last = pieces.pop().unwrap_or("");
    for piece in pieces {
        match remaining.find(piece) {
            Some(pos) => remaining = &remaining[pos + piece.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last)
}

// =============================================================================
// Aggregations (legacy `| count() by x > 5` suffix)
// =============================================================================

/// Comparison operator used by aggregations and numeric modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConditionOperator {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

impl ConditionOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            ConditionOperator::Lt => "<",
            ConditionOperator::Lte => "<=",
            ConditionOperator::Gt => ">",
            ConditionOperator::Gte => ">=",
            ConditionOperator::Eq => "=",
        }
    }
}

impl FromStr for ConditionOperator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(ConditionOperator::Lt),
            "<=" => Ok(ConditionOperator::Lte),
            ">" => Ok(ConditionOperator::Gt),
            ">=" => Ok(ConditionOperator::Gte),
            "=" | "==" => Ok(ConditionOperator::Eq),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Min,
    Max,
    Avg,
    Sum,
}

impl FromStr for AggregateFunction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "count" => Ok(AggregateFunction::Count),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            "avg" => Ok(AggregateFunction::Avg),
            "sum" => Ok(AggregateFunction::Sum),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Sum => "sum",
        })
    }
}

/// `count(field) by group > threshold`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub function: AggregateFunction,
    pub field: Option<String>,
    pub group_by: Option<String>,
    pub operator: ConditionOperator,
    pub threshold: f64,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})",
            self.function,
            self.field.as_deref().unwrap_or("")
        )?;
        if let Some(group) = &self.group_by {
            write!(f, " by {group}")?;
        }
        write!(f, " {} {}", self.operator, self.threshold)
    }
}

/// One full condition line: the boolean expression plus an optional
/// aggregation suffix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub expr: ConditionExpr,
    pub aggregation: Option<Aggregation>,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(agg) = &self.aggregation {
            write!(f, " | {agg}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Detection Section
// =============================================================================

/// A field (with modifiers) mapped to one or more values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionItem {
    pub field: FieldSpec,
    pub values: Vec<SigmaValue>,
}

/// A named detection.
///
/// A YAML mapping gives AND-linked items, a list of mappings gives
/// OR-linked sub-detections, a list of scalars gives keywords.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Detection {
    AllOf(Vec<DetectionItem>),
    AnyOf(Vec<Detection>),
    Keywords(Vec<SigmaValue>),
}

/// The `detection:` section of a rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detections {
    /// Named detections in document order.
    pub named: IndexMap<String, Detection>,
    pub conditions: Vec<Condition>,
    /// Aggregation window such as `5m`; no backend can express it.
    pub timeframe: Option<String>,
}

// =============================================================================
// Log Source
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSource {
    pub category: Option<String>,
    pub product: Option<String>,
    pub service: Option<String>,
    pub definition: Option<String>,
    #[serde(flatten)]
    pub custom: HashMap<String, String>,
}

impl LogSource {
    /// Every attribute value, standard keys first.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        [&self.category, &self.product, &self.service, &self.definition]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .chain(self.custom.values().map(String::as_str))
    }
}

// =============================================================================
// Sigma Detection Rule
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SigmaRule {
    pub title: String,
    pub logsource: LogSource,
    pub detection: Detections,

    pub id: Option<String>,
    pub status: Option<Status>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub references: Vec<String>,
    pub date: Option<String>,
    pub modified: Option<String>,
    pub fields: Vec<String>,
    pub falsepositives: Vec<String>,
    pub level: Option<Level>,
    pub tags: Vec<String>,
}

/// Rules parsed from one YAML stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SigmaCollection {
    pub rules: Vec<SigmaRule>,
}

impl SigmaCollection {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
