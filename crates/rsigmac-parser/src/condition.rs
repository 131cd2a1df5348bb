//! Condition parser built on a pest grammar and a Pratt parser.
//!
//! Handles strings like:
//! - `selection and not filter`
//! - `1 of selection_* and not 1 of filter_*`
//! - `all of them`
//! - `selection | count(TargetUser) by SourceIp > 10`

use pest::Parser;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

use crate::ast::{
    AggregateFunction, Aggregation, Condition, ConditionExpr, ConditionOperator, Quantifier,
    SelectorPattern,
};
use crate::error::{Result, SigmaParserError};

// ---------------------------------------------------------------------------
// Pest parser (generated from sigma.pest)
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[grammar = "src/sigma.pest"]
struct SigmaConditionParser;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse one condition line into its expression and optional aggregation.
///
/// ```
/// use rsigmac_parser::condition::parse_condition;
///
/// let cond = parse_condition("selection and not filter").unwrap();
/// assert!(cond.aggregation.is_none());
/// ```
pub fn parse_condition(input: &str) -> Result<Condition> {
    let mut pairs = SigmaConditionParser::parse(Rule::condition, input)
        .map_err(|e| SigmaParserError::Condition(e.to_string()))?;

    let pratt = PrattParser::new()
        .op(Op::infix(Rule::or_op, Assoc::Left))
        .op(Op::infix(Rule::and_op, Assoc::Left))
        .op(Op::prefix(Rule::not_op));

    let condition_pair = pairs
        .next()
        .ok_or_else(|| SigmaParserError::Condition(format!("empty condition '{input}'")))?;

    let mut expr = None;
    let mut aggregation = None;
    for p in condition_pair.into_inner() {
        match p.as_rule() {
            Rule::expr => expr = Some(parse_expr(p, &pratt)?),
            Rule::aggregation => aggregation = Some(parse_aggregation(p)?),
            _ => {} // EOI
        }
    }

    let expr = expr.ok_or_else(|| SigmaParserError::Condition(format!("no expression in '{input}'")))?;
    Ok(Condition { expr, aggregation })
}

// ---------------------------------------------------------------------------
// Boolean expression
// ---------------------------------------------------------------------------

fn parse_expr(pair: Pair<'_, Rule>, pratt: &PrattParser<Rule>) -> Result<ConditionExpr> {
    pratt
        .map_primary(|primary| match primary.as_rule() {
            Rule::ident => Ok(ConditionExpr::Identifier(primary.as_str().to_string())),
            Rule::selector => parse_selector(primary),
            Rule::expr => parse_expr(primary, pratt),
            other => unreachable!("unexpected primary rule: {other:?}"),
        })
        .map_prefix(|op, rhs| match op.as_rule() {
            Rule::not_op => Ok(ConditionExpr::Not(Box::new(rhs?))),
            other => unreachable!("unexpected prefix rule: {other:?}"),
        })
        .map_infix(|lhs, op, rhs| match op.as_rule() {
            Rule::and_op => Ok(merge_binary(ConditionExpr::And, lhs?, rhs?)),
            Rule::or_op => Ok(merge_binary(ConditionExpr::Or, lhs?, rhs?)),
            other => unreachable!("unexpected infix rule: {other:?}"),
        })
        .parse(pair.into_inner())
}

/// Flatten nested operators of the same kind: `a and (b and c)` becomes
/// `And(a, b, c)`.
fn merge_binary(
    ctor: fn(Vec<ConditionExpr>) -> ConditionExpr,
    lhs: ConditionExpr,
    rhs: ConditionExpr,
) -> ConditionExpr {
    let want_and = matches!(ctor(Vec::new()), ConditionExpr::And(_));
    let mut args = Vec::new();
    for side in [lhs, rhs] {
        match side {
            ConditionExpr::And(children) if want_and => args.extend(children),
            ConditionExpr::Or(children) if !want_and => args.extend(children),
            other => args.push(other),
        }
    }
    ctor(args)
}

fn parse_selector(pair: Pair<'_, Rule>) -> Result<ConditionExpr> {
    let mut quantifier = None;
    let mut pattern = None;

    // of_kw_inner leaks into the tree since atomic rules cannot be silent
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::quantifier => quantifier = Some(parse_quantifier(p)?),
            Rule::selector_target => pattern = parse_selector_target(p),
            _ => {}
        }
    }

    match (quantifier, pattern) {
        (Some(quantifier), Some(pattern)) => Ok(ConditionExpr::Selector {
            quantifier,
            pattern,
        }),
        _ => Err(SigmaParserError::Condition(
            "incomplete 'of' selector".to_string(),
        )),
    }
}

fn parse_quantifier(pair: Pair<'_, Rule>) -> Result<Quantifier> {
    let text = pair.as_str().to_string();
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| SigmaParserError::Condition(format!("bad quantifier '{text}'")))?;
    match inner.as_rule() {
        Rule::all_kw => Ok(Quantifier::All),
        Rule::any_kw => Ok(Quantifier::Any),
        Rule::uint => {
            let n: u64 = inner
                .as_str()
                .parse()
                .map_err(|_| SigmaParserError::Condition(format!("bad quantifier '{text}'")))?;
            match n {
                0 => Err(SigmaParserError::Condition(
                    "quantifier must be at least 1".to_string(),
                )),
                1 => Ok(Quantifier::Any),
                n => Ok(Quantifier::Count(n)),
            }
        }
        other => unreachable!("unexpected quantifier rule: {other:?}"),
    }
}

fn parse_selector_target(pair: Pair<'_, Rule>) -> Option<SelectorPattern> {
    let inner = pair.into_inner().next()?;
    match inner.as_rule() {
        Rule::them_kw => Some(SelectorPattern::Them),
        Rule::ident_pattern => Some(SelectorPattern::Pattern(inner.as_str().to_string())),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Aggregation suffix
// ---------------------------------------------------------------------------

fn parse_aggregation(pair: Pair<'_, Rule>) -> Result<Aggregation> {
    let text = pair.as_str().to_string();
    let bad = |what: &str| SigmaParserError::Condition(format!("{what} in aggregation '{text}'"));

    let mut function = None;
    let mut field = None;
    let mut group_by = None;
    let mut operator = None;
    let mut threshold = None;

    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::agg_function => function = p.as_str().parse::<AggregateFunction>().ok(),
            Rule::agg_field => field = Some(p.as_str().to_string()),
            Rule::agg_group => group_by = Some(p.as_str().to_string()),
            Rule::agg_op => operator = p.as_str().parse::<ConditionOperator>().ok(),
            Rule::agg_value => threshold = p.as_str().parse::<f64>().ok(),
            _ => {} // by_kw
        }
    }

    let function = function.ok_or_else(|| bad("unknown function"))?;
    if function != AggregateFunction::Count && field.is_none() {
        return Err(bad("missing field"));
    }

    Ok(Aggregation {
        function,
        field,
        group_by,
        operator: operator.ok_or_else(|| bad("unknown operator"))?,
        threshold: threshold.ok_or_else(|| bad("bad threshold"))?,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(input: &str) -> ConditionExpr {
        let cond = parse_condition(input).unwrap();
        assert!(cond.aggregation.is_none(), "unexpected aggregation");
        cond.expr
    }

    fn ident(name: &str) -> ConditionExpr {
        ConditionExpr::Identifier(name.to_string())
    }

    fn not(inner: ConditionExpr) -> ConditionExpr {
        ConditionExpr::Not(Box::new(inner))
    }

    fn any_of(pattern: &str) -> ConditionExpr {
        ConditionExpr::Selector {
            quantifier: Quantifier::Any,
            pattern: SelectorPattern::Pattern(pattern.to_string()),
        }
    }

    #[test]
    fn test_simple_identifier() {
        assert_eq!(expr("selection"), ident("selection"));
    }

    #[test]
    fn test_and_not() {
        assert_eq!(
            expr("selection and not filter"),
            ConditionExpr::And(vec![ident("selection"), not(ident("filter"))])
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            expr("sel1 OR sel2"),
            ConditionExpr::Or(vec![ident("sel1"), ident("sel2")])
        );
    }

    #[test]
    fn test_precedence_not_and_or() {
        assert_eq!(
            expr("a or not b and c"),
            ConditionExpr::Or(vec![
                ident("a"),
                ConditionExpr::And(vec![not(ident("b")), ident("c")]),
            ])
        );
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(
            expr("(a or b) and c"),
            ConditionExpr::And(vec![
                ConditionExpr::Or(vec![ident("a"), ident("b")]),
                ident("c"),
            ])
        );
    }

    #[test]
    fn test_flattening() {
        assert_eq!(
            expr("a and b and c"),
            ConditionExpr::And(vec![ident("a"), ident("b"), ident("c")])
        );
        assert_eq!(
            expr("a or (b or c)"),
            ConditionExpr::Or(vec![ident("a"), ident("b"), ident("c")])
        );
    }

    #[test]
    fn test_identifier_with_keyword_substring() {
        assert_eq!(expr("selection_and_filter"), ident("selection_and_filter"));
        assert_eq!(expr("notepad"), ident("notepad"));
    }

    #[test]
    fn test_selectors() {
        assert_eq!(
            expr("selection_main and 1 of selection_dword_* and not 1 of filter_*"),
            ConditionExpr::And(vec![
                ident("selection_main"),
                any_of("selection_dword_*"),
                not(any_of("filter_*")),
            ])
        );
        assert_eq!(
            expr("all of them"),
            ConditionExpr::Selector {
                quantifier: Quantifier::All,
                pattern: SelectorPattern::Them,
            }
        );
        assert_eq!(expr("any of sel*"), any_of("sel*"));
        assert_eq!(
            expr("3 of selection_*"),
            ConditionExpr::Selector {
                quantifier: Quantifier::Count(3),
                pattern: SelectorPattern::Pattern("selection_*".to_string()),
            }
        );
    }

    #[test]
    fn test_them_prefix_is_a_pattern() {
        assert_eq!(expr("1 of themes*"), any_of("themes*"));
    }

    #[test]
    fn test_count_aggregation() {
        let cond = parse_condition("selection | count() by SourceIp > 10").unwrap();
        assert_eq!(cond.expr, ident("selection"));
        assert_eq!(
            cond.aggregation,
            Some(Aggregation {
                function: AggregateFunction::Count,
                field: None,
                group_by: Some("SourceIp".to_string()),
                operator: ConditionOperator::Gt,
                threshold: 10.0,
            })
        );
    }

    #[test]
    fn test_count_distinct_field_aggregation() {
        let cond = parse_condition("sel and not filter | count(TargetUser) >= 3").unwrap();
        let agg = cond.aggregation.unwrap();
        assert_eq!(agg.field.as_deref(), Some("TargetUser"));
        assert_eq!(agg.group_by, None);
        assert_eq!(agg.operator, ConditionOperator::Gte);
    }

    #[test]
    fn test_aggregation_needs_field_for_non_count() {
        let err = parse_condition("sel | max() > 3").unwrap_err();
        assert!(matches!(err, SigmaParserError::Condition(_)));
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["", "sel and", "(sel", "sel or or other", "0 of sel*", "sel | near x"] {
            assert!(parse_condition(bad).is_err(), "accepted {bad:?}");
        }
    }
}
