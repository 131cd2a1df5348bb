//! YAML to AST parser for Sigma rule files.
//!
//! Handles:
//! - Single-document YAML (one rule)
//! - Multi-document YAML (`---` separator, `action: global/reset/repeat`)
//! - Detection section parsing (named detections, field modifiers, values)
//!
//! Documents are parsed lazily by [`SigmaCollectionParser`], so a caller can
//! act on the rules that precede a broken document.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::ast::*;
use crate::condition::parse_condition;
use crate::error::{Result, SigmaParserError};
use crate::value::SigmaValue;

// =============================================================================
// Public API
// =============================================================================

/// Lazily parses the rule documents of one YAML stream.
///
/// Yields one item per rule document. Action documents (`global`, `reset`)
/// yield nothing; empty documents are skipped. After the first error the
/// iterator is exhausted.
pub struct SigmaCollectionParser<'a> {
    documents: serde_yaml::Deserializer<'a>,
    global: Option<Value>,
    previous: Option<Value>,
    failed: bool,
}

impl<'a> SigmaCollectionParser<'a> {
    pub fn new(yaml: &'a str) -> Self {
        SigmaCollectionParser {
            documents: serde_yaml::Deserializer::from_str(yaml),
            global: None,
            previous: None,
            failed: false,
        }
    }

    /// Handle one raw document. `Ok(None)` means nothing to emit.
    fn process(&mut self, value: Value) -> Result<Option<SigmaRule>> {
        if value.is_null() {
            return Ok(None);
        }
        let Some(mapping) = value.as_mapping() else {
            return Err(SigmaParserError::InvalidRule(
                "document is not a YAML mapping".into(),
            ));
        };
        let action = mapping
            .get(val_key("action"))
            .map(|a| a.as_str().unwrap_or_default().to_string());

        let merged = match action {
            Some(action) => {
                let body = without_action(value);
                match action.as_str() {
                    "global" => {
                        self.global = Some(body);
                        return Ok(None);
                    }
                    "reset" => {
                        self.global = None;
                        return Ok(None);
                    }
                    "repeat" => {
                        let previous = self.previous.clone().ok_or_else(|| {
                            SigmaParserError::InvalidRule(
                                "'action: repeat' without a previous document".into(),
                            )
                        })?;
                        deep_merge(previous, body)
                    }
                    other => return Err(SigmaParserError::InvalidAction(other.to_string())),
                }
            }
            None => match &self.global {
                Some(global) => deep_merge(global.clone(), value),
                None => value,
            },
        };

        self.previous = Some(merged.clone());
        parse_document(&merged).map(Some)
    }
}

impl Iterator for SigmaCollectionParser<'_> {
    type Item = Result<SigmaRule>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed {
            let doc = self.documents.next()?;
            let outcome = Value::deserialize(doc)
                .map_err(SigmaParserError::from)
                .and_then(|value| self.process(value));
            match outcome {
                Ok(Some(rule)) => return Some(Ok(rule)),
                Ok(None) => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Parse a whole YAML stream, failing on the first bad document.
pub fn parse_sigma_yaml(yaml: &str) -> Result<SigmaCollection> {
    let rules = SigmaCollectionParser::new(yaml).collect::<Result<Vec<_>>>()?;
    Ok(SigmaCollection { rules })
}

// =============================================================================
// Document dispatch
// =============================================================================

fn parse_document(value: &Value) -> Result<SigmaRule> {
    let m = value
        .as_mapping()
        .ok_or_else(|| SigmaParserError::InvalidRule("document is not a YAML mapping".into()))?;

    // Meta-rules have no detection of their own to convert.
    for kind in ["correlation", "filter"] {
        if m.contains_key(val_key(kind)) {
            return Err(SigmaParserError::UnsupportedDocument(kind.to_string()));
        }
    }

    parse_detection_rule(m)
}

// =============================================================================
// Detection Rule Parsing
// =============================================================================

fn parse_detection_rule(m: &Mapping) -> Result<SigmaRule> {
    let title = get_str(m, "title")
        .ok_or_else(|| SigmaParserError::MissingField("title".into()))?
        .to_string();

    let detection_val = m
        .get(val_key("detection"))
        .ok_or_else(|| SigmaParserError::MissingField("detection".into()))?;
    let detection = parse_detections(detection_val)?;

    let logsource = m
        .get(val_key("logsource"))
        .map(parse_logsource)
        .transpose()?
        .unwrap_or_default();

    let level = match get_str(m, "level") {
        Some(s) => Some(
            s.parse()
                .map_err(|_| SigmaParserError::InvalidRule(format!("unknown level '{s}'")))?,
        ),
        None => None,
    };

    Ok(SigmaRule {
        title,
        logsource,
        detection,
        id: get_str(m, "id").map(|s| s.to_string()),
        status: get_str(m, "status").and_then(|s| s.parse().ok()),
        description: get_str(m, "description").map(|s| s.to_string()),
        author: get_str(m, "author").map(|s| s.to_string()),
        references: get_str_list(m, "references"),
        date: get_scalar(m, "date"),
        modified: get_scalar(m, "modified"),
        fields: get_str_list(m, "fields"),
        falsepositives: get_str_list(m, "falsepositives"),
        level,
        tags: get_str_list(m, "tags"),
    })
}

// =============================================================================
// Detection Section Parsing
// =============================================================================

fn parse_detections(value: &Value) -> Result<Detections> {
    let m = value.as_mapping().ok_or_else(|| {
        SigmaParserError::InvalidDetection("detection section must be a mapping".into())
    })?;

    let condition_val = m
        .get(val_key("condition"))
        .ok_or_else(|| SigmaParserError::MissingField("condition".into()))?;

    let condition_strings: Vec<&str> = match condition_val {
        Value::String(s) => vec![s.as_str()],
        Value::Sequence(seq) if !seq.is_empty() => seq
            .iter()
            .map(|v| {
                v.as_str().ok_or_else(|| {
                    SigmaParserError::InvalidDetection("condition list must hold strings".into())
                })
            })
            .collect::<Result<Vec<_>>>()?,
        _ => {
            return Err(SigmaParserError::InvalidDetection(
                "condition must be a string or a non-empty list of strings".into(),
            ));
        }
    };

    let conditions = condition_strings
        .iter()
        .map(|s| parse_condition(s))
        .collect::<Result<Vec<_>>>()?;

    let timeframe = get_scalar(m, "timeframe");

    let mut named = IndexMap::new();
    for (key, val) in m {
        let name = key.as_str().ok_or_else(|| {
            SigmaParserError::InvalidDetection(format!("detection name {key:?} is not a string"))
        })?;
        if name == "condition" || name == "timeframe" {
            continue;
        }
        named.insert(name.to_string(), parse_detection(val)?);
    }

    for cond in &conditions {
        for ident in cond.expr.identifiers() {
            if !named.contains_key(ident) {
                return Err(SigmaParserError::UnknownDetection(ident.to_string()));
            }
        }
    }

    Ok(Detections {
        named,
        conditions,
        timeframe,
    })
}

/// Parse a single named detection.
///
/// A mapping gives AND-linked items, a list of plain values gives keywords,
/// and a list containing mappings gives OR-linked sub-detections.
fn parse_detection(value: &Value) -> Result<Detection> {
    match value {
        Value::Mapping(m) => {
            let items = m
                .iter()
                .map(|(k, v)| {
                    let key = k.as_str().ok_or_else(|| {
                        SigmaParserError::InvalidDetection(format!("field name {k:?} is not a string"))
                    })?;
                    parse_detection_item(key, v)
                })
                .collect::<Result<Vec<_>>>()?;
            if items.is_empty() {
                return Err(SigmaParserError::InvalidDetection(
                    "empty detection mapping".into(),
                ));
            }
            Ok(Detection::AllOf(items))
        }
        Value::Sequence(seq) => {
            if seq.is_empty() {
                return Err(SigmaParserError::InvalidDetection(
                    "empty detection list".into(),
                ));
            }
            if seq.iter().all(|v| !v.is_mapping() && !v.is_sequence()) {
                Ok(Detection::Keywords(
                    seq.iter().map(SigmaValue::from_yaml).collect(),
                ))
            } else {
                let subs = seq
                    .iter()
                    .map(parse_detection)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Detection::AnyOf(subs))
            }
        }
        Value::Tagged(tagged) => parse_detection(&tagged.value),
        _ => Ok(Detection::Keywords(vec![SigmaValue::from_yaml(value)])),
    }
}

fn parse_detection_item(key: &str, value: &Value) -> Result<DetectionItem> {
    let field = parse_field_spec(key)?;

    let values: Vec<SigmaValue> = match value {
        Value::Sequence(seq) => seq.iter().map(|v| to_sigma_value(v, &field)).collect(),
        _ => vec![to_sigma_value(value, &field)],
    };
    if values.is_empty() {
        return Err(SigmaParserError::InvalidDetection(format!(
            "field '{key}' has an empty value list"
        )));
    }

    Ok(DetectionItem { field, values })
}

/// `re` values are taken verbatim, without wildcard parsing.
fn to_sigma_value(v: &Value, field: &FieldSpec) -> SigmaValue {
    if field.has_modifier(Modifier::Re)
        && let Value::String(s) = v
    {
        return SigmaValue::from_raw_string(s);
    }
    SigmaValue::from_yaml(v)
}

/// Parse a detection key like `TargetObject|endswith` into a [`FieldSpec`].
pub fn parse_field_spec(key: &str) -> Result<FieldSpec> {
    let mut parts = key.split('|');
    let field = parts
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    let modifiers = parts
        .map(|m| {
            m.parse::<Modifier>()
                .map_err(|_| SigmaParserError::UnknownModifier(m.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FieldSpec::new(field, modifiers))
}

// =============================================================================
// Log Source Parsing
// =============================================================================

fn parse_logsource(value: &Value) -> Result<LogSource> {
    let m = value
        .as_mapping()
        .ok_or_else(|| SigmaParserError::InvalidRule("logsource must be a mapping".into()))?;

    let known_keys = ["category", "product", "service", "definition"];
    let mut custom = HashMap::new();
    for (k, v) in m {
        let key_str = k.as_str().unwrap_or_default();
        if !known_keys.contains(&key_str)
            && let Some(val_str) = v.as_str()
        {
            custom.insert(key_str.to_string(), val_str.to_string());
        }
    }

    Ok(LogSource {
        category: get_str(m, "category").map(|s| s.to_string()),
        product: get_str(m, "product").map(|s| s.to_string()),
        service: get_str(m, "service").map(|s| s.to_string()),
        definition: get_str(m, "definition").map(|s| s.to_string()),
        custom,
    })
}

// =============================================================================
// YAML Helpers
// =============================================================================

fn val_key(s: &str) -> Value {
    Value::String(s.to_string())
}

fn get_str<'a>(m: &'a Mapping, key: &str) -> Option<&'a str> {
    m.get(val_key(key)).and_then(|v| v.as_str())
}

/// String view of a scalar; unquoted dates and numbers are accepted.
fn get_scalar(m: &Mapping, key: &str) -> Option<String> {
    match m.get(val_key(key))? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A list of strings, or a single string as a one-element list.
fn get_str_list(m: &Mapping, key: &str) -> Vec<String> {
    match m.get(val_key(key)) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn without_action(mut value: Value) -> Value {
    if let Some(m) = value.as_mapping_mut() {
        m.remove(val_key("action"));
    }
    value
}

/// Deep-merge two YAML values; `src` wins, mappings merge recursively.
fn deep_merge(dest: Value, src: Value) -> Value {
    match (dest, src) {
        (Value::Mapping(mut dest_map), Value::Mapping(src_map)) => {
            for (k, v) in src_map {
                let merged = match dest_map.remove(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v,
                };
                dest_map.insert(k, merged);
            }
            Value::Mapping(dest_map)
        }
        (_, src) => src,
    }
}

// =============================================================================
// Tests
// =============================================================================
