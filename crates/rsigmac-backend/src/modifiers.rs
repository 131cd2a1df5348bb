//! Field modifier interpretation.
//!
//! A detection value plus its modifiers becomes one or more [`Match`]es:
//! wildcard-extended strings, encoded variants, regexes, networks or numeric
//! comparisons. Everything a backend cannot express in any query language is
//! rejected here with `NotSupported`.

use base64::Engine as Base64Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use ipnet::IpNet;

use rsigmac_parser::{ConditionOperator, Modifier, SigmaString, SigmaValue, StringPart};

use crate::error::{ConvertError, Result};
use crate::query::{QueryNode, QueryValue};

/// Replacements for `-` under `windash`.
const WINDASH_CHARS: [char; 2] = ['-', '/'];

/// 2^8 variants per value is the most a query should carry.
const MAX_WINDASH_DASHES: usize = 8;

/// One leaf produced from a detection value.
#[derive(Debug, Clone, PartialEq)]
pub enum Match {
    Value(QueryValue),
    Compare(ConditionOperator, f64),
}

// =============================================================================
// Modifier context
// =============================================================================

/// Modifier flags of a single field specification.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModCtx {
    contains: bool,
    startswith: bool,
    endswith: bool,
    pub all: bool,
    base64: bool,
    base64offset: bool,
    wide: bool,
    windash: bool,
    re: bool,
    cidr: bool,
    pub exists: bool,
    compare: Option<ConditionOperator>,
    ignore_case: bool,
    multiline: bool,
    dotall: bool,
}

impl ModCtx {
    pub fn from_modifiers(modifiers: &[Modifier]) -> Result<Self> {
        let mut ctx = ModCtx::default();
        for m in modifiers {
            match m {
                Modifier::Contains => ctx.contains = true,
                Modifier::StartsWith => ctx.startswith = true,
                Modifier::EndsWith => ctx.endswith = true,
                Modifier::All => ctx.all = true,
                Modifier::Base64 => ctx.base64 = true,
                Modifier::Base64Offset => ctx.base64offset = true,
                Modifier::Wide => ctx.wide = true,
                Modifier::WindAsh => ctx.windash = true,
                Modifier::Re => ctx.re = true,
                Modifier::Cidr => ctx.cidr = true,
                Modifier::Exists => ctx.exists = true,
                Modifier::Gt => ctx.compare = Some(ConditionOperator::Gt),
                Modifier::Gte => ctx.compare = Some(ConditionOperator::Gte),
                Modifier::Lt => ctx.compare = Some(ConditionOperator::Lt),
                Modifier::Lte => ctx.compare = Some(ConditionOperator::Lte),
                Modifier::IgnoreCase => ctx.ignore_case = true,
                Modifier::Multiline => ctx.multiline = true,
                Modifier::DotAll => ctx.dotall = true,
                Modifier::Cased
                | Modifier::Expand
                | Modifier::FieldRef
                | Modifier::Minute
                | Modifier::Hour
                | Modifier::Day
                | Modifier::Week
                | Modifier::Month
                | Modifier::Year => {
                    return Err(ConvertError::NotSupported(format!(
                        "modifier '{m}' has no query equivalent"
                    )));
                }
            }
        }
        if (ctx.ignore_case || ctx.multiline || ctx.dotall) && !ctx.re {
            return Err(ConvertError::Backend(
                "regex flags 'i', 'm' and 's' need the 're' modifier".into(),
            ));
        }
        Ok(ctx)
    }

    /// Combine per-value nodes: AND under `all`, OR otherwise.
    pub fn link(&self, nodes: Vec<QueryNode>) -> QueryNode {
        if self.all {
            QueryNode::and(nodes)
        } else {
            QueryNode::or(nodes)
        }
    }

    /// `Field|exists: false` asks for absence; anything else for presence.
    pub fn exists_flag(&self, values: &[SigmaValue]) -> bool {
        match values.first() {
            Some(SigmaValue::Bool(b)) => *b,
            Some(SigmaValue::String(s)) => !matches!(s.as_plain().as_deref(), Some("false" | "no")),
            _ => true,
        }
    }

    /// Every leaf a single value expands to, OR-linked by the caller.
    pub fn expand(&self, value: &SigmaValue) -> Result<Vec<Match>> {
        if let Some(op) = self.compare {
            let n = value.as_f64().ok_or_else(|| {
                ConvertError::Backend(format!("'{value}' is not a number for '{op}' comparison"))
            })?;
            return Ok(vec![Match::Compare(op, n)]);
        }

        if self.re {
            return Ok(vec![Match::Value(QueryValue::Regex(self.regex(value)))]);
        }

        if self.cidr {
            let net: IpNet = raw_text(value).trim().parse()?;
            return Ok(vec![Match::Value(QueryValue::Cidr(net))]);
        }

        let text = match value {
            SigmaValue::String(s) => s.clone(),
            SigmaValue::Null => return Ok(vec![Match::Value(QueryValue::Null)]),
            scalar if !self.transforms_strings() => {
                return Ok(vec![Match::Value(scalar_value(scalar))]);
            }
            scalar => SigmaString::from_parts(vec![StringPart::Plain(scalar.to_string())]),
        };

        let variants = if self.windash {
            expand_windash(&text.original)?
                .iter()
                .map(|v| SigmaString::new(v))
                .collect()
        } else {
            vec![text]
        };

        let mut out = Vec::new();
        for s in variants {
            for encoded in self.encode(&s)? {
                out.push(Match::Value(QueryValue::String(encoded)));
            }
        }
        if out.is_empty() {
            return Err(ConvertError::Backend(format!(
                "value '{value}' produces no query terms"
            )));
        }
        Ok(out)
    }

    fn transforms_strings(&self) -> bool {
        self.contains
            || self.startswith
            || self.endswith
            || self.base64
            || self.base64offset
            || self.wide
            || self.windash
    }

    fn regex(&self, value: &SigmaValue) -> String {
        let mut flags = String::new();
        if self.ignore_case {
            flags.push('i');
        }
        if self.multiline {
            flags.push('m');
        }
        if self.dotall {
            flags.push('s');
        }
        let pattern = raw_text(value);
        if flags.is_empty() {
            pattern
        } else {
            format!("(?{flags}){pattern}")
        }
    }

    /// Apply encodings, then the wildcard modifiers.
    fn encode(&self, s: &SigmaString) -> Result<Vec<SigmaString>> {
        if !(self.base64 || self.base64offset || self.wide) {
            return Ok(vec![self.wildcards(s)]);
        }
        if s.contains_wildcards() {
            return Err(ConvertError::NotSupported(format!(
                "wildcards cannot be encoded in '{s}'"
            )));
        }
        let text = s.literal_text();
        let bytes = if self.wide {
            to_utf16le_bytes(&text)
        } else {
            text.into_bytes()
        };

        if self.base64offset {
            // offset patterns are substrings by nature
            return Ok(base64_offset_patterns(&bytes)
                .into_iter()
                .map(|p| plain(p).with_wildcards(true, true))
                .collect());
        }
        if self.base64 {
            return Ok(vec![self.wildcards(&plain(BASE64_STANDARD.encode(&bytes)))]);
        }
        Err(ConvertError::NotSupported(
            "'wide' is only expressible together with base64 or base64offset".into(),
        ))
    }

    fn wildcards(&self, s: &SigmaString) -> SigmaString {
        let leading = self.contains || self.endswith;
        let trailing = self.contains || self.startswith;
        if leading || trailing {
            s.with_wildcards(leading, trailing)
        } else {
            s.clone()
        }
    }
}

// =============================================================================
// Value helpers
// =============================================================================

fn plain(text: String) -> SigmaString {
    SigmaString::from_parts(vec![StringPart::Plain(text)])
}

/// Source text of a value, wildcards and escapes untouched.
fn raw_text(value: &SigmaValue) -> String {
    match value {
        SigmaValue::String(s) => s.original.clone(),
        other => other.to_string(),
    }
}

fn scalar_value(value: &SigmaValue) -> QueryValue {
    match value {
        SigmaValue::String(s) => QueryValue::String(s.clone()),
        SigmaValue::Integer(n) => QueryValue::Integer(*n),
        SigmaValue::Float(n) => QueryValue::Float(*n),
        SigmaValue::Bool(b) => QueryValue::Bool(*b),
        SigmaValue::Null => QueryValue::Null,
    }
}

// =============================================================================
// Encoding helpers
// =============================================================================

fn to_utf16le_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// The three stable base64 fragments of `value` at byte offsets 0, 1 and 2.
///
/// Characters influenced by the unknown neighbouring bytes are cut from both
/// ends.
fn base64_offset_patterns(value: &[u8]) -> Vec<String> {
    const START: [usize; 3] = [0, 2, 3];
    const END_TRIM: [usize; 3] = [0, 3, 2];

    let mut patterns = Vec::with_capacity(3);
    for offset in 0..3usize {
        let mut padded = vec![0u8; offset];
        padded.extend_from_slice(value);
        let encoded = BASE64_STANDARD.encode(&padded);

        let start = START[offset];
        let end = encoded
            .len()
            .saturating_sub(END_TRIM[(value.len() + offset) % 3]);
        if start < end {
            patterns.push(encoded[start..end].to_string());
        }
    }
    patterns
}

/// Every spelling of `input` with each `-` replaced by `-` or `/`.
fn expand_windash(input: &str) -> Result<Vec<String>> {
    let dash_positions: Vec<usize> = input
        .char_indices()
        .filter(|(_, c)| *c == '-')
        .map(|(i, _)| i)
        .collect();

    let n = dash_positions.len();
    if n > MAX_WINDASH_DASHES {
        return Err(ConvertError::Backend(format!(
            "windash value '{input}' has {n} dashes, at most {MAX_WINDASH_DASHES} are allowed"
        )));
    }

    let total = WINDASH_CHARS.len().pow(n as u32);
    let mut variants = Vec::with_capacity(total);
    for combo in 0..total {
        let mut variant = input.to_string();
        let mut idx = combo;
        // back to front keeps earlier byte positions valid
        for &pos in dash_positions.iter().rev() {
            let replacement = WINDASH_CHARS[idx % WINDASH_CHARS.len()];
            variant.replace_range(pos..pos + 1, replacement.encode_utf8(&mut [0; 4]));
            idx /= WINDASH_CHARS.len();
        }
        variants.push(variant);
    }
    Ok(variants)
}

// =============================================================================
// Tests
// =============================================================================
