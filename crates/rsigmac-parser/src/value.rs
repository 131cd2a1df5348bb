use std::fmt;

use serde::Serialize;

// =============================================================================
// SigmaString: string values with wildcard support
// =============================================================================
//
// `*` is a multi-character wildcard and `?` a single-character wildcard.
// A backslash escapes `*`, `?` and itself; before any other character it is
// an ordinary backslash, so Windows paths like `C:\Windows\` survive intact.

/// Wildcard characters that can appear in a Sigma string value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpecialChar {
    /// `*`
    WildcardMulti,
    /// `?`
    WildcardSingle,
}

/// A run of literal text or a single wildcard inside a [`SigmaString`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StringPart {
    Plain(String),
    Special(SpecialChar),
}

/// A Sigma string value split into literal text and wildcards.
///
/// Backends never see the escaped source text; they walk [`parts`] and
/// render literals and wildcards in their own syntax.
///
/// Equality compares [`parts`] only; two spellings of the same value are
/// equal.
///
/// [`parts`]: SigmaString::parts
#[derive(Debug, Clone, Serialize)]
pub struct SigmaString {
    pub parts: Vec<StringPart>,
    pub original: String,
}

impl PartialEq for SigmaString {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for SigmaString {}

impl SigmaString {
    /// Parse a rule value, treating `*` and `?` as wildcards.
    pub fn new(s: &str) -> Self {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = s.chars();

        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(next @ ('*' | '?' | '\\')) => literal.push(next),
                    Some(next) => {
                        literal.push('\\');
                        literal.push(next);
                    }
                    None => literal.push('\\'),
                },
                '*' | '?' => {
                    if !literal.is_empty() {
                        parts.push(StringPart::Plain(std::mem::take(&mut literal)));
                    }
                    parts.push(StringPart::Special(if c == '*' {
                        SpecialChar::WildcardMulti
                    } else {
                        SpecialChar::WildcardSingle
                    }));
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(StringPart::Plain(literal));
        }

        SigmaString {
            parts,
            original: s.to_string(),
        }
    }

    /// Take a value verbatim, without wildcard interpretation (`|re` values).
    pub fn from_raw(s: &str) -> Self {
        SigmaString {
            parts: if s.is_empty() {
                Vec::new()
            } else {
                vec![StringPart::Plain(s.to_string())]
            },
            original: s.to_string(),
        }
    }

    /// Build a string from parts, regenerating the escaped source form.
    pub fn from_parts(parts: Vec<StringPart>) -> Self {
        let mut original = String::new();
        for part in &parts {
            match part {
                StringPart::Plain(text) => {
                    for c in text.chars() {
                        if matches!(c, '*' | '?' | '\\') {
                            original.push('\\');
                        }
                        original.push(c);
                    }
                }
                StringPart::Special(SpecialChar::WildcardMulti) => original.push('*'),
                StringPart::Special(SpecialChar::WildcardSingle) => original.push('?'),
            }
        }
        SigmaString { parts, original }
    }

    pub fn is_plain(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, StringPart::Plain(_)))
    }

    pub fn contains_wildcards(&self) -> bool {
        !self.is_plain()
    }

    /// The literal content, or `None` when the value has wildcards.
    pub fn as_plain(&self) -> Option<String> {
        self.is_plain().then(|| self.literal_text())
    }

    /// Literal content with wildcards dropped.
    pub fn literal_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                StringPart::Plain(s) => Some(s.as_str()),
                StringPart::Special(_) => None,
            })
            .collect()
    }

    pub fn starts_with_wildcard(&self) -> bool {
        matches!(
            self.parts.first(),
            Some(StringPart::Special(SpecialChar::WildcardMulti))
        )
    }

    pub fn ends_with_wildcard(&self) -> bool {
        matches!(
            self.parts.last(),
            Some(StringPart::Special(SpecialChar::WildcardMulti))
        )
    }

    /// Add a leading and/or trailing `*` unless one is already there.
    ///
    /// This is how `contains`, `startswith` and `endswith` are expressed.
    pub fn with_wildcards(&self, leading: bool, trailing: bool) -> Self {
        let mut parts = self.parts.clone();
        if leading && !self.starts_with_wildcard() {
            parts.insert(0, StringPart::Special(SpecialChar::WildcardMulti));
        }
        if trailing && !self.ends_with_wildcard() {
            parts.push(StringPart::Special(SpecialChar::WildcardMulti));
        }
        SigmaString::from_parts(parts)
    }
}

impl fmt::Display for SigmaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

// =============================================================================
// SigmaValue: typed values in detection items
// =============================================================================

/// A typed value from a detection item or keyword list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SigmaValue {
    String(SigmaString),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl SigmaValue {
    pub fn from_yaml(v: &serde_yaml::Value) -> Self {
        match v {
            serde_yaml::Value::String(s) => SigmaValue::String(SigmaString::new(s)),
            serde_yaml::Value::Number(n) => match n.as_i64() {
                Some(i) => SigmaValue::Integer(i),
                None => n.as_f64().map_or(SigmaValue::Null, SigmaValue::Float),
            },
            serde_yaml::Value::Bool(b) => SigmaValue::Bool(*b),
            serde_yaml::Value::Null => SigmaValue::Null,
            serde_yaml::Value::Tagged(tagged) => SigmaValue::from_yaml(&tagged.value),
            other => SigmaValue::String(SigmaString::new(&format!("{other:?}"))),
        }
    }

    pub fn from_raw_string(s: &str) -> Self {
        SigmaValue::String(SigmaString::from_raw(s))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SigmaValue::Null)
    }

    /// Numeric view of the value; numeric strings are accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SigmaValue::Integer(i) => Some(*i as f64),
            SigmaValue::Float(f) => Some(*f),
            SigmaValue::String(s) => s.as_plain()?.trim().parse().ok(),
            SigmaValue::Bool(_) | SigmaValue::Null => None,
        }
    }
}

impl fmt::Display for SigmaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigmaValue::String(s) => write!(f, "{s}"),
            SigmaValue::Integer(n) => write!(f, "{n}"),
            SigmaValue::Float(n) => write!(f, "{n}"),
            SigmaValue::Bool(b) => write!(f, "{b}"),
            SigmaValue::Null => write!(f, "null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_string_has_no_wildcards() {
        let s = SigmaString::new("hello world");
        assert!(s.is_plain());
        assert_eq!(s.as_plain(), Some("hello world".to_string()));
    }

    #[test]
    fn wildcards_split_parts() {
        let s = SigmaString::new("*admin?");
        assert_eq!(
            s.parts,
            vec![
                StringPart::Special(SpecialChar::WildcardMulti),
                StringPart::Plain("admin".to_string()),
                StringPart::Special(SpecialChar::WildcardSingle),
            ]
        );
    }

    #[test]
    fn escaped_wildcard_is_literal() {
        let s = SigmaString::new(r"C:\Windows\*");
        assert!(s.is_plain());
        assert_eq!(s.as_plain(), Some(r"C:\Windows*".to_string()));
    }

    #[test]
    fn trailing_backslash_is_kept() {
        let s = SigmaString::new(r"C:\Temp\");
        assert_eq!(s.as_plain(), Some(r"C:\Temp\".to_string()));
    }

    #[test]
    fn with_wildcards_does_not_double_up() {
        let s = SigmaString::new("*cmd.exe").with_wildcards(true, true);
        assert_eq!(s.original, "*cmd.exe*");
        assert_eq!(s.parts.len(), 3);
    }

    #[test]
    fn from_parts_escapes_literal_specials() {
        let s = SigmaString::from_parts(vec![
            StringPart::Plain("a*b".to_string()),
            StringPart::Special(SpecialChar::WildcardMulti),
        ]);
        assert_eq!(s.original, r"a\*b*");
        assert_eq!(SigmaString::new(&s.original), s);
    }

    #[test]
    fn equality_ignores_spelling() {
        assert_eq!(SigmaString::new(r"C:\Temp"), SigmaString::new(r"C:\\Temp"));
        assert_ne!(SigmaString::new("a*"), SigmaString::new(r"a\*"));
    }

    #[test]
    fn numeric_view() {
        assert_eq!(SigmaValue::Integer(4688).as_f64(), Some(4688.0));
        assert_eq!(
            SigmaValue::String(SigmaString::new(" 12 ")).as_f64(),
            Some(12.0)
        );
        assert_eq!(SigmaValue::String(SigmaString::new("1*")).as_f64(), None);
        assert_eq!(SigmaValue::Null.as_f64(), None);
    }
}
