//! Declarative rule filter: `level>=high,status=stable,logsource=windows`.
//!
//! Clauses are separated by commas and AND-linked. Spaces are ignored.

use std::str::FromStr;

use thiserror::Error;

use crate::ast::{Level, SigmaRule, Status};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("empty clause in filter expression")]
    EmptyClause,

    #[error("unknown filter clause '{0}'")]
    UnknownClause(String),

    #[error("unknown level '{0}' in filter")]
    UnknownLevel(String),

    #[error("unknown status '{0}' in filter")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelBound {
    AtMost(Level),
    AtLeast(Level),
    Exactly(Level),
}

impl LevelBound {
    fn accepts(self, level: Level) -> bool {
        match self {
            LevelBound::AtMost(l) => level <= l,
            LevelBound::AtLeast(l) => level >= l,
            LevelBound::Exactly(l) => level == l,
        }
    }
}

/// A compiled filter. The default filter accepts every rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFilter {
    levels: Vec<LevelBound>,
    status: Option<Status>,
    logsources: Vec<String>,
}

impl RuleFilter {
    /// Compile optional filter text; `None` gives the accept-all filter.
    pub fn compile(expr: Option<&str>) -> Result<Self, FilterError> {
        match expr {
            Some(text) => text.parse(),
            None => Ok(RuleFilter::default()),
        }
    }

    pub fn matches(&self, rule: &SigmaRule) -> bool {
        if !self.levels.is_empty() {
            match rule.level {
                Some(level) if level != Level::Informational => {
                    if !self.levels.iter().all(|b| b.accepts(level)) {
                        return false;
                    }
                }
                _ => return false,
            }
        }

        if let Some(status) = self.status
            && rule.status != Some(status)
        {
            return false;
        }

        // a clause matches when some attribute value contains it
        self.logsources
            .iter()
            .all(|wanted| rule.logsource.values().any(|v| v.contains(wanted.as_str())))
    }
}

impl FromStr for RuleFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut filter = RuleFilter::default();

        for raw in s.split(',') {
            let clause: String = raw.chars().filter(|c| *c != ' ').collect();
            if clause.is_empty() {
                return Err(FilterError::EmptyClause);
            }

            if let Some(rest) = clause.strip_prefix("level") {
                let bound = if let Some(v) = rest.strip_prefix("<=") {
                    LevelBound::AtMost(filter_level(v)?)
                } else if let Some(v) = rest.strip_prefix(">=") {
                    LevelBound::AtLeast(filter_level(v)?)
                } else if let Some(v) = rest.strip_prefix('=') {
                    LevelBound::Exactly(filter_level(v)?)
                } else {
                    return Err(FilterError::UnknownClause(clause));
                };
                filter.levels.push(bound);
            } else if let Some(v) = clause.strip_prefix("status=") {
                let status = match v {
                    "experimental" => Status::Experimental,
                    "testing" => Status::Test,
                    "stable" => Status::Stable,
                    _ => return Err(FilterError::UnknownStatus(v.to_string())),
                };
                filter.status = Some(status);
            } else if let Some(v) = clause.strip_prefix("logsource=") {
                filter.logsources.push(v.to_string());
            } else {
                return Err(FilterError::UnknownClause(clause));
            }
        }

        Ok(filter)
    }
}

fn filter_level(s: &str) -> Result<Level, FilterError> {
    match s.parse::<Level>() {
        Ok(Level::Informational) | Err(()) => Err(FilterError::UnknownLevel(s.to_string())),
        Ok(level) => Ok(level),
    }
}
