//! Lists every (mapped) field name referenced by the converted rules.

use std::collections::BTreeSet;

use rsigmac_parser::SigmaRule;

use crate::backends::Backend;
use crate::config::SigmaConfig;
use crate::error::Result;
use crate::query::QueryBuilder;

pub struct FieldListBackend {
    builder: QueryBuilder,
    fields: BTreeSet<String>,
}

impl FieldListBackend {
    pub fn new(config: SigmaConfig) -> Self {
        FieldListBackend {
            builder: QueryBuilder::new(config),
            fields: BTreeSet::new(),
        }
    }
}

impl Backend for FieldListBackend {
    fn convert(&mut self, rule: &SigmaRule) -> Result<Vec<String>> {
        for q in self.builder.build(rule)? {
            q.node.fields(&mut self.fields);
            if let Some(agg) = &q.aggregation {
                self.fields.extend(agg.field.iter().cloned());
                self.fields.extend(agg.group_by.iter().cloned());
            }
        }
        Ok(Vec::new())
    }

    fn finalize(&mut self) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }
        let fields = std::mem::take(&mut self.fields);
        Some(fields.into_iter().collect::<Vec<_>>().join("\n"))
    }
}
