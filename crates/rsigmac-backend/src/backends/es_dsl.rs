//! Elasticsearch query DSL. Queries are collected and printed as one JSON
//! array when the run finishes.

use serde_json::{Value, json};

use rsigmac_parser::SigmaRule;

use crate::backends::Backend;
use crate::backends::es_qs::QueryString;
use crate::config::SigmaConfig;
use crate::error::{ConvertError, Result};
use crate::options::BackendOptions;
use crate::query::QueryBuilder;
use crate::render::render;

pub struct EsDslBackend {
    builder: QueryBuilder,
    dialect: QueryString,
    pretty: bool,
    queries: Vec<Value>,
}

impl EsDslBackend {
    pub fn new(config: SigmaConfig, options: &BackendOptions) -> Self {
        EsDslBackend {
            builder: QueryBuilder::new(config),
            dialect: QueryString::new(options),
            pretty: options.flag("pretty"),
            queries: Vec::new(),
        }
    }
}

impl Backend for EsDslBackend {
    fn convert(&mut self, rule: &SigmaRule) -> Result<Vec<String>> {
        let indices = self.builder.config().indices(&rule.logsource);
        let mut converted = Vec::new();
        for q in self.builder.build(rule)? {
            if q.aggregation.is_some() {
                return Err(ConvertError::NotImplemented(
                    "aggregations are not implemented for es-dsl".into(),
                ));
            }
            let query_string = render(&self.dialect, &q.node)?;
            let mut doc = json!({
                "title": rule.title,
                "query": {
                    "bool": {
                        "must": [
                            { "query_string": { "query": query_string, "analyze_wildcard": true } }
                        ]
                    }
                }
            });
            if let Some(id) = &rule.id {
                doc["id"] = json!(id);
            }
            if !indices.is_empty() {
                doc["index"] = json!(indices);
            }
            converted.push(doc);
        }
        // nothing is emitted until finalize
        self.queries.extend(converted);
        Ok(Vec::new())
    }

    fn finalize(&mut self) -> Option<String> {
        if self.queries.is_empty() {
            return None;
        }
        let array = Value::Array(std::mem::take(&mut self.queries));
        let text = if self.pretty {
            serde_json::to_string_pretty(&array)
        } else {
            serde_json::to_string(&array)
        };
        match text {
            Ok(t) => Some(t),
            Err(e) => {
                log::error!("cannot serialize es-dsl output: {e}");
                None
            }
        }
    }
}
