//! JSON output format
//!
//! `--format json` prints one document holding every alert line and every
//! query result.

use serde::{Deserialize, Serialize};

/// Paths returned for one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonQueryResult {
    pub caller: String,
    pub responder: String,
    /// `yyyy-MM-dd HH:mm`
    pub minute: String,
    /// `P99` or `SR`
    pub metric: String,
    /// `a->b->c|ann1,ann2` strings; empty when nothing matched
    pub paths: Vec<String>,
}

/// Complete JSON output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonOutput {
    pub alerts: Vec<String>,
    pub queries: Vec<JsonQueryResult>,
}

impl JsonOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_alert(&mut self, alert: String) {
        self.alerts.push(alert);
    }

    pub fn add_query(&mut self, result: JsonQueryResult) {
        self.queries.push(result);
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
