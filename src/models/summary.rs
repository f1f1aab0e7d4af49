use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSummary {
    pub summary: String,
    #[serde(default)]
    pub footnotes: Vec<Value>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

/// Article id to generated summary.
pub type AiSummaries = BTreeMap<String, AiSummary>;
