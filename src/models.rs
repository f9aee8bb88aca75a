use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of collection, e.g. a single game on the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionTarget {
    pub id: String,
    pub display_name: String,
}

impl CollectionTarget {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        CollectionTarget {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A record as it arrives from upstream, before filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    pub text: String,
    /// Hours played at review time.
    pub numeric_metric: f64,
    pub recommended: bool,
    pub timestamp: DateTime<Utc>,
}

/// A raw record that survived quality filtering and dedup, tagged with its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedRecord {
    pub target_id: String,
    pub target_display_name: String,
    pub text: String,
    pub numeric_metric: f64,
    pub recommended: bool,
    pub timestamp: DateTime<Utc>,
}

impl AcceptedRecord {
    pub fn from_raw(target: &CollectionTarget, raw: RawRecord) -> Self {
        AcceptedRecord {
            target_id: target.id.clone(),
            target_display_name: target.display_name.clone(),
            text: raw.text,
            numeric_metric: raw.numeric_metric,
            recommended: raw.recommended,
            timestamp: raw.timestamp,
        }
    }
}
