use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use super::SourcePager;
use crate::error::UpstreamFetchError;
use crate::models::RawRecord;

/// Offline source backed by a JSON document mapping target id to records.
/// Targets missing from the document behave as an empty upstream.
#[derive(Debug, Default)]
pub struct FilePager {
    records: HashMap<String, Vec<RawRecord>>,
}

impl FilePager {
    pub fn new(records: HashMap<String, Vec<RawRecord>>) -> Self {
        FilePager { records }
    }

    pub fn from_json(json: &str) -> Result<Self, UpstreamFetchError> {
        let records = serde_json::from_str(json)
            .map_err(|e| UpstreamFetchError::Decode(e.to_string()))?;
        Ok(FilePager::new(records))
    }

    pub fn load(path: &Path) -> Result<Self, UpstreamFetchError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            UpstreamFetchError::Protocol(format!("cannot read {}: {}", path.display(), e))
        })?;
        let pager = Self::from_json(&json)?;
        info!(
            "Loaded offline source {} ({} targets)",
            path.display(),
            pager.records.len()
        );
        Ok(pager)
    }
}

#[async_trait]
impl SourcePager for FilePager {
    async fn fetch(
        &mut self,
        target_id: &str,
        offset: usize,
        batch_size: usize,
    ) -> Result<Vec<RawRecord>, UpstreamFetchError> {
        let page = self
            .records
            .get(target_id)
            .map(|all| {
                all.iter()
                    .skip(offset)
                    .take(batch_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page)
    }
}
