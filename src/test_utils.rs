//! Scripted upstream for exercising the collection loop without a network.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::UpstreamFetchError;
use crate::models::RawRecord;
use crate::pager::SourcePager;

pub fn record(text: &str) -> RawRecord {
    record_at(text, 0)
}

pub fn record_at(text: &str, minutes: i64) -> RawRecord {
    let base = DateTime::from_timestamp(1_705_315_200, 0).unwrap_or_default();
    RawRecord {
        text: text.to_string(),
        numeric_metric: 1.5,
        recommended: minutes % 2 == 0,
        timestamp: base + Duration::minutes(minutes),
    }
}

pub fn review_text(target_id: &str, i: usize) -> String {
    format!("Review {} of {}: the combat loop stays fresh for hours", i, target_id)
}

pub fn noise_text(i: usize) -> String {
    format!("!!!???*** {} ***???!!!", i)
}

pub enum ScriptedSource {
    /// Unlimited supply. Within every run of five records, the first
    /// `noisy_per_five` fail the quality filter.
    Endless { noisy_per_five: usize },
    Fixed(Vec<RawRecord>),
    /// Returns everything from the offset on, whatever the batch size.
    IgnoresBatchSize(Vec<RawRecord>),
    /// Fails with an upstream error on the given 1-based call for this target.
    FailingAt { call: usize, inner: Box<ScriptedSource> },
}

impl ScriptedSource {
    fn page(
        &self,
        target_id: &str,
        offset: usize,
        batch_size: usize,
        call: usize,
    ) -> Result<Vec<RawRecord>, UpstreamFetchError> {
        match self {
            ScriptedSource::Endless { noisy_per_five } => Ok((offset..offset + batch_size)
                .map(|i| {
                    if i % 5 < *noisy_per_five {
                        record_at(&noise_text(i), i as i64)
                    } else {
                        record_at(&review_text(target_id, i), i as i64)
                    }
                })
                .collect()),
            ScriptedSource::Fixed(all) => {
                Ok(all.iter().skip(offset).take(batch_size).cloned().collect())
            }
            ScriptedSource::IgnoresBatchSize(all) => Ok(all.iter().skip(offset).cloned().collect()),
            ScriptedSource::FailingAt { call: at, inner } => {
                if call == *at {
                    Err(UpstreamFetchError::Status {
                        status: 502,
                        url: format!("scripted://{}", target_id),
                    })
                } else {
                    inner.page(target_id, offset, batch_size, call)
                }
            }
        }
    }
}

#[derive(Default)]
pub struct ScriptedPager {
    sources: HashMap<String, ScriptedSource>,
    call_counts: HashMap<String, usize>,
    /// Every fetch as (target, offset, batch_size).
    pub calls: Vec<(String, usize, usize)>,
}

impl ScriptedPager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target_id: &str, source: ScriptedSource) -> Self {
        self.sources.insert(target_id.to_string(), source);
        self
    }

    pub fn calls_for(&self, target_id: &str) -> usize {
        self.call_counts.get(target_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SourcePager for ScriptedPager {
    async fn fetch(
        &mut self,
        target_id: &str,
        offset: usize,
        batch_size: usize,
    ) -> Result<Vec<RawRecord>, UpstreamFetchError> {
        let call = {
            let n = self.call_counts.entry(target_id.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        self.calls.push((target_id.to_string(), offset, batch_size));
        match self.sources.get(target_id) {
            Some(source) => source.page(target_id, offset, batch_size, call),
            None => Ok(Vec::new()),
        }
    }
}
