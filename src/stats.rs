use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// How a target's collection loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetOutcome {
    TargetMet,
    Exhausted,
    BoundExceeded,
    FetchFailed,
}

impl TargetOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetOutcome::TargetMet => "TARGET_MET",
            TargetOutcome::Exhausted => "EXHAUSTED",
            TargetOutcome::BoundExceeded => "BOUND_EXCEEDED",
            TargetOutcome::FetchFailed => "FETCH_FAILED",
        }
    }
}

impl fmt::Display for TargetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final counters for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStats {
    #[serde(skip)]
    pub target_id: String,
    pub accepted: usize,
    pub skipped_duplicates: usize,
    pub skipped_for_quality: usize,
    pub fetched: usize,
    pub outcome: TargetOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TargetStats {
    pub fn skipped(&self) -> usize {
        self.skipped_duplicates + self.skipped_for_quality
    }
}

/// Per-target statistics in processing order, under one filter threshold.
#[derive(Debug)]
pub struct RunStatistics {
    filter_threshold: f64,
    targets: Vec<TargetStats>,
}

impl RunStatistics {
    pub fn new(filter_threshold: f64) -> Self {
        RunStatistics {
            filter_threshold,
            targets: Vec::new(),
        }
    }

    pub fn record(&mut self, stats: TargetStats) {
        self.targets.push(stats);
    }

    pub fn targets(&self) -> &[TargetStats] {
        &self.targets
    }

    pub fn total_accepted(&self) -> usize {
        self.targets.iter().map(|t| t.accepted).sum()
    }

    pub fn failed_targets(&self) -> impl Iterator<Item = &TargetStats> {
        self.targets
            .iter()
            .filter(|t| t.outcome == TargetOutcome::FetchFailed)
    }

    pub fn filter_stats(&self) -> FilterStats {
        let skipped_duplicates = self.targets.iter().map(|t| t.skipped_duplicates).sum();
        let skipped_for_quality = self.targets.iter().map(|t| t.skipped_for_quality).sum();
        FilterStats {
            filter_threshold: self.filter_threshold,
            skipped_total: skipped_duplicates + skipped_for_quality,
            skipped_duplicates,
            skipped_for_quality,
            by_target: self
                .targets
                .iter()
                .map(|t| (t.target_id.clone(), t.clone()))
                .collect(),
        }
    }
}

/// Aggregate filter counters as reported in the run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStats {
    pub filter_threshold: f64,
    pub skipped_total: usize,
    pub skipped_duplicates: usize,
    pub skipped_for_quality: usize,
    pub by_target: BTreeMap<String, TargetStats>,
}
