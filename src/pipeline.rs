//! One collection run: validate the request, drive every target through the
//! collection loop in order, then export once.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Settings;
use crate::controller::{collect_target, CollectionPlan};
use crate::db::RunRow;
use crate::dedup::DedupIndex;
use crate::error::{InputValidationError, RunError};
use crate::export::{AggregateExporter, RunSummary};
use crate::models::{AcceptedRecord, CollectionTarget};
use crate::pager::SourcePager;
use crate::quality::DEFAULT_FILTER_THRESHOLD;
use crate::stats::{RunStatistics, TargetStats};

/// Run request as received. Every field is optional here so that absence is
/// reported explicitly by `validate` instead of failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub targets: Option<Vec<CollectionTarget>>,
    pub requested_count_per_target: Option<i64>,
    pub filter_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidRequest {
    pub targets: Vec<CollectionTarget>,
    pub requested: usize,
    pub threshold: f64,
}

impl RunRequest {
    pub fn from_json(json: &str) -> Result<Self, InputValidationError> {
        serde_json::from_str(json).map_err(|e| InputValidationError::Malformed(e.to_string()))
    }

    pub fn validate(&self) -> Result<ValidRequest, InputValidationError> {
        let targets = match &self.targets {
            Some(t) if !t.is_empty() => t.clone(),
            _ => return Err(InputValidationError::NoTargets),
        };
        if let Some(index) = targets.iter().position(|t| t.id.trim().is_empty()) {
            return Err(InputValidationError::EmptyTargetId { index });
        }
        let mut ids = HashSet::new();
        if let Some(dup) = targets.iter().find(|t| !ids.insert(t.id.as_str())) {
            return Err(InputValidationError::DuplicateTargetId { id: dup.id.clone() });
        }

        let requested = match self.requested_count_per_target {
            Some(n) if n >= 1 => n as usize,
            Some(n) => return Err(InputValidationError::RequestedCountTooSmall(n)),
            None => return Err(InputValidationError::RequestedCountTooSmall(0)),
        };

        let threshold = self.filter_threshold.unwrap_or(DEFAULT_FILTER_THRESHOLD);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(InputValidationError::ThresholdOutOfRange(threshold));
        }

        Ok(ValidRequest {
            targets,
            requested,
            threshold,
        })
    }
}

/// All mutable state of the in-flight run.
pub struct RunContext {
    pub plan: CollectionPlan,
    pub threshold: f64,
    pub dedup: DedupIndex,
    pub stats: RunStatistics,
    pub accepted: Vec<AcceptedRecord>,
}

impl RunContext {
    pub fn new(plan: CollectionPlan, threshold: f64) -> Self {
        RunContext {
            plan,
            threshold,
            dedup: DedupIndex::new(),
            stats: RunStatistics::new(threshold),
            accepted: Vec::new(),
        }
    }
}

/// A finished run: the summary handed back to the caller plus what the
/// ledger needs.
#[derive(Debug)]
pub struct CompletedRun {
    pub summary: RunSummary,
    pub targets: Vec<TargetStats>,
    pub requested: usize,
    pub threshold: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CompletedRun {
    pub fn ledger_row(&self) -> RunRow<'_> {
        RunRow {
            started_at: self.started_at,
            finished_at: self.finished_at,
            requested: self.requested,
            threshold: self.threshold,
            summary: &self.summary,
            targets: &self.targets,
        }
    }
}

/// Runs every target to a terminal state, then writes the export.
///
/// Per-target upstream failures are folded into the statistics. Only an
/// invalid request or a failed export write is returned as an error.
pub async fn run<P: SourcePager + ?Sized>(
    request: &RunRequest,
    pager: &mut P,
    settings: &Settings,
    exporter: &AggregateExporter,
    progress: &ProgressBar,
) -> Result<CompletedRun, RunError> {
    let valid = request.validate()?;
    let started_at = Utc::now();
    let mut ctx = RunContext::new(settings.plan_for(valid.requested), valid.threshold);

    info!(
        "Collecting {} reviews for each of {} targets (threshold {}, bound {} per target)",
        valid.requested,
        valid.targets.len(),
        valid.threshold,
        ctx.plan.attempts_bound()
    );

    progress.set_length(valid.targets.len() as u64);
    for target in &valid.targets {
        progress.set_message(target.display_name.clone());
        let y = collect_target(pager, target, &ctx.plan, ctx.threshold, &mut ctx.dedup).await;
        ctx.accepted.extend(y.records);
        ctx.stats.record(y.stats);
        progress.inc(1);
    }
    progress.finish_and_clear();

    let finished_at = Utc::now();
    let summary = exporter.export(&ctx.accepted, &ctx.stats, finished_at)?;
    info!("{}", summary.message);

    Ok(CompletedRun {
        summary,
        targets: ctx.stats.targets().to_vec(),
        requested: valid.requested,
        threshold: valid.threshold,
        started_at,
        finished_at,
    })
}
