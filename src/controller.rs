//! Per-target collection loop.
//!
//! Each target cycles through fetch and classify steps until one of four
//! terminal states is reached:
//!
//! ```text
//! Fetching ─► Classifying ─┬─► Continue ─► Fetching
//!    │                     ├─► TargetMet       (accepted == requested)
//!    │                     └─► BoundExceeded   (fetched >= bound)
//!    ├─► Exhausted         (empty page)
//!    └─► FetchFailed       (upstream error, partial records kept)
//! ```
//!
//! Batches are over-fetched to compensate for records the filters reject,
//! and the total fetched per target is capped at
//! `attempts_bound_multiplier × requested`.

use tracing::{debug, info, warn};

use crate::dedup::DedupIndex;
use crate::models::{AcceptedRecord, CollectionTarget};
use crate::pager::SourcePager;
use crate::quality::is_acceptable;
use crate::stats::{TargetOutcome, TargetStats};

/// Sizes each fetch from the number of records still needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSizeHeuristic {
    /// Extra records requested, as a fraction of the remaining need.
    pub overfetch_ratio: f64,
    /// Lower bound on the extra records requested.
    pub min_margin: usize,
    pub max_batch: usize,
}

impl Default for BatchSizeHeuristic {
    fn default() -> Self {
        BatchSizeHeuristic {
            overfetch_ratio: 0.5,
            min_margin: 5,
            max_batch: 100,
        }
    }
}

impl BatchSizeHeuristic {
    /// `remaining + max(min_margin, ceil(remaining × ratio))`, capped at `max_batch`.
    pub fn batch_size(&self, remaining: usize) -> usize {
        let proportional = (remaining as f64 * self.overfetch_ratio).ceil() as usize;
        let margin = proportional.max(self.min_margin);
        remaining
            .saturating_add(margin)
            .min(self.max_batch)
            .max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectionPlan {
    pub requested: usize,
    pub attempts_bound_multiplier: usize,
    pub batch: BatchSizeHeuristic,
}

impl CollectionPlan {
    pub fn new(requested: usize) -> Self {
        CollectionPlan {
            requested,
            attempts_bound_multiplier: 5,
            batch: BatchSizeHeuristic::default(),
        }
    }

    /// Maximum number of records fetched for one target.
    pub fn attempts_bound(&self) -> usize {
        self.requested.saturating_mul(self.attempts_bound_multiplier)
    }

    /// Next batch size given progress so far. Never exceeds what is left of
    /// the attempts budget.
    pub fn next_batch_size(&self, accepted: usize, fetched: usize) -> usize {
        let remaining = self.requested.saturating_sub(accepted);
        let budget = self.attempts_bound().saturating_sub(fetched);
        self.batch.batch_size(remaining).min(budget).max(1)
    }
}

/// Records accepted for one target and the stats of its loop.
#[derive(Debug)]
pub struct TargetYield {
    pub records: Vec<AcceptedRecord>,
    pub stats: TargetStats,
}

#[derive(Debug, Default)]
struct Counters {
    fetched: usize,
    skipped_for_quality: usize,
    skipped_duplicates: usize,
}

/// Drives one target to a terminal state.
///
/// Records are checked against the quality filter first and only then
/// against the dedup index. Upstream errors end the loop for this target
/// only; whatever was accepted so far is returned.
pub async fn collect_target<P: SourcePager + ?Sized>(
    pager: &mut P,
    target: &CollectionTarget,
    plan: &CollectionPlan,
    threshold: f64,
    dedup: &mut DedupIndex,
) -> TargetYield {
    let bound = plan.attempts_bound();
    let mut records: Vec<AcceptedRecord> = Vec::new();
    let mut counters = Counters::default();
    let mut offset = 0usize;
    let mut error = None;

    let outcome = loop {
        let batch_size = plan.next_batch_size(records.len(), counters.fetched);
        let mut batch = match pager.fetch(&target.id, offset, batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(
                    "Fetch failed for {} at offset {}: {} (keeping {} accepted)",
                    target.id,
                    offset,
                    e,
                    records.len()
                );
                error = Some(e.to_string());
                break TargetOutcome::FetchFailed;
            }
        };

        if batch.is_empty() {
            break TargetOutcome::Exhausted;
        }
        batch.truncate(batch_size);
        offset += batch.len();
        counters.fetched += batch.len();
        debug!(
            "{}: fetched {} (asked {}), {} total",
            target.id,
            batch.len(),
            batch_size,
            counters.fetched
        );

        for raw in batch {
            if !is_acceptable(&raw.text, threshold) {
                counters.skipped_for_quality += 1;
                continue;
            }
            if dedup.seen(&raw.text) {
                counters.skipped_duplicates += 1;
                continue;
            }
            records.push(AcceptedRecord::from_raw(target, raw));
            if records.len() == plan.requested {
                break;
            }
        }

        if records.len() >= plan.requested {
            break TargetOutcome::TargetMet;
        }
        if counters.fetched >= bound {
            break TargetOutcome::BoundExceeded;
        }
    };

    info!(
        "{} ({}): {}, {}/{} accepted, {} fetched, {} low quality, {} duplicates",
        target.display_name,
        target.id,
        outcome,
        records.len(),
        plan.requested,
        counters.fetched,
        counters.skipped_for_quality,
        counters.skipped_duplicates
    );

    let stats = TargetStats {
        target_id: target.id.clone(),
        accepted: records.len(),
        skipped_duplicates: counters.skipped_duplicates,
        skipped_for_quality: counters.skipped_for_quality,
        fetched: counters.fetched,
        outcome,
        error,
    };
    TargetYield { records, stats }
}
