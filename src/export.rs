use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ExportWriteError;
use crate::models::AcceptedRecord;
use crate::stats::{FilterStats, RunStatistics};

pub const EXPORT_COLUMNS: [&str; 6] = [
    "target_name",
    "target_id",
    "text",
    "recommended",
    "hours_played",
    "timestamp",
];

pub const PREVIEW_ROWS: usize = 5;

/// One line of the export artifact. Field order matches `EXPORT_COLUMNS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub target_name: String,
    pub target_id: String,
    pub text: String,
    pub recommended: bool,
    pub hours_played: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&AcceptedRecord> for ExportRow {
    fn from(r: &AcceptedRecord) -> Self {
        ExportRow {
            target_name: r.target_display_name.clone(),
            target_id: r.target_id.clone(),
            text: r.text.clone(),
            recommended: r.recommended,
            hours_played: r.numeric_metric,
            timestamp: r.timestamp,
        }
    }
}

impl From<ExportRow> for AcceptedRecord {
    fn from(row: ExportRow) -> Self {
        AcceptedRecord {
            target_id: row.target_id,
            target_display_name: row.target_name,
            text: row.text,
            numeric_metric: row.hours_played,
            recommended: row.recommended,
            timestamp: row.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub message: String,
    pub targets_processed: usize,
    pub total_accepted: usize,
    pub filter_stats: FilterStats,
    pub download_reference: String,
    pub preview_rows: Vec<AcceptedRecord>,
}

/// Writes the run's accepted records as one CSV artifact.
pub struct AggregateExporter {
    output_dir: PathBuf,
}

impl AggregateExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        AggregateExporter {
            output_dir: output_dir.into(),
        }
    }

    /// Serializes `records` (already in target then acceptance order), writes
    /// them in a single shot, and builds the run summary.
    pub fn export(
        &self,
        records: &[AcceptedRecord],
        stats: &RunStatistics,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, ExportWriteError> {
        let content = render_csv(records)?;

        fs::create_dir_all(&self.output_dir).map_err(|source| ExportWriteError::CreateDir {
            path: self.output_dir.clone(),
            source,
        })?;
        let path = unique_path(&self.output_dir, now);
        write_atomic(&path, &content)?;
        info!(
            "Exported {} rows to {} ({} bytes)",
            records.len(),
            path.display(),
            content.len()
        );

        Ok(RunSummary {
            message: summary_message(records.len(), stats),
            targets_processed: stats.targets().len(),
            total_accepted: records.len(),
            filter_stats: stats.filter_stats(),
            download_reference: path.display().to_string(),
            preview_rows: records.iter().take(PREVIEW_ROWS).cloned().collect(),
        })
    }
}

/// Header plus one row per record.
pub fn render_csv(records: &[AcceptedRecord]) -> Result<Vec<u8>, ExportWriteError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(EXPORT_COLUMNS)?;
    for record in records {
        writer.serialize(ExportRow::from(record))?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportWriteError::Serialize(csv::Error::from(e.into_error())))
}

/// Re-reads an artifact written by `AggregateExporter`.
pub fn read_export(path: &Path) -> Result<Vec<ExportRow>, csv::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    reader.deserialize().collect()
}

pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("reviews_{}.csv", now.format("%Y%m%d_%H%M%S_%3f"))
}

fn unique_path(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    let name = export_file_name(now);
    let mut path = dir.join(&name);
    let stem = name.trim_end_matches(".csv");
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{}_{}.csv", stem, n));
        n += 1;
    }
    path
}

/// Writes to a hidden sibling and renames it into place, so the final path
/// either holds the complete artifact or nothing.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), ExportWriteError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.partial", file_name));

    if let Err(source) = write_then_rename(&tmp, path, content) {
        if tmp.exists() {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!("Could not remove partial export {}: {}", tmp.display(), e);
            }
        }
        return Err(ExportWriteError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn write_then_rename(tmp: &Path, path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    file.write_all(content)?;
    file.sync_all()?;
    fs::rename(tmp, path)
}

fn summary_message(total: usize, stats: &RunStatistics) -> String {
    let mut message = format!(
        "Collected {} reviews from {} targets",
        total,
        stats.targets().len()
    );
    let failed: Vec<&str> = stats
        .failed_targets()
        .map(|t| t.target_id.as_str())
        .collect();
    if !failed.is_empty() {
        message.push_str(&format!(
            "; fetch failed for {} (partial results kept)",
            failed.join(", ")
        ));
    }
    message
}
