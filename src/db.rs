//! Run ledger: a history of completed runs and their per-target counters.
//! Dedup keys are never stored here.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::export::RunSummary;
use crate::stats::TargetStats;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id              INTEGER PRIMARY KEY,
            started_at      TEXT NOT NULL,
            finished_at     TEXT NOT NULL,
            requested       INTEGER NOT NULL,
            threshold       REAL NOT NULL,
            targets         INTEGER NOT NULL,
            total_accepted  INTEGER NOT NULL,
            skipped_quality INTEGER NOT NULL,
            skipped_dupes   INTEGER NOT NULL,
            export_path     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS run_targets (
            id              INTEGER PRIMARY KEY,
            run_id          INTEGER NOT NULL REFERENCES runs(id),
            position        INTEGER NOT NULL,
            target_id       TEXT NOT NULL,
            accepted        INTEGER NOT NULL,
            fetched         INTEGER NOT NULL,
            skipped_quality INTEGER NOT NULL,
            skipped_dupes   INTEGER NOT NULL,
            outcome         TEXT NOT NULL CHECK(outcome IN ('TARGET_MET','EXHAUSTED','BOUND_EXCEEDED','FETCH_FAILED')),
            error           TEXT,
            UNIQUE(run_id, position)
        );
        CREATE INDEX IF NOT EXISTS idx_run_targets_run ON run_targets(run_id);
        CREATE INDEX IF NOT EXISTS idx_run_targets_target ON run_targets(target_id);
        ",
    )?;
    Ok(())
}

pub struct RunRow<'a> {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub requested: usize,
    pub threshold: f64,
    pub summary: &'a RunSummary,
    pub targets: &'a [TargetStats],
}

/// Stores one run and its targets in a single transaction. Returns the run id.
pub fn record_run(conn: &Connection, run: &RunRow) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let stats = &run.summary.filter_stats;
    tx.execute(
        "INSERT INTO runs (started_at, finished_at, requested, threshold, targets,
                           total_accepted, skipped_quality, skipped_dupes, export_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            run.started_at.to_rfc3339(),
            run.finished_at.to_rfc3339(),
            run.requested as i64,
            run.threshold,
            run.summary.targets_processed as i64,
            run.summary.total_accepted as i64,
            stats.skipped_for_quality as i64,
            stats.skipped_duplicates as i64,
            run.summary.download_reference,
        ],
    )?;
    let run_id = tx.last_insert_rowid();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO run_targets (run_id, position, target_id, accepted, fetched,
                                      skipped_quality, skipped_dupes, outcome, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for (position, t) in run.targets.iter().enumerate() {
            stmt.execute(rusqlite::params![
                run_id,
                position as i64,
                t.target_id,
                t.accepted as i64,
                t.fetched as i64,
                t.skipped_for_quality as i64,
                t.skipped_duplicates as i64,
                t.outcome.as_str(),
                t.error,
            ])?;
        }
    }
    tx.commit()?;
    Ok(run_id)
}

pub struct RunHistoryRow {
    pub id: i64,
    pub finished_at: String,
    pub targets: i64,
    pub total_accepted: i64,
    pub skipped_quality: i64,
    pub skipped_dupes: i64,
    pub failed_targets: i64,
    pub export_path: String,
}

pub fn fetch_recent_runs(conn: &Connection, limit: usize) -> Result<Vec<RunHistoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.finished_at, r.targets, r.total_accepted, r.skipped_quality,
                r.skipped_dupes, r.export_path,
                (SELECT COUNT(*) FROM run_targets t
                  WHERE t.run_id = r.id AND t.outcome = 'FETCH_FAILED')
         FROM runs r
         ORDER BY r.id DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(RunHistoryRow {
                id: row.get(0)?,
                finished_at: row.get(1)?,
                targets: row.get(2)?,
                total_accepted: row.get(3)?,
                skipped_quality: row.get(4)?,
                skipped_dupes: row.get(5)?,
                export_path: row.get(6)?,
                failed_targets: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
