//! SQLite persistence for the observation history.
//!
//! The history is the pipeline's only carry-over state. Alongside it the
//! store keeps the set of processed photos and one row per scan run.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use skintrack_core::{AcneObservation, ObservationHistory, RunReport};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS observations (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id         TEXT NOT NULL,
    has_acne       INTEGER NOT NULL,
    severity_index INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS processed_photos (
    photo        TEXT PRIMARY KEY,
    run_id       TEXT NOT NULL,
    processed_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    report      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const LAST_CHECKED_KEY: &str = "last_checked";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serializing run report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("creating database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad timestamp in store: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// A completed scan, ready to be written in one transaction.
pub struct RunRecord<'a> {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub report: &'a RunReport,
    /// Observations appended during this run, in order.
    pub observations: &'a [AcneObservation],
    /// Every photo the run looked at, including skipped ones.
    pub photos: &'a [String],
}

pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "history store opened");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Full history in insertion order.
    pub fn load_history(&self) -> Result<ObservationHistory, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT has_acne, severity_index FROM observations ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(AcneObservation {
                has_acne: row.get(0)?,
                severity_index: row.get::<_, i64>(1)? as usize,
            })
        })?;
        let observations = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(ObservationHistory::from(observations))
    }

    pub fn processed_photos(&self) -> Result<HashSet<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT photo FROM processed_photos")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<HashSet<_>, _>>()?)
    }

    /// Persist a run atomically; returns the new run id.
    pub fn record_run(&mut self, run: &RunRecord<'_>) -> Result<Uuid, StoreError> {
        let run_id = Uuid::new_v4();
        let id = run_id.to_string();
        let finished = run.finished_at.to_rfc3339();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO runs (id, started_at, finished_at, report) VALUES (?1, ?2, ?3, ?4)",
            params![id, run.started_at.to_rfc3339(), finished, serde_json::to_string(run.report)?],
        )?;
        for obs in run.observations {
            tx.execute(
                "INSERT INTO observations (run_id, has_acne, severity_index) VALUES (?1, ?2, ?3)",
                params![id, obs.has_acne, obs.severity_index as i64],
            )?;
        }
        for photo in run.photos {
            tx.execute(
                "INSERT OR REPLACE INTO processed_photos (photo, run_id, processed_at) VALUES (?1, ?2, ?3)",
                params![photo, id, finished],
            )?;
        }
        tx.commit()?;

        tracing::debug!(
            run = %run_id,
            observations = run.observations.len(),
            photos = run.photos.len(),
            "run recorded"
        );
        Ok(run_id)
    }

    /// Report of the most recent run, if any.
    pub fn last_report(&self) -> Result<Option<RunReport>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT report FROM runs ORDER BY finished_at DESC, rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.map(|r| serde_json::from_str(&r)).transpose()?)
    }

    pub fn last_checked(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![LAST_CHECKED_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw
            .map(|r| DateTime::parse_from_rfc3339(&r).map(|t| t.with_timezone(&Utc)))
            .transpose()?)
    }

    pub fn set_last_checked(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![LAST_CHECKED_KEY, at.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(store: &mut HistoryStore, obs: &[AcneObservation], photos: &[&str]) -> Uuid {
        let photos: Vec<String> = photos.iter().map(|p| p.to_string()).collect();
        let report = RunReport {
            photos_seen: photos.len(),
            observations_added: obs.len(),
            ..RunReport::default()
        };
        let now = Utc::now();
        store
            .record_run(&RunRecord {
                started_at: now,
                finished_at: now,
                report: &report,
                observations: obs,
                photos: &photos,
            })
            .unwrap()
    }

    #[test]
    fn test_empty_store() {
        let store = HistoryStore::open_in_memory().unwrap();
        assert!(store.load_history().unwrap().is_empty());
        assert!(store.processed_photos().unwrap().is_empty());
        assert!(store.last_checked().unwrap().is_none());
        assert!(store.last_report().unwrap().is_none());
    }

    #[test]
    fn test_history_order_across_runs() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        record(&mut store, &[AcneObservation::new(false, 0), AcneObservation::new(true, 2)], &["a.jpg", "b.jpg"]);
        record(&mut store, &[AcneObservation::new(true, 1)], &["c.jpg", "d.jpg"]);

        let history = store.load_history().unwrap();
        assert_eq!(
            history.as_slice(),
            &[
                AcneObservation::new(false, 0),
                AcneObservation::new(true, 2),
                AcneObservation::new(true, 1),
            ]
        );
        let processed = store.processed_photos().unwrap();
        assert_eq!(processed.len(), 4);
        assert!(processed.contains("d.jpg"));
    }

    #[test]
    fn test_last_report_roundtrip() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        record(&mut store, &[AcneObservation::new(true, 3)], &["x.png"]);
        let report = store.last_report().unwrap().unwrap();
        assert_eq!(report.photos_seen, 1);
        assert_eq!(report.observations_added, 1);
    }

    #[test]
    fn test_last_checked() {
        let store = HistoryStore::open_in_memory().unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        store.set_last_checked(at).unwrap();
        assert_eq!(store.last_checked().unwrap(), Some(at));

        let later = Utc.with_ymd_and_hms(2026, 3, 21, 12, 0, 0).unwrap();
        store.set_last_checked(later).unwrap();
        assert_eq!(store.last_checked().unwrap(), Some(later));
    }
}
