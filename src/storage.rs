//! Persistent state: the processed-files ledger and the detection log.
//!
//! Both live in one SQLite database. Rows are only ever inserted. A detection
//! and the ledger row of the clip it came from are written in one
//! transaction, so after a crash either both exist or neither does.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

use crate::DetectionEvent;

pub trait WatchStore {
    /// True when `video_path` has already been evaluated.
    fn is_processed(&self, video_path: &str) -> Result<bool>;

    /// Record `video_path` as evaluated. Returns false if it already was.
    fn mark_processed(&mut self, video_path: &str) -> Result<bool>;

    /// Append `event` and mark its source clip processed, atomically.
    fn commit_detection(&mut self, event: &DetectionEvent) -> Result<()>;

    /// Most recent detections, newest first.
    fn recent_detections(&self, limit: usize) -> Result<Vec<DetectionEvent>>;

    fn processed_count(&self) -> Result<u64>;
}

pub struct SqliteWatchStore {
    conn: Connection,
}

impl SqliteWatchStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open database {}", db_path.display()))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS processed_files (
              path TEXT PRIMARY KEY NOT NULL,
              processed_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS detections (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              camera TEXT NOT NULL,
              image_path TEXT NOT NULL,
              video_path TEXT NOT NULL,
              timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_detections_timestamp ON detections(timestamp);
            "#,
            )
            .context("failed to create schema")?;
        Ok(())
    }
}

impl WatchStore for SqliteWatchStore {
    fn is_processed(&self, video_path: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM processed_files WHERE path = ?1",
                params![video_path],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark_processed(&mut self, video_path: &str) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO processed_files(path, processed_at) VALUES (?1, ?2)",
                params![video_path, crate::now_s()? as i64],
            )
            .with_context(|| format!("failed to record {} as processed", video_path))?;
        Ok(inserted == 1)
    }

    fn commit_detection(&mut self, event: &DetectionEvent) -> Result<()> {
        let processed_at = crate::now_s()? as i64;
        // Dropping the transaction without commit rolls it back.
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO detections(camera, image_path, video_path, timestamp)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                event.camera,
                event.image_path,
                event.video_path,
                event.timestamp
            ],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO processed_files(path, processed_at) VALUES (?1, ?2)",
            params![event.video_path, processed_at],
        )?;
        tx.commit().context("failed to commit detection")?;
        Ok(())
    }

    fn recent_detections(&self, limit: usize) -> Result<Vec<DetectionEvent>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT camera, image_path, video_path, timestamp FROM detections
            ORDER BY timestamp DESC, id DESC LIMIT ?1
            "#,
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(DetectionEvent {
                camera: row.get(0)?,
                image_path: row.get(1)?,
                video_path: row.get(2)?,
                timestamp: row.get(3)?,
            });
        }
        Ok(out)
    }

    fn processed_count(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM processed_files", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Volatile store with the same semantics, for tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct InMemoryWatchStore {
    processed: HashSet<String>,
    processed_order: Vec<String>,
    detections: Vec<DetectionEvent>,
}

impl InMemoryWatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processed paths in insertion order.
    pub fn processed_paths(&self) -> &[String] {
        &self.processed_order
    }
}

impl WatchStore for InMemoryWatchStore {
    fn is_processed(&self, video_path: &str) -> Result<bool> {
        Ok(self.processed.contains(video_path))
    }

    fn mark_processed(&mut self, video_path: &str) -> Result<bool> {
        if !self.processed.insert(video_path.to_string()) {
            return Ok(false);
        }
        self.processed_order.push(video_path.to_string());
        Ok(true)
    }

    fn commit_detection(&mut self, event: &DetectionEvent) -> Result<()> {
        self.detections.push(event.clone());
        self.mark_processed(&event.video_path)?;
        Ok(())
    }

    fn recent_detections(&self, limit: usize) -> Result<Vec<DetectionEvent>> {
        let mut indexed: Vec<(usize, &DetectionEvent)> =
            self.detections.iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));
        Ok(indexed
            .into_iter()
            .take(limit)
            .map(|(_, ev)| ev.clone())
            .collect())
    }

    fn processed_count(&self) -> Result<u64> {
        Ok(self.processed.len() as u64)
    }
}
