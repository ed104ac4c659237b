//! Parsed reminder persistence with async batch writing.
//! Records are buffered in a channel and flushed to SQLite every 300ms,
//! so the engine's event path never waits on disk I/O.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One stored reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub request_id: String,
    pub locale: String,
    /// Transcript the reminder was parsed from, when it was seen.
    pub utterance: Option<String>,
    pub confidence: Option<f64>,
    pub recipients: Vec<String>,
    pub action: String,
    pub time: String,
    pub created_at: i64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reminder store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reminder store database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS reminders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id TEXT NOT NULL,
        locale TEXT NOT NULL,
        utterance TEXT,
        confidence REAL,
        recipients TEXT NOT NULL,
        action TEXT NOT NULL,
        time TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_reminders_created
        ON reminders(created_at);";

/// Async reminder store: writes go through a channel, reads use their own connection.
pub struct ReminderStore {
    /// Taken by `close`; later records are dropped with a warning.
    tx: Mutex<Option<mpsc::UnboundedSender<ReminderRecord>>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
    read_conn: Mutex<Connection>,
}

impl ReminderStore {
    /// Open (or create) the database and spawn the background flush loop.
    /// Must be called inside a Tokio runtime.
    pub fn open(db_path: &Path) -> Result<Arc<Self>, StoreError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let read_conn = open_connection(db_path)?;
        read_conn.execute_batch(SCHEMA)?;

        // Separate writer so batch inserts don't block queries.
        let write_conn = open_connection(db_path)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let flusher = tokio::spawn(flush_loop(rx, write_conn));
        let store = Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            flusher: Mutex::new(Some(flusher)),
            read_conn: Mutex::new(read_conn),
        });
        info!(path = %db_path.display(), "reminder store opened with batch writer");

        Ok(store)
    }

    /// Queue a record for the next batch. Never blocks.
    pub fn record(&self, entry: ReminderRecord) {
        match self.tx.lock().as_ref() {
            Some(tx) => {
                if let Err(e) = tx.send(entry) {
                    warn!(error = %e, "reminder channel send failed (flush loop gone?)");
                }
            }
            None => warn!(request_id = %entry.request_id, "reminder dropped: store closed"),
        }
    }

    /// Stop accepting records and wait until every queued one is written.
    pub async fn close(&self) {
        drop(self.tx.lock().take());
        let flusher = self.flusher.lock().take();
        if let Some(handle) = flusher {
            if let Err(e) = handle.await {
                warn!(error = %e, "reminder flush loop failed");
            }
        }
    }

    /// Most recent reminders first.
    pub fn query_recent(&self, limit: usize) -> Result<Vec<ReminderRecord>, StoreError> {
        let conn = self.read_conn.lock();
        let mut stmt = conn.prepare(
            "SELECT request_id, locale, utterance, confidence, recipients,
                    action, time, created_at
             FROM reminders ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let recipients: String = row.get(4)?;
            Ok(ReminderRecord {
                request_id: row.get(0)?,
                locale: row.get(1)?,
                utterance: row.get(2)?,
                confidence: row.get(3)?,
                recipients: serde_json::from_str(&recipients).unwrap_or_else(|e| {
                    warn!(error = %e, "stored recipients are not a JSON array");
                    vec![recipients.clone()]
                }),
                action: row.get(5)?,
                time: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;

        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Delete reminders created more than `days` days ago.
    pub fn cleanup_older_than_days(&self, days: u32) -> Result<usize, StoreError> {
        let cutoff = now_unix() - (days as i64 * 86400);
        let removed = self
            .read_conn
            .lock()
            .execute("DELETE FROM reminders WHERE created_at < ?1", params![cutoff])?;
        if removed > 0 {
            info!(removed, days, "reminder cleanup");
        }
        Ok(removed)
    }
}

fn open_connection(db_path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

/// Collects records and batch-inserts them every 300ms until the store is closed or dropped.
async fn flush_loop(mut rx: mpsc::UnboundedReceiver<ReminderRecord>, conn: Connection) {
    let flush_interval = Duration::from_millis(300);
    let mut buffer: Vec<ReminderRecord> = Vec::with_capacity(32);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(flush_interval) => {}
            msg = rx.recv() => {
                match msg {
                    Some(record) => buffer.push(record),
                    None => {
                        if !buffer.is_empty() {
                            flush_batch(&conn, &buffer);
                        }
                        info!("reminder flush loop exiting (channel closed)");
                        return;
                    }
                }
            }
        }

        while let Ok(record) = rx.try_recv() {
            buffer.push(record);
        }

        if !buffer.is_empty() {
            flush_batch(&conn, &buffer);
            buffer.clear();
        }
    }
}

/// Insert a batch inside one transaction.
fn flush_batch(conn: &Connection, records: &[ReminderRecord]) {
    let start = std::time::Instant::now();

    if let Err(e) = conn.execute_batch("BEGIN TRANSACTION") {
        warn!(error = %e, "reminder batch begin failed");
        return;
    }

    let mut stmt = match conn.prepare_cached(
        "INSERT INTO reminders
         (request_id, locale, utterance, confidence, recipients, action, time, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    ) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "reminder batch prepare failed");
            let _ = conn.execute_batch("ROLLBACK");
            return;
        }
    };

    for record in records {
        let recipients = match serde_json::to_string(&record.recipients) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, request_id = %record.request_id, "recipients not serializable");
                continue;
            }
        };
        if let Err(e) = stmt.execute(params![
            record.request_id,
            record.locale,
            record.utterance,
            record.confidence,
            recipients,
            record.action,
            record.time,
            record.created_at,
        ]) {
            warn!(error = %e, request_id = %record.request_id, "reminder insert failed");
        }
    }

    drop(stmt);

    if let Err(e) = conn.execute_batch("COMMIT") {
        warn!(error = %e, "reminder batch commit failed");
    } else {
        debug!(
            count = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "reminder batch flushed"
        );
    }
}

/// Current time as Unix timestamp (seconds).
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_db() -> PathBuf {
        std::env::temp_dir().join(format!("reminders-{}.db", uuid::Uuid::new_v4()))
    }

    fn record(action: &str, created_at: i64) -> ReminderRecord {
        ReminderRecord {
            request_id: uuid::Uuid::new_v4().to_string(),
            locale: "en".into(),
            utterance: Some(format!("Remind Alice and Bob to {action} at noon.")),
            confidence: Some(0.5),
            recipients: vec!["Alice".into(), "Bob".into()],
            action: action.into(),
            time: "noon".into(),
            created_at,
        }
    }

    async fn wait_for_rows(store: &ReminderStore, expected: usize) -> Vec<ReminderRecord> {
        for _ in 0..50 {
            let rows = store.query_recent(10).unwrap();
            if rows.len() >= expected {
                return rows;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("batch writer did not flush {expected} rows");
    }

    #[tokio::test]
    async fn test_records_flush_and_query_newest_first() {
        let path = temp_db();
        let store = ReminderStore::open(&path).unwrap();
        let now = now_unix();

        store.record(record("water plants", now - 10));
        store.record(record("book the room", now));

        let rows = wait_for_rows(&store, 2).await;
        assert_eq!(rows[0].action, "book the room");
        assert_eq!(rows[1].action, "water plants");
        assert_eq!(rows[0].recipients, ["Alice", "Bob"]);
        assert_eq!(rows[0].confidence, Some(0.5));

        drop(store);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_close_flushes_queued_records() {
        let path = temp_db();
        let store = ReminderStore::open(&path).unwrap();

        store.record(record("water plants", now_unix()));
        store.close().await;

        // No waiting for the batch interval: close wrote the pending record.
        assert_eq!(store.query_recent(10).unwrap().len(), 1);
        store.record(record("too late", now_unix()));
        store.close().await;
        assert_eq!(store.query_recent(10).unwrap().len(), 1);

        drop(store);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_rows() {
        let path = temp_db();
        let store = ReminderStore::open(&path).unwrap();
        let now = now_unix();

        store.record(record("old", now - 40 * 86400));
        store.record(record("fresh", now));
        wait_for_rows(&store, 2).await;

        assert_eq!(store.cleanup_older_than_days(30).unwrap(), 1);
        let rows = store.query_recent(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "fresh");

        drop(store);
        let _ = std::fs::remove_file(&path);
    }
}
