use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::mpsc;

use crate::scanner::ScanSignals;

/// What gets written per scan. Mirrors the scan result minus the error
/// payload, keyed by sender domain for history queries.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub scan_id: String,
    pub sender_domain: String,
    pub verdict: String,
    pub confidence: f64,
    pub signals: ScanSignals,
    pub created_at: String,
}

/// Best-effort history sink. Implementations log failures instead of
/// returning them; a scan must never fail because its record could not be
/// stored.
pub trait ScanSink: Send + Sync {
    fn record(&self, record: ScanRecord);
}

/// SQLite-backed sink. Records are queued on an unbounded channel and
/// written by a background task that owns the connection, so `record` never
/// blocks the scan path.
pub struct SqliteScanSink {
    sender: mpsc::UnboundedSender<ScanRecord>,
    handle: tokio::task::JoinHandle<()>,
}

impl SqliteScanSink {
    pub fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory: {}", parent.display())
            })?;
        }

        let conn = init_database(db_path)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            sink_worker(conn, receiver).await;
        });

        Ok(SqliteScanSink { sender, handle })
    }

    /// Drains queued records and stops the worker.
    pub async fn shutdown(self) {
        let SqliteScanSink { sender, handle } = self;
        drop(sender);
        if let Err(e) = handle.await {
            log::warn!("Scan history worker did not shut down cleanly: {e}");
        }
    }
}

impl ScanSink for SqliteScanSink {
    fn record(&self, record: ScanRecord) {
        if let Err(e) = self.sender.send(record) {
            log::warn!("Failed to queue scan record: {e}");
        }
    }
}

async fn sink_worker(conn: Connection, mut receiver: mpsc::UnboundedReceiver<ScanRecord>) {
    while let Some(record) = receiver.recv().await {
        if let Err(e) = insert_record(&conn, &record) {
            log::error!("Failed to store scan {}: {e}", record.scan_id);
        }
    }
}

fn init_database(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open history database: {db_path}"))?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS scan_results (
            scan_id TEXT PRIMARY KEY,
            sender_domain TEXT NOT NULL,
            verdict TEXT NOT NULL,
            confidence REAL NOT NULL,
            signals TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scan_results_created_at ON scan_results (created_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scan_results_verdict ON scan_results (verdict)",
        [],
    )?;
    Ok(conn)
}

fn insert_record(conn: &Connection, record: &ScanRecord) -> Result<()> {
    let signals = serde_json::to_string(&record.signals)?;
    conn.execute(
        "INSERT OR REPLACE INTO scan_results
         (scan_id, sender_domain, verdict, confidence, signals, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            record.scan_id,
            record.sender_domain,
            record.verdict,
            record.confidence,
            signals,
            record.created_at,
        ],
    )?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct HistoryFilter {
    pub sender_domain: Option<String>,
    pub verdict: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        HistoryFilter {
            sender_domain: None,
            verdict: None,
            limit: 100,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredScan {
    pub scan_id: String,
    pub sender_domain: String,
    pub verdict: String,
    pub confidence: f64,
    pub signals: serde_json::Value,
    pub created_at: String,
}

/// Read back stored scans, newest first. Opens its own connection so it can
/// run while a sink worker holds the write side.
pub fn load_history(db_path: &str, filter: &HistoryFilter) -> Result<Vec<StoredScan>> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open history database: {db_path}"))?;

    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    if let Some(domain) = &filter.sender_domain {
        clauses.push("sender_domain = ?");
        params.push(Box::new(domain.clone()));
    }
    if let Some(verdict) = &filter.verdict {
        clauses.push("verdict = ?");
        params.push(Box::new(verdict.clone()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    params.push(Box::new(filter.limit as i64));
    params.push(Box::new(filter.offset as i64));

    let sql = format!(
        "SELECT scan_id, sender_domain, verdict, confidence, signals, created_at
         FROM scan_results{where_sql}
         ORDER BY created_at DESC
         LIMIT ? OFFSET ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        params.iter().map(|p| p.as_ref()).collect();

    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        let signals_text: String = row.get(4)?;
        Ok(StoredScan {
            scan_id: row.get(0)?,
            sender_domain: row.get(1)?,
            verdict: row.get(2)?,
            confidence: row.get(3)?,
            signals: serde_json::from_str(&signals_text).unwrap_or(serde_json::Value::Null),
            created_at: row.get(5)?,
        })
    })?;

    let mut scans = Vec::new();
    for row in rows {
        scans.push(row?);
    }
    Ok(scans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(name: &str) -> String {
        let path = std::env::temp_dir().join(format!(
            "mail-sentinel-test-{}-{}.db",
            name,
            uuid::Uuid::new_v4()
        ));
        path.to_string_lossy().to_string()
    }

    fn record(scan_id: &str, domain: &str, verdict: &str, created_at: &str) -> ScanRecord {
        ScanRecord {
            scan_id: scan_id.to_string(),
            sender_domain: domain.to_string(),
            verdict: verdict.to_string(),
            confidence: 0.75,
            signals: ScanSignals {
                rules: vec!["urgent_subject".to_string()],
                ml_probability: 0.8,
            },
            created_at: created_at.to_string(),
        }
    }

    #[tokio::test]
    async fn test_records_round_trip_through_sink() {
        let db_path = temp_db("round-trip");
        let sink = SqliteScanSink::new(&db_path).unwrap();
        sink.record(record("scan-1", "example.com", "PHISHING", "2026-08-01T10:00:00Z"));
        sink.record(record("scan-2", "other.net", "BENIGN", "2026-08-01T11:00:00Z"));
        sink.shutdown().await;

        let scans = load_history(&db_path, &HistoryFilter::default()).unwrap();
        assert_eq!(scans.len(), 2);
        // Newest first.
        assert_eq!(scans[0].scan_id, "scan-2");
        assert_eq!(scans[1].scan_id, "scan-1");
        assert_eq!(scans[1].signals["rules"][0], "urgent_subject");
        let _ = std::fs::remove_file(&db_path);
    }

    #[tokio::test]
    async fn test_history_filters() {
        let db_path = temp_db("filters");
        let sink = SqliteScanSink::new(&db_path).unwrap();
        sink.record(record("scan-1", "example.com", "PHISHING", "2026-08-01T10:00:00Z"));
        sink.record(record("scan-2", "example.com", "BENIGN", "2026-08-01T11:00:00Z"));
        sink.record(record("scan-3", "other.net", "PHISHING", "2026-08-01T12:00:00Z"));
        sink.shutdown().await;

        let by_domain = load_history(
            &db_path,
            &HistoryFilter {
                sender_domain: Some("example.com".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_domain.len(), 2);

        let phishing = load_history(
            &db_path,
            &HistoryFilter {
                verdict: Some("PHISHING".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(phishing.len(), 2);

        let limited = load_history(
            &db_path,
            &HistoryFilter {
                limit: 1,
                offset: 1,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].scan_id, "scan-2");
        let _ = std::fs::remove_file(&db_path);
    }
}
