//! Routing audit trail.
//!
//! Every routing call produces exactly one `AuditEntry`, whether the upstream
//! call succeeded or not. Entries are sent over an unbounded channel and
//! batch-written to the `audit_log` table by a background task, so the request
//! path never blocks on SQLite.

use std::time::Duration;

use rusqlite::params;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::Database;
use crate::error::AppError;

/// Maximum number of entries to buffer before flushing, regardless of timer.
const BATCH_SIZE: usize = 100;

/// How often to flush buffered entries even if the batch is not full.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// One routing decision plus its outcome.
///
/// `created_at` is stamped when the entry is built, not when the batch
/// writer flushes it, so the recorded time is the event time.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub user_id: String,
    pub request_id: String,
    pub query: String,
    pub response: String,
    pub persona: Option<String>,
    pub model_used: String,
    pub query_type: String,
    pub complexity: String,
    pub reasoning: String,
    pub temperature: f32,
    pub token_count: u32,
    pub latency_ms: u64,
    pub status: String,
    pub created_at: String,
}

impl AuditEntry {
    /// UTC timestamp for a new entry.
    pub fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }
}

/// Stored audit row, as returned to admins.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: String,
    pub user_id: String,
    pub request_id: String,
    pub query: String,
    pub persona: Option<String>,
    pub model_used: String,
    pub query_type: String,
    pub complexity: String,
    pub reasoning: String,
    pub temperature: f32,
    pub token_count: u32,
    pub latency_ms: u64,
    pub status: String,
    pub created_at: String,
}

/// Spawn a background task that reads `AuditEntry` values from the channel
/// and batch-writes them to the `audit_log` table.
///
/// The returned `JoinHandle` can be used to wait for graceful shutdown (the
/// task exits when the sender half is dropped and remaining entries are
/// flushed).
pub fn spawn_audit_logger(
    db: Database,
    mut rx: mpsc::UnboundedReceiver<AuditEntry>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer: Vec<AuditEntry> = Vec::with_capacity(BATCH_SIZE);
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        // Don't pile up ticks while we're busy flushing.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                entry = rx.recv() => {
                    match entry {
                        Some(e) => {
                            buffer.push(e);
                            if buffer.len() >= BATCH_SIZE {
                                flush_batch(&db, &mut buffer);
                            }
                        }
                        None => {
                            // Channel closed -- flush remaining and exit.
                            if !buffer.is_empty() {
                                flush_batch(&db, &mut buffer);
                            }
                            tracing::info!("Audit logger shutting down");
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        flush_batch(&db, &mut buffer);
                    }
                }
            }
        }
    })
}

/// Write a batch of audit entries to the database in a single transaction.
fn flush_batch(db: &Database, buffer: &mut Vec<AuditEntry>) {
    let entries = std::mem::take(buffer);
    let count = entries.len();

    if let Err(e) = write_entries(db, &entries) {
        tracing::error!(count, error = %e, "Failed to flush audit batch");
        // Put entries back so we can retry on the next tick.
        buffer.extend(entries);
    } else {
        tracing::debug!(count, "Flushed audit batch");
    }
}

/// Perform the actual DB writes inside a transaction.
fn write_entries(db: &Database, entries: &[AuditEntry]) -> Result<(), rusqlite::Error> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;

        {
            let mut insert_stmt = tx.prepare_cached(
                "INSERT INTO audit_log (id, user_id, request_id, query, response, persona, \
                 model_used, query_type, complexity, reasoning, temperature, token_count, \
                 latency_ms, status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;

            for entry in entries {
                let id = Uuid::new_v4().to_string();
                insert_stmt.execute(params![
                    id,
                    entry.user_id,
                    entry.request_id,
                    entry.query,
                    entry.response,
                    entry.persona,
                    entry.model_used,
                    entry.query_type,
                    entry.complexity,
                    entry.reasoning,
                    entry.temperature,
                    entry.token_count,
                    entry.latency_ms,
                    entry.status,
                    entry.created_at,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    })
}

/// Optional narrowing criteria for audit reads.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub user_id: Option<String>,
    pub query_type: Option<String>,
    pub limit: u32,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            user_id: None,
            query_type: None,
            limit: 100,
        }
    }
}

/// Most recent audit rows matching the filter, newest first. Query text is
/// included; response bodies are not, to keep the admin payload small.
pub fn query_recent(db: &Database, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AppError> {
    let mut sql = String::from(
        "SELECT id, user_id, request_id, query, persona, model_used, query_type, \
         complexity, reasoning, temperature, token_count, latency_ms, status, created_at \
         FROM audit_log",
    );
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<&dyn rusqlite::types::ToSql> = Vec::new();
    if let Some(ref user_id) = filter.user_id {
        clauses.push("user_id = ?");
        args.push(user_id);
    }
    if let Some(ref query_type) = filter.query_type {
        clauses.push("query_type = ?");
        args.push(query_type);
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");
    args.push(&filter.limit);

    let records = db.with_conn(|conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(&args[..], |row| {
            Ok(AuditRecord {
                id: row.get(0)?,
                user_id: row.get(1)?,
                request_id: row.get(2)?,
                query: row.get(3)?,
                persona: row.get(4)?,
                model_used: row.get(5)?,
                query_type: row.get(6)?,
                complexity: row.get(7)?,
                reasoning: row.get(8)?,
                temperature: row.get(9)?,
                token_count: row.get(10)?,
                latency_ms: row.get(11)?,
                status: row.get(12)?,
                created_at: row.get(13)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
    })?;
    Ok(records)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
