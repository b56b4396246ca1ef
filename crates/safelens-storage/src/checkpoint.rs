//! Checkpoint stores: per-thread logs of workflow state snapshots.
//!
//! Each append records the state after one node. Threads are isolated: a
//! write to one thread never touches another thread's log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use safelens_core::{SafelensError, WorkflowState};

use crate::db::Database;

/// A saved workflow state snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Position in the thread's log, starting at 0.
    pub sequence: u64,
    /// Node that produced this state, if any.
    pub node: Option<String>,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
}

/// Storage for workflow checkpoints keyed by thread id.
pub trait CheckpointStore: Send + Sync {
    /// Append a snapshot to the thread's log and return its sequence number.
    fn append(
        &self,
        thread_id: &str,
        node: Option<&str>,
        state: &WorkflowState,
    ) -> Result<u64, SafelensError>;

    /// Most recent snapshot for the thread.
    fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, SafelensError>;

    /// All snapshots for the thread, oldest first.
    fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, SafelensError>;
}

// =============================================================================
// MemoryCheckpointStore
// =============================================================================

type ThreadLog = Arc<Mutex<Vec<Checkpoint>>>;

/// In-process checkpoint store.
///
/// The outer lock is held only long enough to find or create a thread's log;
/// appends and reads then lock that thread's log alone.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    threads: RwLock<HashMap<String, ThreadLog>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn log_for(&self, thread_id: &str) -> Result<ThreadLog, SafelensError> {
        {
            let threads = self
                .threads
                .read()
                .map_err(|e| SafelensError::Storage(format!("checkpoint lock poisoned: {}", e)))?;
            if let Some(log) = threads.get(thread_id) {
                return Ok(Arc::clone(log));
            }
        }
        let mut threads = self
            .threads
            .write()
            .map_err(|e| SafelensError::Storage(format!("checkpoint lock poisoned: {}", e)))?;
        Ok(Arc::clone(threads.entry(thread_id.to_string()).or_default()))
    }

    fn existing_log(&self, thread_id: &str) -> Result<Option<ThreadLog>, SafelensError> {
        let threads = self
            .threads
            .read()
            .map_err(|e| SafelensError::Storage(format!("checkpoint lock poisoned: {}", e)))?;
        Ok(threads.get(thread_id).cloned())
    }

    /// Thread ids with at least one checkpoint.
    pub fn thread_ids(&self) -> Vec<String> {
        self.threads
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn append(
        &self,
        thread_id: &str,
        node: Option<&str>,
        state: &WorkflowState,
    ) -> Result<u64, SafelensError> {
        let log = self.log_for(thread_id)?;
        let mut entries = log
            .lock()
            .map_err(|e| SafelensError::Storage(format!("thread log lock poisoned: {}", e)))?;
        let sequence = entries.len() as u64;
        entries.push(Checkpoint {
            thread_id: thread_id.to_string(),
            sequence,
            node: node.map(str::to_string),
            state: state.clone(),
            created_at: Utc::now(),
        });
        Ok(sequence)
    }

    fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, SafelensError> {
        let Some(log) = self.existing_log(thread_id)? else {
            return Ok(None);
        };
        let entries = log
            .lock()
            .map_err(|e| SafelensError::Storage(format!("thread log lock poisoned: {}", e)))?;
        Ok(entries.last().cloned())
    }

    fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, SafelensError> {
        let Some(log) = self.existing_log(thread_id)? else {
            return Ok(Vec::new());
        };
        let entries = log
            .lock()
            .map_err(|e| SafelensError::Storage(format!("thread log lock poisoned: {}", e)))?;
        Ok(entries.clone())
    }
}

// =============================================================================
// SqliteCheckpointStore
// =============================================================================

/// Checkpoint store persisted in SQLite, for resumable sessions.
pub struct SqliteCheckpointStore {
    db: Arc<Database>,
}

impl SqliteCheckpointStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn append(
        &self,
        thread_id: &str,
        node: Option<&str>,
        state: &WorkflowState,
    ) -> Result<u64, SafelensError> {
        let state_json = serde_json::to_string(state)?;
        let created_at = Utc::now().to_rfc3339();

        self.db.with_transaction(|tx| {
            let sequence: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(sequence) + 1, 0) FROM checkpoints WHERE thread_id = ?1",
                    rusqlite::params![thread_id],
                    |row| row.get(0),
                )
                .map_err(|e| SafelensError::Storage(e.to_string()))?;

            tx.execute(
                "INSERT INTO checkpoints (thread_id, sequence, node, state_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![thread_id, sequence, node, state_json, created_at],
            )
            .map_err(|e| SafelensError::Storage(format!("Failed to save checkpoint: {}", e)))?;

            Ok(sequence as u64)
        })
    }

    fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, SafelensError> {
        self.db.with_reader(|conn| {
            let raw = conn
                .query_row(
                    "SELECT thread_id, sequence, node, state_json, created_at
                     FROM checkpoints WHERE thread_id = ?1
                     ORDER BY sequence DESC LIMIT 1",
                    rusqlite::params![thread_id],
                    read_raw,
                )
                .optional()
                .map_err(|e| SafelensError::Storage(e.to_string()))?;

            raw.map(RawCheckpoint::into_checkpoint).transpose()
        })
    }

    fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, SafelensError> {
        self.db.with_reader(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT thread_id, sequence, node, state_json, created_at
                     FROM checkpoints WHERE thread_id = ?1
                     ORDER BY sequence ASC",
                )
                .map_err(|e| SafelensError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![thread_id], read_raw)
                .map_err(|e| SafelensError::Storage(e.to_string()))?;

            let mut checkpoints = Vec::new();
            for raw in rows {
                let raw = raw.map_err(|e| SafelensError::Storage(e.to_string()))?;
                checkpoints.push(raw.into_checkpoint()?);
            }
            Ok(checkpoints)
        })
    }
}

struct RawCheckpoint {
    thread_id: String,
    sequence: i64,
    node: Option<String>,
    state_json: String,
    created_at: String,
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCheckpoint> {
    Ok(RawCheckpoint {
        thread_id: row.get(0)?,
        sequence: row.get(1)?,
        node: row.get(2)?,
        state_json: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl RawCheckpoint {
    fn into_checkpoint(self) -> Result<Checkpoint, SafelensError> {
        let state: WorkflowState = serde_json::from_str(&self.state_json)?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| SafelensError::Storage(format!("bad checkpoint timestamp: {}", e)))?
            .with_timezone(&Utc);
        Ok(Checkpoint {
            thread_id: self.thread_id,
            sequence: self.sequence as u64,
            node: self.node,
            state,
            created_at,
        })
    }
}
