//! Conversation history per thread.
//!
//! Each thread keeps an immutable [`History`]; recording an exchange swaps in
//! a new log with the question and answer appended, trimmed to the configured
//! bound. Requests in flight keep the snapshot they started with.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use safelens_core::{History, SafelensError, Turn};

#[derive(Clone, Debug)]
struct ThreadEntry {
    history: History,
    last_active: DateTime<Utc>,
}

/// Overview of one thread, for listings.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub turn_count: usize,
    pub last_active: DateTime<Utc>,
}

/// Bounded thread id → history map.
pub struct SessionStore {
    max_turns: usize,
    threads: RwLock<HashMap<String, ThreadEntry>>,
}

impl SessionStore {
    /// `max_turns` of zero keeps unbounded history. Other bounds are counted
    /// in whole exchanges: odd values round down, and the smallest bound is
    /// one exchange, so a stored history always opens on a user turn.
    pub fn new(max_turns: usize) -> Self {
        let max_turns = match max_turns {
            0 => 0,
            1 => 2,
            n => n - n % 2,
        };
        Self {
            max_turns,
            threads: RwLock::new(HashMap::new()),
        }
    }

    /// History for `thread_id`; empty for unseen threads.
    pub fn history(&self, thread_id: &str) -> Result<History, SafelensError> {
        let threads = self
            .threads
            .read()
            .map_err(|e| SafelensError::Storage(format!("session lock poisoned: {}", e)))?;
        Ok(threads
            .get(thread_id)
            .map(|entry| entry.history.clone())
            .unwrap_or_default())
    }

    /// Append one user question and the assistant's answer.
    pub fn record_exchange(
        &self,
        thread_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<(), SafelensError> {
        let mut threads = self
            .threads
            .write()
            .map_err(|e| SafelensError::Storage(format!("session lock poisoned: {}", e)))?;

        let entry = threads
            .entry(thread_id.to_string())
            .or_insert_with(|| ThreadEntry {
                history: History::new(),
                last_active: Utc::now(),
            });

        let mut history = entry
            .history
            .appended(Turn::user(question))
            .appended(Turn::assistant(answer));
        if self.max_turns > 0 && history.len() > self.max_turns {
            history = history.truncated(self.max_turns);
        }

        entry.history = history;
        entry.last_active = Utc::now();
        debug!(thread_id, turns = entry.history.len(), "Recorded exchange");
        Ok(())
    }

    /// Known thread ids, most recently active first.
    pub fn thread_ids(&self) -> Vec<String> {
        self.summaries().into_iter().map(|s| s.thread_id).collect()
    }

    pub fn summaries(&self) -> Vec<ThreadSummary> {
        let Ok(threads) = self.threads.read() else {
            return Vec::new();
        };
        let mut out: Vec<ThreadSummary> = threads
            .iter()
            .map(|(id, entry)| ThreadSummary {
                thread_id: id.clone(),
                turn_count: entry.history.len(),
                last_active: entry.last_active,
            })
            .collect();
        out.sort_by(|a, b| {
            b.last_active
                .cmp(&a.last_active)
                .then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        out
    }

    /// Forget a thread. Returns whether it existed.
    pub fn clear(&self, thread_id: &str) -> Result<bool, SafelensError> {
        let mut threads = self
            .threads
            .write()
            .map_err(|e| SafelensError::Storage(format!("session lock poisoned: {}", e)))?;
        Ok(threads.remove(thread_id).is_some())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(50)
    }
}
