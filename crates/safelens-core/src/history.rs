//! Conversation history as an append-only log of explicit turn records.
//!
//! Nodes never mutate earlier turns; they only read a trailing window.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Turns forwarded to intent classification, table resolution and query synthesis.
pub const PLANNING_WINDOW: usize = 6;
/// Turns forwarded to the clarification agent.
pub const CLARIFICATION_WINDOW: usize = 2;
/// Turns forwarded to the result summarizer and visualization synthesizer.
pub const SUMMARY_WINDOW: usize = 1;

/// Who produced a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Immutable, ordered conversation log.
///
/// Cloning is cheap: the turns are shared. Appending produces a new log and
/// leaves the original untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    turns: Arc<[Turn]>,
}

impl Default for History {
    fn default() -> Self {
        Self::from_turns(Vec::new())
    }
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self {
            turns: turns.into(),
        }
    }

    /// Return a new log with `turn` appended.
    pub fn appended(&self, turn: Turn) -> Self {
        let mut turns = Vec::with_capacity(self.turns.len() + 1);
        turns.extend_from_slice(&self.turns);
        turns.push(turn);
        Self::from_turns(turns)
    }

    /// The last `n` turns, oldest first.
    pub fn window(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Keep only the last `n` turns.
    pub fn truncated(&self, n: usize) -> Self {
        Self::from_turns(self.window(n).to_vec())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
