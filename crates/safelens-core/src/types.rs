use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::history::History;

/// One materialized result row, keyed by the query's returned column names.
pub type Row = Map<String, Value>;

/// Column semantics for a dataset.
pub type SemanticContext = Map<String, Value>;

/// Structured chart description, or an empty map when no chart applies.
pub type VisualizationSpec = Map<String, Value>;

// =============================================================================
// Intent
// =============================================================================

/// Classification of a turn: casual conversation or a data question.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    General,
    #[default]
    DataQuery,
}

impl Intent {
    /// Parse the classifier's single-token answer.
    ///
    /// Only an explicit `general` token selects the greeting path; anything
    /// else is treated as a data question.
    pub fn from_token(token: &str) -> Self {
        let normalized: String = token
            .trim()
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect::<String>()
            .to_lowercase();
        if normalized == "general" {
            Intent::General
        } else {
            Intent::DataQuery
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::General => "general",
            Intent::DataQuery => "data_query",
        }
    }
}

// =============================================================================
// WorkflowState
// =============================================================================

/// Per-request state threaded through every workflow node.
///
/// `needs_clarification` is written only by query execution and read only by
/// the routing decision that follows it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub question: String,
    pub intent: Intent,
    pub history: History,
    pub resolved_dataset_id: String,
    pub semantic_context: SemanticContext,
    pub synthesized_query: String,
    pub result_rows: Vec<Row>,
    pub error_message: Option<String>,
    pub needs_clarification: bool,
    pub visualization_spec: VisualizationSpec,
    pub final_answer: String,
}

impl WorkflowState {
    pub fn new(question: impl Into<String>, history: History) -> Self {
        Self {
            question: question.into(),
            history,
            ..Self::default()
        }
    }
}
