//! The workflow graph: node identities and conditional edges.
//!
//! ```text
//! IntentClassification -> Greeting                                   (intent = general)
//!                      -> TableResolution -> SemanticLoad -> QuerySynthesis -> QueryExecution
//! QueryExecution       -> Clarification                              (needs_clarification)
//!                      -> Summarization -> Visualization
//! ```
//!
//! There are no cycles, so every run visits at most seven nodes and ends in
//! exactly one terminal node.

use serde::{Deserialize, Serialize};

use safelens_core::{Intent, WorkflowState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    IntentClassification,
    Greeting,
    TableResolution,
    SemanticLoad,
    QuerySynthesis,
    QueryExecution,
    Clarification,
    Summarization,
    Visualization,
}

impl NodeKind {
    pub const START: NodeKind = NodeKind::IntentClassification;

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::IntentClassification => "intent_classification",
            NodeKind::Greeting => "greeting",
            NodeKind::TableResolution => "table_resolution",
            NodeKind::SemanticLoad => "semantic_load",
            NodeKind::QuerySynthesis => "query_synthesis",
            NodeKind::QueryExecution => "query_execution",
            NodeKind::Clarification => "clarification",
            NodeKind::Summarization => "summarization",
            NodeKind::Visualization => "visualization",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeKind::Greeting | NodeKind::Clarification | NodeKind::Visualization
        )
    }

    /// The node that follows `self` given the state it produced.
    ///
    /// Returns `None` after a terminal node.
    pub fn next(&self, state: &WorkflowState) -> Option<NodeKind> {
        match self {
            NodeKind::IntentClassification => Some(match state.intent {
                Intent::General => NodeKind::Greeting,
                Intent::DataQuery => NodeKind::TableResolution,
            }),
            NodeKind::TableResolution => Some(NodeKind::SemanticLoad),
            NodeKind::SemanticLoad => Some(NodeKind::QuerySynthesis),
            NodeKind::QuerySynthesis => Some(NodeKind::QueryExecution),
            NodeKind::QueryExecution => Some(if state.needs_clarification {
                NodeKind::Clarification
            } else {
                NodeKind::Summarization
            }),
            NodeKind::Summarization => Some(NodeKind::Visualization),
            NodeKind::Greeting | NodeKind::Clarification | NodeKind::Visualization => None,
        }
    }

    /// Nodes that may legally follow `self`, regardless of state.
    pub fn successors(&self) -> &'static [NodeKind] {
        match self {
            NodeKind::IntentClassification => &[NodeKind::Greeting, NodeKind::TableResolution],
            NodeKind::TableResolution => &[NodeKind::SemanticLoad],
            NodeKind::SemanticLoad => &[NodeKind::QuerySynthesis],
            NodeKind::QuerySynthesis => &[NodeKind::QueryExecution],
            NodeKind::QueryExecution => &[NodeKind::Clarification, NodeKind::Summarization],
            NodeKind::Summarization => &[NodeKind::Visualization],
            NodeKind::Greeting | NodeKind::Clarification | NodeKind::Visualization => &[],
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a recorded path is not a complete walk of the graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path must start at {expected}, found {found}")]
    BadStart { expected: NodeKind, found: NodeKind },
    #[error("no edge from {from} to {to}")]
    NoEdge { from: NodeKind, to: NodeKind },
    #[error("path ends at non-terminal node {0}")]
    Unterminated(NodeKind),
}

/// Check that `path` starts at [`NodeKind::START`], follows only graph edges
/// and ends at a terminal node.
pub fn validate_path(path: &[NodeKind]) -> Result<(), PathError> {
    let (first, last) = match (path.first(), path.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return Err(PathError::Empty),
    };
    if first != NodeKind::START {
        return Err(PathError::BadStart {
            expected: NodeKind::START,
            found: first,
        });
    }
    for pair in path.windows(2) {
        if !pair[0].successors().contains(&pair[1]) {
            return Err(PathError::NoEdge {
                from: pair[0],
                to: pair[1],
            });
        }
    }
    if !last.is_terminal() {
        return Err(PathError::Unterminated(last));
    }
    Ok(())
}
