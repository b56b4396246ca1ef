//! Error types for the query workflow.

use safelens_core::SafelensError;

/// Failure talking to the completion service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Unavailable(String),
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion service returned no content")]
    EmptyResponse,
    #[error("no completion clients configured")]
    NoClients,
}

/// Request-level failures that abort a workflow run.
///
/// Everything else a node can hit is recorded on the workflow state instead.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("question cannot be empty")]
    EmptyQuestion,
    #[error("question exceeds maximum length of {0} characters")]
    QuestionTooLong(usize),
    #[error("intent classification failed: {0}")]
    Classification(#[source] CompletionError),
    #[error("request cancelled")]
    Cancelled,
    #[error("deadline exceeded during {node}")]
    DeadlineExceeded { node: String },
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl WorkflowError {
    /// Text safe to show to the person asking. Never includes internal causes.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::EmptyQuestion => "Please enter a question.".to_string(),
            WorkflowError::QuestionTooLong(max) => {
                format!("Please keep your question under {} characters.", max)
            }
            WorkflowError::Cancelled => "The request was cancelled.".to_string(),
            WorkflowError::Classification(_)
            | WorkflowError::DeadlineExceeded { .. }
            | WorkflowError::Checkpoint(_) => {
                "Sorry, something went wrong while processing your request. Please try again."
                    .to_string()
            }
        }
    }
}

impl From<SafelensError> for WorkflowError {
    fn from(err: SafelensError) -> Self {
        WorkflowError::Checkpoint(err.to_string())
    }
}
