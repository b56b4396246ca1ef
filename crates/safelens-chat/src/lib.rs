//! Conversational query workflow over safety-incident data.
//!
//! A question flows through intent classification, dataset resolution,
//! query synthesis and execution, then ends in a greeting, a clarification
//! request, or a summary with an optional chart description.

pub mod catalog;
pub mod completion;
pub mod context;
pub mod error;
pub mod graph;
pub mod nodes;
pub mod orchestrator;
pub mod prompts;
pub mod session;

pub use catalog::{SchemaCatalog, SemanticLoader};
pub use completion::{
    ClientPool, CompletionClient, CompletionRequest, CompletionTask, OpenAiCompatClient,
};
pub use context::RunContext;
pub use error::{CompletionError, WorkflowError};
pub use graph::{validate_path, NodeKind, PathError};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, WorkflowOutcome, MAX_QUESTION_CHARS};
pub use session::{SessionStore, ThreadSummary};
