use std::sync::Arc;

use tracing::{debug, warn};

use safelens_core::history::PLANNING_WINDOW;
use safelens_core::WorkflowState;

use crate::completion::{CompletionClient, CompletionRequest, CompletionTask};
use crate::context::RunContext;
use crate::error::WorkflowError;
use crate::graph::NodeKind;
use crate::nodes::strip_code_fences;
use crate::prompts;

/// Turns the question and dataset semantics into a query string.
///
/// The query is not validated before execution; a bad query surfaces as an
/// execution failure and routes to clarification.
pub struct QuerySynthesizer {
    client: Arc<dyn CompletionClient>,
}

impl QuerySynthesizer {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn run(&self, state: &mut WorkflowState, ctx: &RunContext) -> Result<(), WorkflowError> {
        let request = CompletionRequest {
            task: CompletionTask::QuerySynthesis,
            system: prompts::SYNTHESIS_SYSTEM.to_string(),
            history: state.history.window(PLANNING_WINDOW).to_vec(),
            prompt: prompts::synthesis_prompt(
                &state.question,
                &state.resolved_dataset_id,
                &state.semantic_context,
            ),
            json_mode: false,
        };

        state.synthesized_query = match ctx
            .guard(NodeKind::QuerySynthesis, self.client.complete(&request))
            .await?
        {
            Ok(reply) => strip_code_fences(&reply).to_string(),
            Err(e) => {
                warn!("Query synthesis failed: {}", e);
                String::new()
            }
        };
        debug!(query = %state.synthesized_query, "Synthesized query");
        Ok(())
    }
}
