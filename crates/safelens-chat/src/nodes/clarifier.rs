use std::sync::Arc;

use tracing::{debug, warn};

use safelens_core::history::CLARIFICATION_WINDOW;
use safelens_core::WorkflowState;

use crate::completion::{CompletionClient, CompletionRequest, CompletionTask};
use crate::context::RunContext;
use crate::error::WorkflowError;
use crate::graph::NodeKind;
use crate::prompts;

pub const FALLBACK_CLARIFICATION: &str = "I wasn't able to answer that from the available data. \
Could you rephrase your question or add more detail, such as the time period, location or type of event?";

/// Asks the user to rephrase after a failed query. Terminal.
///
/// The recorded error is given to the model as context, but a reply that
/// repeats it is replaced with fixed text.
pub struct ClarificationAgent {
    client: Arc<dyn CompletionClient>,
}

impl ClarificationAgent {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn run(&self, state: &mut WorkflowState, ctx: &RunContext) -> Result<(), WorkflowError> {
        let error = state.error_message.clone().unwrap_or_default();
        let request = CompletionRequest {
            task: CompletionTask::Clarification,
            system: prompts::CLARIFICATION_SYSTEM.to_string(),
            history: state.history.window(CLARIFICATION_WINDOW).to_vec(),
            prompt: prompts::clarification_prompt(&state.question, &error),
            json_mode: false,
        };

        let reply = match ctx.guard(NodeKind::Clarification, self.client.complete(&request)).await? {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                warn!("Clarification completion failed, using fallback: {}", e);
                String::new()
            }
        };

        state.final_answer = if reply.is_empty() || leaks(&reply, &error) {
            FALLBACK_CLARIFICATION.to_string()
        } else {
            reply
        };
        debug!("Clarification produced");
        Ok(())
    }
}

fn leaks(reply: &str, error: &str) -> bool {
    let error = error.trim();
    !error.is_empty() && reply.to_lowercase().contains(&error.to_lowercase())
}
