use std::sync::Arc;

use tracing::{debug, warn};

use safelens_core::WorkflowState;

use crate::completion::{CompletionClient, CompletionRequest, CompletionTask};
use crate::context::RunContext;
use crate::error::WorkflowError;
use crate::graph::NodeKind;
use crate::prompts;

pub const FALLBACK_GREETING: &str =
    "Hello! I can answer questions about incident reports, near-miss events and safety inspections. What would you like to know?";

/// Short friendly reply for small talk. Sees only the question.
pub struct GreetingAgent {
    client: Arc<dyn CompletionClient>,
}

impl GreetingAgent {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn run(&self, state: &mut WorkflowState, ctx: &RunContext) -> Result<(), WorkflowError> {
        let request = CompletionRequest {
            task: CompletionTask::Greeting,
            system: prompts::GREETING_SYSTEM.to_string(),
            history: Vec::new(),
            prompt: state.question.clone(),
            json_mode: false,
        };

        state.final_answer = match ctx.guard(NodeKind::Greeting, self.client.complete(&request)).await? {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => {
                warn!("Greeting completion was blank, using fallback");
                FALLBACK_GREETING.to_string()
            }
            Err(e) => {
                warn!("Greeting completion failed, using fallback: {}", e);
                FALLBACK_GREETING.to_string()
            }
        };
        debug!("Greeting produced");
        Ok(())
    }
}
