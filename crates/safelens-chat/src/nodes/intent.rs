use std::sync::Arc;

use tracing::{debug, error};

use safelens_core::history::PLANNING_WINDOW;
use safelens_core::{Intent, WorkflowState};

use crate::completion::{CompletionClient, CompletionRequest, CompletionTask};
use crate::context::RunContext;
use crate::error::WorkflowError;
use crate::graph::NodeKind;
use crate::prompts;

/// Decides whether a turn is small talk or a data question.
///
/// A completion failure here aborts the request.
pub struct IntentClassifier {
    client: Arc<dyn CompletionClient>,
}

impl IntentClassifier {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn run(&self, state: &mut WorkflowState, ctx: &RunContext) -> Result<(), WorkflowError> {
        let request = CompletionRequest {
            task: CompletionTask::IntentClassification,
            system: prompts::INTENT_SYSTEM.to_string(),
            history: state.history.window(PLANNING_WINDOW).to_vec(),
            prompt: prompts::intent_prompt(&state.question),
            json_mode: false,
        };

        let reply = ctx
            .guard(NodeKind::IntentClassification, self.client.complete(&request))
            .await?
            .map_err(|e| {
                error!("Intent classification failed: {}", e);
                WorkflowError::Classification(e)
            })?;

        state.intent = Intent::from_token(&reply);
        debug!(intent = state.intent.as_str(), "Classified intent");
        Ok(())
    }
}
