use std::sync::Arc;

use tracing::{debug, warn};

use safelens_core::history::PLANNING_WINDOW;
use safelens_core::{DatasetResolution, WorkflowState};

use crate::catalog::SchemaCatalog;
use crate::completion::{CompletionClient, CompletionRequest, CompletionTask};
use crate::context::RunContext;
use crate::error::WorkflowError;
use crate::graph::NodeKind;
use crate::prompts;

/// Picks the dataset a question targets.
///
/// The model's answer is parsed into a [`DatasetResolution`] but never
/// rejected: ids outside the catalog flow on and degrade at semantic load.
pub struct TableResolver {
    client: Arc<dyn CompletionClient>,
    catalog: Arc<SchemaCatalog>,
}

impl TableResolver {
    pub fn new(client: Arc<dyn CompletionClient>, catalog: Arc<SchemaCatalog>) -> Self {
        Self { client, catalog }
    }

    pub async fn run(&self, state: &mut WorkflowState, ctx: &RunContext) -> Result<(), WorkflowError> {
        let request = CompletionRequest {
            task: CompletionTask::TableResolution,
            system: prompts::RESOLVER_SYSTEM.to_string(),
            history: state.history.window(PLANNING_WINDOW).to_vec(),
            prompt: prompts::resolver_prompt(&state.question, &self.catalog.describe()),
            json_mode: false,
        };

        let resolution = match ctx
            .guard(NodeKind::TableResolution, self.client.complete(&request))
            .await?
        {
            Ok(reply) => DatasetResolution::parse(&reply),
            Err(e) => {
                warn!("Table resolution failed, continuing without a dataset: {}", e);
                DatasetResolution::Unknown(String::new())
            }
        };

        if !resolution.is_known() || !self.catalog.contains(resolution.id()) {
            warn!(dataset = resolution.id(), "Resolved dataset is not in the catalog");
        }
        debug!(dataset = resolution.id(), "Resolved dataset");
        state.resolved_dataset_id = resolution.id().to_string();
        Ok(())
    }
}
