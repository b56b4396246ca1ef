use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use safelens_core::history::SUMMARY_WINDOW;
use safelens_core::{display_label, Row, Turn, WorkflowState};

use crate::completion::{CompletionClient, CompletionRequest, CompletionTask};
use crate::context::RunContext;
use crate::error::WorkflowError;
use crate::graph::NodeKind;
use crate::prompts;

/// Rows listed in the fallback summary.
const FALLBACK_ROWS: usize = 5;

/// Writes the natural-language answer for successful queries.
///
/// The dataset is named by its display label, never its internal id. The
/// answer is appended to the in-flight history so visualization sees it.
pub struct ResultSummarizer {
    client: Arc<dyn CompletionClient>,
}

impl ResultSummarizer {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn run(&self, state: &mut WorkflowState, ctx: &RunContext) -> Result<(), WorkflowError> {
        let label = dataset_label(&state.resolved_dataset_id);
        let request = CompletionRequest {
            task: CompletionTask::Summarization,
            system: prompts::SUMMARY_SYSTEM.to_string(),
            history: state.history.window(SUMMARY_WINDOW).to_vec(),
            prompt: prompts::summary_prompt(&state.question, label, &state.result_rows),
            json_mode: false,
        };

        let answer = match ctx.guard(NodeKind::Summarization, self.client.complete(&request)).await? {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => fallback_summary(label, &state.result_rows),
            Err(e) => {
                warn!("Summarization failed, using fallback: {}", e);
                fallback_summary(label, &state.result_rows)
            }
        };

        debug!(dataset = label, rows = state.result_rows.len(), "Summary produced");
        state.history = state.history.appended(Turn::assistant(answer.clone()));
        state.final_answer = answer;
        Ok(())
    }
}

fn dataset_label(id: &str) -> &str {
    if id.trim().is_empty() {
        "the available data"
    } else {
        display_label(id)
    }
}

/// Plain summary built from the rows alone.
pub fn fallback_summary(label: &str, rows: &[Row]) -> String {
    match rows {
        [] => format!("No matching records were found in {}.", label),
        [row] if row.len() == 1 => match row.iter().next() {
            Some((column, value)) => format!("{}: {} is {}.", label, column, render_value(value)),
            None => format!("No matching records were found in {}.", label),
        },
        _ => {
            let mut lines = vec![format!("Found {} rows in {}.", rows.len(), label)];
            for row in rows.iter().take(FALLBACK_ROWS) {
                let cells: Vec<String> = row
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, render_value(v)))
                    .collect();
                lines.push(format!("- {}", cells.join(", ")));
            }
            if rows.len() > FALLBACK_ROWS {
                lines.push(format!("...and {} more.", rows.len() - FALLBACK_ROWS));
            }
            lines.join("\n")
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "n/a".to_string(),
        other => other.to_string(),
    }
}
