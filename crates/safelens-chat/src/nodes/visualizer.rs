use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use safelens_core::history::SUMMARY_WINDOW;
use safelens_core::{Row, VisualizationSpec, WorkflowState};

use crate::completion::{CompletionClient, CompletionRequest, CompletionTask};
use crate::context::RunContext;
use crate::error::WorkflowError;
use crate::graph::NodeKind;
use crate::nodes::strip_code_fences;
use crate::prompts;

/// Produces a chart description for the result rows, or an empty object.
///
/// Terminal. A reply that does not parse as a JSON object records
/// `error_message` and sets `needs_clarification`; nothing routes on either
/// after this node, so the run still ends here with an empty spec.
pub struct VisualizationSynthesizer {
    client: Arc<dyn CompletionClient>,
}

impl VisualizationSynthesizer {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn run(&self, state: &mut WorkflowState, ctx: &RunContext) -> Result<(), WorkflowError> {
        if !chartable(&state.result_rows) {
            ctx.check(NodeKind::Visualization)?;
            debug!(rows = state.result_rows.len(), "Result not chartable, skipping visualization");
            state.visualization_spec = VisualizationSpec::new();
            return Ok(());
        }

        let request = CompletionRequest {
            task: CompletionTask::Visualization,
            system: prompts::VISUALIZATION_SYSTEM.to_string(),
            history: state.history.window(SUMMARY_WINDOW).to_vec(),
            prompt: prompts::visualization_prompt(&state.question, &state.result_rows),
            json_mode: true,
        };

        let reply = match ctx.guard(NodeKind::Visualization, self.client.complete(&request)).await? {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Visualization completion failed: {}", e);
                state.visualization_spec = VisualizationSpec::new();
                return Ok(());
            }
        };

        match parse_spec(&reply) {
            Ok(spec) => {
                let chart = spec.get("type").and_then(Value::as_str).unwrap_or("none");
                debug!(chart, "Visualization produced");
                state.visualization_spec = spec;
            }
            Err(message) => {
                warn!("Visualization reply unusable: {}", message);
                state.visualization_spec = VisualizationSpec::new();
                state.error_message = Some(message);
                state.needs_clarification = true;
            }
        }
        Ok(())
    }
}

/// Empty results and single scalars are not worth a chart.
fn chartable(rows: &[Row]) -> bool {
    match rows {
        [] => false,
        [row] => row.len() > 1,
        _ => true,
    }
}

/// An empty object means "no chart". Anything else must name a chart type and
/// carry at least one series.
fn parse_spec(reply: &str) -> Result<VisualizationSpec, String> {
    let spec = match serde_json::from_str::<Value>(strip_code_fences(reply)) {
        Ok(Value::Object(spec)) => spec,
        Ok(_) => return Err("visualization reply is not a JSON object".to_string()),
        Err(e) => return Err(format!("visualization reply is not valid JSON: {}", e)),
    };
    if spec.is_empty() {
        return Ok(spec);
    }

    let has_type = spec
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.trim().is_empty());
    if !has_type {
        return Err("visualization reply has no chart type".to_string());
    }
    let has_series = spec
        .get("series")
        .and_then(Value::as_array)
        .is_some_and(|series| !series.is_empty());
    if !has_series {
        return Err("visualization reply has no series".to_string());
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::testing::Scripted;
    use safelens_core::{History, Turn};
    use serde_json::json;

    const BAR: &str = r#"```json
{"type": "bar", "title": "Incidents by region", "x": {"field": "region", "label": "Region"}, "y": {"field": "count", "label": "Incidents"}, "series": [{"name": "Incidents", "field": "count"}]}
```"#;

    fn category_rows() -> Vec<Row> {
        [("north", 42), ("south", 17), ("east", 5)]
            .iter()
            .map(|(region, count)| {
                let mut row = Row::new();
                row.insert("region".into(), json!(region));
                row.insert("count".into(), json!(count));
                row
            })
            .collect()
    }

    fn state_with(rows: Vec<Row>) -> WorkflowState {
        let history = History::from_turns(vec![
            Turn::user("count events by region"),
            Turn::assistant("North leads with 42."),
        ]);
        let mut state = WorkflowState::new("count events by region", history);
        state.result_rows = rows;
        state.final_answer = "North leads with 42.".into();
        state
    }

    #[tokio::test]
    async fn test_category_rows_get_chart() {
        let client = Arc::new(Scripted::new().reply(CompletionTask::Visualization, BAR));
        let node = VisualizationSynthesizer::new(client.clone());
        let mut state = state_with(category_rows());
        node.run(&mut state, &RunContext::new()).await.unwrap();

        assert_eq!(state.visualization_spec["type"], "bar");
        assert!(!state.visualization_spec["series"].as_array().unwrap().is_empty());
        assert_eq!(state.final_answer, "North leads with 42.");

        let req = client.last();
        assert!(req.json_mode);
        assert_eq!(req.history.len(), 1);
        assert_eq!(req.history[0].content, "North leads with 42.");
    }

    #[tokio::test]
    async fn test_scalar_and_empty_skip_model() {
        let client = Arc::new(Scripted::new().reply(CompletionTask::Visualization, BAR));
        let node = VisualizationSynthesizer::new(client.clone());

        let mut scalar = Row::new();
        scalar.insert("count".into(), json!(42));
        let mut state = state_with(vec![scalar]);
        node.run(&mut state, &RunContext::new()).await.unwrap();
        assert!(state.visualization_spec.is_empty());

        let mut state = state_with(Vec::new());
        node.run(&mut state, &RunContext::new()).await.unwrap();
        assert!(state.visualization_spec.is_empty());

        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_parse_failure_records_error() {
        let client = Arc::new(Scripted::new().reply(CompletionTask::Visualization, "a bar chart would be nice"));
        let node = VisualizationSynthesizer::new(client);
        let mut state = state_with(category_rows());
        node.run(&mut state, &RunContext::new()).await.unwrap();

        assert!(state.visualization_spec.is_empty());
        assert!(state.needs_clarification);
        assert!(state.error_message.as_deref().unwrap().contains("not valid JSON"));
        assert_eq!(state.final_answer, "North leads with 42.");
    }

    #[test]
    fn test_parse_spec() {
        assert!(parse_spec("{}").unwrap().is_empty());
        assert!(parse_spec("[1, 2]").is_err());
        assert_eq!(parse_spec(BAR).unwrap()["x"]["field"], "region");
    }

    #[test]
    fn test_parse_spec_rejects_incomplete_chart() {
        assert_eq!(
            parse_spec(r#"{"title": "x"}"#).unwrap_err(),
            "visualization reply has no chart type"
        );
        assert_eq!(
            parse_spec(r#"{"type": "bar", "series": []}"#).unwrap_err(),
            "visualization reply has no series"
        );
        assert!(parse_spec(r#"{"type": " ", "series": [{"field": "count"}]}"#).is_err());
        assert!(parse_spec(r#"{"type": "pie", "series": [{"field": "count"}]}"#).is_ok());
    }

    #[tokio::test]
    async fn test_incomplete_chart_leaves_spec_empty() {
        let client = Arc::new(
            Scripted::new().reply(CompletionTask::Visualization, r#"{"title": "Incidents"}"#),
        );
        let node = VisualizationSynthesizer::new(client);
        let mut state = state_with(category_rows());
        node.run(&mut state, &RunContext::new()).await.unwrap();

        assert!(state.visualization_spec.is_empty());
        assert!(state.needs_clarification);
        assert_eq!(
            state.error_message.as_deref(),
            Some("visualization reply has no chart type")
        );
    }
}
