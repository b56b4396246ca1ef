use std::sync::Arc;

use tracing::{debug, warn};

use safelens_core::{SemanticContext, WorkflowState};

use crate::catalog::SemanticLoader;
use crate::context::RunContext;
use crate::error::WorkflowError;
use crate::graph::NodeKind;

/// Attaches column semantics for the resolved dataset. Never fails on lookup.
///
/// The file read runs on the blocking pool.
pub struct SemanticLoad {
    loader: Arc<SemanticLoader>,
}

impl SemanticLoad {
    pub fn new(loader: Arc<SemanticLoader>) -> Self {
        Self { loader }
    }

    pub async fn run(&self, state: &mut WorkflowState, ctx: &RunContext) -> Result<(), WorkflowError> {
        ctx.check(NodeKind::SemanticLoad)?;

        let loader = Arc::clone(&self.loader);
        let dataset_id = state.resolved_dataset_id.clone();
        let load = tokio::task::spawn_blocking(move || loader.load(&dataset_id));
        state.semantic_context = match ctx.guard(NodeKind::SemanticLoad, load).await? {
            Ok(context) => context,
            Err(e) => {
                warn!("Semantic load task failed, continuing without context: {}", e);
                SemanticContext::new()
            }
        };
        debug!(
            dataset = %state.resolved_dataset_id,
            columns = state.semantic_context.len(),
            "Semantic context attached"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safelens_core::{History, SemanticContext};
    use std::collections::HashMap;

    fn loader() -> Arc<SemanticLoader> {
        let mut ctx = SemanticContext::new();
        ctx.insert("region".into(), "operating region".into());
        let mut map = HashMap::new();
        map.insert("incident_reports".to_string(), ctx);
        Arc::new(SemanticLoader::from_map(map))
    }

    #[tokio::test]
    async fn test_loads_known_and_degrades_unknown() {
        let node = SemanticLoad::new(loader());

        let mut state = WorkflowState::new("q", History::new());
        state.resolved_dataset_id = "incident_reports".into();
        node.run(&mut state, &RunContext::new()).await.unwrap();
        assert_eq!(state.semantic_context.len(), 1);

        let mut state = WorkflowState::new("q", History::new());
        state.resolved_dataset_id = "weather_data".into();
        node.run(&mut state, &RunContext::new()).await.unwrap();
        assert!(state.semantic_context.is_empty());
    }

    #[tokio::test]
    async fn test_reads_semantics_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("near_miss_events.json"),
            r#"{"severity": "1 (minor) to 5 (critical)", "site": "facility code"}"#,
        )
        .unwrap();
        let node = SemanticLoad::new(Arc::new(SemanticLoader::from_dir(dir.path())));

        let mut state = WorkflowState::new("q", History::new());
        state.resolved_dataset_id = "near_miss_events".into();
        node.run(&mut state, &RunContext::new()).await.unwrap();
        assert_eq!(state.semantic_context["site"], "facility code");
    }

    #[tokio::test]
    async fn test_cancelled_run_stops() {
        let node = SemanticLoad::new(loader());
        let ctx = RunContext::new();
        ctx.cancel();
        let mut state = WorkflowState::new("q", History::new());
        assert!(matches!(
            node.run(&mut state, &ctx).await,
            Err(WorkflowError::Cancelled)
        ));
    }
}
