use std::sync::Arc;

use tracing::{debug, warn};

use safelens_core::WorkflowState;
use safelens_storage::RelationalStore;

use crate::context::RunContext;
use crate::error::WorkflowError;
use crate::graph::NodeKind;

const NO_QUERY: &str = "no query was produced";

/// Runs the synthesized query once against the relational store.
///
/// Success clears `needs_clarification`; any store failure records the raw
/// driver message and sets it.
pub struct QueryExecutor {
    store: Arc<dyn RelationalStore>,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self { store }
    }

    pub async fn run(&self, state: &mut WorkflowState, ctx: &RunContext) -> Result<(), WorkflowError> {
        let query = state.synthesized_query.trim();
        if query.is_empty() {
            ctx.check(NodeKind::QueryExecution)?;
            warn!("Nothing to execute");
            state.result_rows.clear();
            state.error_message = Some(NO_QUERY.to_string());
            state.needs_clarification = true;
            return Ok(());
        }

        match ctx.guard(NodeKind::QueryExecution, self.store.execute(query)).await? {
            Ok(rows) => {
                debug!(rows = rows.len(), "Query executed");
                state.result_rows = rows;
                state.error_message = None;
                state.needs_clarification = false;
            }
            Err(e) => {
                warn!("Query execution failed: {}", e);
                state.result_rows.clear();
                state.error_message = Some(e.driver_message().to_string());
                state.needs_clarification = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use safelens_core::{History, Row};
    use safelens_storage::StoreError;
    use std::sync::Mutex;

    struct FakeStore {
        result: Result<Vec<Row>, StoreError>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RelationalStore for FakeStore {
        async fn execute(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
            self.calls.lock().unwrap().push(sql.to_string());
            self.result.clone()
        }
    }

    fn count_row(n: i64) -> Row {
        let mut row = Row::new();
        row.insert("count".into(), n.into());
        row
    }

    #[tokio::test]
    async fn test_success_sets_rows() {
        let store = Arc::new(FakeStore {
            result: Ok(vec![count_row(42)]),
            calls: Mutex::new(Vec::new()),
        });
        let node = QueryExecutor::new(store.clone());
        let mut state = WorkflowState::new("q", History::new());
        state.synthesized_query = "SELECT 42 AS count".into();
        node.run(&mut state, &RunContext::new()).await.unwrap();

        assert_eq!(state.result_rows, vec![count_row(42)]);
        assert!(!state.needs_clarification);
        assert!(state.error_message.is_none());
        assert_eq!(store.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_records_driver_message() {
        let store = Arc::new(FakeStore {
            result: Err(StoreError::Query("near \"SELEC\": syntax error".into())),
            calls: Mutex::new(Vec::new()),
        });
        let node = QueryExecutor::new(store.clone());
        let mut state = WorkflowState::new("q", History::new());
        state.synthesized_query = "SELEC".into();
        node.run(&mut state, &RunContext::new()).await.unwrap();

        assert!(state.needs_clarification);
        assert_eq!(
            state.error_message.as_deref(),
            Some("near \"SELEC\": syntax error")
        );
        assert!(state.result_rows.is_empty());
        assert_eq!(store.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_query_needs_clarification_without_store_call() {
        let store = Arc::new(FakeStore {
            result: Ok(Vec::new()),
            calls: Mutex::new(Vec::new()),
        });
        let node = QueryExecutor::new(store.clone());
        let mut state = WorkflowState::new("q", History::new());
        node.run(&mut state, &RunContext::new()).await.unwrap();

        assert!(state.needs_clarification);
        assert!(store.calls.lock().unwrap().is_empty());
    }
}
