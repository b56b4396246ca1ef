//! End-to-end workflow tests against a seeded SQLite database.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_stream::StreamExt;

use safelens_chat::{
    validate_path, CompletionClient, CompletionError, CompletionRequest, CompletionTask, NodeKind,
    Orchestrator, RunContext, SchemaCatalog, SemanticLoader, SessionStore, WorkflowError,
};
use safelens_core::{Intent, Row, SemanticContext};
use safelens_storage::{
    Database, MemoryCheckpointStore, RelationalStore, SqliteCheckpointStore, SqliteStore,
    StoreError,
};

// =============================================================================
// Fixtures
// =============================================================================

type Handler = Box<dyn Fn(&CompletionRequest) -> Result<String, CompletionError> + Send + Sync>;

/// Completion client answering each task from a script, recording every request.
#[derive(Default)]
struct ScriptedClient {
    handlers: HashMap<CompletionTask, Handler>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    fn new() -> Self {
        Self::default()
    }

    fn on<F>(mut self, task: CompletionTask, f: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, CompletionError> + Send + Sync + 'static,
    {
        self.handlers.insert(task, Box::new(f));
        self
    }

    fn text(self, task: CompletionTask, reply: &'static str) -> Self {
        self.on(task, move |_| Ok(reply.to_string()))
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn requests_for(&self, task: CompletionTask) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.task == task)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.handlers.get(&request.task) {
            Some(handler) => handler(request),
            None => Err(CompletionError::EmptyResponse),
        }
    }
}

/// Relational store wrapper counting executions.
struct CountingStore {
    inner: SqliteStore,
    calls: AtomicUsize,
}

#[async_trait]
impl RelationalStore for CountingStore {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(sql).await
    }
}

fn seed_database(dir: &Path) -> PathBuf {
    let path = dir.join("incidents.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE incident_reports (
            id INTEGER PRIMARY KEY,
            region TEXT NOT NULL,
            category TEXT NOT NULL,
            severity INTEGER NOT NULL
         );",
    )
    .unwrap();
    let mut insert = conn
        .prepare("INSERT INTO incident_reports (region, category, severity) VALUES (?1, ?2, ?3)")
        .unwrap();
    for i in 0..42 {
        insert.execute(rusqlite::params!["north", "slip", i % 5 + 1]).unwrap();
    }
    for i in 0..17 {
        insert.execute(rusqlite::params!["south", "fall", i % 3 + 1]).unwrap();
    }
    for _ in 0..5 {
        insert.execute(rusqlite::params!["east", "burn", 2]).unwrap();
    }
    path
}

fn semantics() -> SemanticLoader {
    let mut ctx = SemanticContext::new();
    ctx.insert("region".into(), "operating region: north, south, east".into());
    ctx.insert("severity".into(), "1 = minor .. 5 = fatal".into());
    let mut map = HashMap::new();
    map.insert("incident_reports".to_string(), ctx);
    SemanticLoader::from_map(map)
}

/// Summaries that echo the prompt's data source line and rows.
fn echo_summary(req: &CompletionRequest) -> Result<String, CompletionError> {
    let mut lines = req.prompt.lines();
    let label = lines
        .next()
        .and_then(|l| l.strip_prefix("Data source: "))
        .unwrap_or("?")
        .to_string();
    let rows = req
        .prompt
        .lines()
        .skip_while(|l| *l != "Rows:")
        .nth(1)
        .unwrap_or("[]")
        .to_string();
    Ok(format!("From {}: {}", label, rows))
}

const BAR_SPEC: &str = r#"{"type": "bar", "title": "Incidents by region", "x": {"field": "region", "label": "Region"}, "y": {"field": "count", "label": "Incidents"}, "series": [{"name": "Incidents", "field": "count"}]}"#;

fn data_client(query: &'static str) -> ScriptedClient {
    ScriptedClient::new()
        .text(CompletionTask::IntentClassification, "data_query")
        .text(CompletionTask::TableResolution, "incident_reports")
        .on(CompletionTask::QuerySynthesis, move |_| {
            Ok(format!("```sql\n{}\n```", query))
        })
        .on(CompletionTask::Summarization, echo_summary)
        .text(CompletionTask::Visualization, BAR_SPEC)
        .text(
            CompletionTask::Clarification,
            "I couldn't find that. Could you tell me which region and time period you mean?",
        )
}

struct Harness {
    _dir: tempfile::TempDir,
    client: Arc<ScriptedClient>,
    store: Arc<CountingStore>,
    sessions: Arc<SessionStore>,
    orchestrator: Arc<Orchestrator>,
}

fn harness(client: ScriptedClient) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db_path = seed_database(dir.path());
    let client = Arc::new(client);
    let store = Arc::new(CountingStore {
        inner: SqliteStore::new(db_path),
        calls: AtomicUsize::new(0),
    });
    let sessions = Arc::new(SessionStore::new(50));
    let orchestrator = Orchestrator::builder()
        .completion_client(client.clone())
        .relational_store(store.clone())
        .catalog(SchemaCatalog::default_stub())
        .semantics(semantics())
        .checkpoint_store(Arc::new(MemoryCheckpointStore::new()))
        .session_store(sessions.clone())
        .build()
        .unwrap();
    Harness {
        _dir: dir,
        client,
        store,
        sessions,
        orchestrator: Arc::new(orchestrator),
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_greeting_path_never_touches_store() {
    let h = harness(
        ScriptedClient::new()
            .text(CompletionTask::IntentClassification, "general")
            .text(CompletionTask::Greeting, "Hi! Ask me about incidents, near misses or inspections."),
    );
    let outcome = h
        .orchestrator
        .ask("t", "hi", &RunContext::new())
        .await
        .unwrap();

    assert_eq!(outcome.state.intent, Intent::General);
    assert_eq!(outcome.path, vec![NodeKind::IntentClassification, NodeKind::Greeting]);
    assert_eq!(
        outcome.final_answer,
        "Hi! Ask me about incidents, near misses or inspections."
    );
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 0);
    assert!(h.client.requests_for(CompletionTask::TableResolution).is_empty());
    assert!(outcome.state.synthesized_query.is_empty());
}

#[tokio::test]
async fn test_count_query_answer_has_value_and_label() {
    let h = harness(data_client(
        "SELECT COUNT(*) AS count FROM incident_reports WHERE region = 'north'",
    ));
    let outcome = h
        .orchestrator
        .ask("t", "count events in region north", &RunContext::new())
        .await
        .unwrap();

    assert_eq!(outcome.state.resolved_dataset_id, "incident_reports");
    assert_eq!(outcome.state.result_rows.len(), 1);
    assert_eq!(outcome.state.result_rows[0]["count"], 42);
    assert!(outcome.final_answer.contains("42"));
    assert!(outcome.final_answer.contains("Incident Reports"));
    assert!(!outcome.state.needs_clarification);
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 1);
    assert!(validate_path(&outcome.path).is_ok());
}

#[tokio::test]
async fn test_execution_error_yields_clarification_text() {
    let h = harness(data_client("SELEC COUNT(*) FROM incident_reports"));
    let outcome = h
        .orchestrator
        .ask("t", "count events in region north", &RunContext::new())
        .await
        .unwrap();

    assert!(outcome.state.needs_clarification);
    let raw = outcome.state.error_message.clone().unwrap();
    assert!(raw.contains("syntax error"));
    assert_eq!(
        outcome.final_answer,
        "I couldn't find that. Could you tell me which region and time period you mean?"
    );
    assert!(!outcome.final_answer.contains(&raw));
    assert_eq!(outcome.path.last(), Some(&NodeKind::Clarification));
    assert!(h.client.requests_for(CompletionTask::Summarization).is_empty());
}

#[tokio::test]
async fn test_missing_table_also_clarifies() {
    let h = harness(data_client("SELECT COUNT(*) FROM weather"));
    let outcome = h
        .orchestrator
        .ask("t", "how hot was it?", &RunContext::new())
        .await
        .unwrap();
    assert_eq!(outcome.path.last(), Some(&NodeKind::Clarification));
    assert!(!outcome.final_answer.contains("no such table"));
}

#[tokio::test]
async fn test_category_rows_chart_scalar_no_chart() {
    let h = harness(data_client(
        "SELECT region, COUNT(*) AS count FROM incident_reports GROUP BY region ORDER BY count DESC",
    ));
    let outcome = h
        .orchestrator
        .ask("t", "incidents by region", &RunContext::new())
        .await
        .unwrap();
    assert_eq!(outcome.state.result_rows.len(), 3);
    assert_eq!(outcome.visualization_spec["type"], "bar");
    assert!(!outcome.visualization_spec["series"]
        .as_array()
        .unwrap()
        .is_empty());

    let h = harness(data_client("SELECT COUNT(*) AS count FROM incident_reports"));
    let outcome = h
        .orchestrator
        .ask("t", "how many incidents?", &RunContext::new())
        .await
        .unwrap();
    assert!(outcome.visualization_spec.is_empty());
    assert!(h.client.requests_for(CompletionTask::Visualization).is_empty());
}

#[tokio::test]
async fn test_unknown_dataset_degrades_and_continues() {
    let h = harness(
        data_client("SELECT COUNT(*) AS count FROM incident_reports")
            .text(CompletionTask::TableResolution, "weather_data"),
    );
    let outcome = h
        .orchestrator
        .ask("t", "how many incidents?", &RunContext::new())
        .await
        .unwrap();

    assert_eq!(outcome.state.resolved_dataset_id, "weather_data");
    assert!(outcome.state.semantic_context.is_empty());
    assert!(outcome.final_answer.starts_with("From weather_data:"));
}

// =============================================================================
// History windows
// =============================================================================

#[tokio::test]
async fn test_history_windows_per_node() {
    let h = harness(data_client("SELECT COUNT(*) AS count FROM incident_reports"));
    for i in 0..5 {
        h.sessions
            .record_exchange("t", &format!("q{}", i), &format!("a{}", i))
            .unwrap();
    }

    h.orchestrator
        .ask("t", "how many incidents?", &RunContext::new())
        .await
        .unwrap();

    for task in [
        CompletionTask::IntentClassification,
        CompletionTask::TableResolution,
        CompletionTask::QuerySynthesis,
    ] {
        let req = &h.client.requests_for(task)[0];
        assert_eq!(req.history.len(), 6, "{:?}", task);
        assert_eq!(req.history[0].content, "q2");
        assert_eq!(req.history[5].content, "a4");
    }
    let summary = &h.client.requests_for(CompletionTask::Summarization)[0];
    assert_eq!(summary.history.len(), 1);
    assert_eq!(summary.history[0].content, "a4");

    let h2 = harness(data_client("SELEC"));
    for i in 0..5 {
        h2.sessions
            .record_exchange("t", &format!("q{}", i), &format!("a{}", i))
            .unwrap();
    }
    h2.orchestrator
        .ask("t", "how many incidents?", &RunContext::new())
        .await
        .unwrap();
    let clarify = &h2.client.requests_for(CompletionTask::Clarification)[0];
    assert!(clarify.history.len() <= 2);
    assert_eq!(clarify.history.last().unwrap().content, "a4");
}

#[tokio::test]
async fn test_follow_up_sees_previous_exchange() {
    let h = harness(data_client("SELECT COUNT(*) AS count FROM incident_reports"));
    let first = h
        .orchestrator
        .ask("t", "how many incidents?", &RunContext::new())
        .await
        .unwrap();
    h.orchestrator
        .ask("t", "and in the south?", &RunContext::new())
        .await
        .unwrap();

    let classify = h.client.requests_for(CompletionTask::IntentClassification);
    assert!(classify[0].history.is_empty());
    assert_eq!(classify[1].history.len(), 2);
    assert_eq!(classify[1].history[0].content, "how many incidents?");
    assert_eq!(classify[1].history[1].content, first.final_answer);

    assert!(h.sessions.history("other").unwrap().is_empty());
}

// =============================================================================
// Streaming, checkpoints, cancellation
// =============================================================================

#[tokio::test]
async fn test_streamed_events_follow_path() {
    let h = harness(data_client("SELEC nonsense"));
    let events: Vec<_> = h
        .orchestrator
        .ask_streamed("s", "count events in region north", RunContext::new())
        .collect()
        .await;
    let events: Vec<_> = events.into_iter().map(Result::unwrap).collect();

    let nodes: Vec<&str> = events.iter().filter_map(|e| e.node.as_deref()).collect();
    assert_eq!(
        nodes,
        vec![
            "intent_classification",
            "table_resolution",
            "semantic_load",
            "query_synthesis",
            "query_execution",
            "clarification",
        ]
    );
    let last = events.last().unwrap();
    assert!(last.is_final());
    assert_eq!(events.iter().filter(|e| e.is_final()).count(), 1);

    let wire = serde_json::to_string(&events).unwrap();
    assert!(!wire.contains("syntax error"));
}

#[tokio::test]
async fn test_sqlite_checkpoints_accumulate_per_thread() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = seed_database(dir.path());
    let checkpoints = Arc::new(SqliteCheckpointStore::new(Arc::new(
        Database::new(&dir.path().join("checkpoints.db")).unwrap(),
    )));
    let orchestrator = Orchestrator::builder()
        .completion_client(Arc::new(data_client(
            "SELECT COUNT(*) AS count FROM incident_reports",
        )))
        .relational_store(Arc::new(SqliteStore::new(db_path)))
        .semantics(semantics())
        .checkpoint_store(checkpoints)
        .build()
        .unwrap();

    let first = orchestrator
        .ask("a", "how many incidents?", &RunContext::new())
        .await
        .unwrap();
    orchestrator
        .ask("a", "how many incidents again?", &RunContext::new())
        .await
        .unwrap();
    orchestrator
        .ask("b", "how many incidents?", &RunContext::new())
        .await
        .unwrap();

    let history = orchestrator.state_history("a").unwrap();
    assert_eq!(history.len(), first.path.len() * 2);
    let sequences: Vec<u64> = history.iter().map(|c| c.sequence).collect();
    assert_eq!(sequences, (0..history.len() as u64).collect::<Vec<_>>());
    assert_eq!(
        orchestrator.latest_state("a").unwrap().unwrap().question,
        "how many incidents again?"
    );
    assert_eq!(orchestrator.state_history("b").unwrap().len(), first.path.len());
}

#[tokio::test]
async fn test_concurrent_threads_isolated() {
    let h = harness(data_client("SELECT COUNT(*) AS count FROM incident_reports"));
    let mut handles = Vec::new();
    for t in 0..4 {
        let orch = Arc::clone(&h.orchestrator);
        handles.push(tokio::spawn(async move {
            orch.ask(&format!("t{}", t), &format!("question {}", t), &RunContext::new())
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    for t in 0..4 {
        let history = h.orchestrator.state_history(&format!("t{}", t)).unwrap();
        assert!(history.iter().all(|c| c.state.question == format!("question {}", t)));
        assert_eq!(h.sessions.history(&format!("t{}", t)).unwrap().len(), 2);
    }
}

#[tokio::test]
async fn test_cancellation_aborts_run() {
    let h = harness(data_client("SELECT 1").slow(Duration::from_secs(30)));
    let ctx = RunContext::new();
    let token = ctx.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = h.orchestrator.ask("t", "hi", &ctx).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Cancelled));
    assert!(h.sessions.history("t").unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_exceeded_names_node() {
    let h = harness(
        ScriptedClient::new()
            .text(CompletionTask::IntentClassification, "general")
            .text(CompletionTask::Greeting, "hello")
            .slow(Duration::from_secs(10)),
    );
    let ctx = RunContext::with_timeout(Duration::from_secs(1));
    let err = h.orchestrator.ask("t", "hi", &ctx).await.unwrap_err();
    assert!(!err.user_message().contains("intent_classification"));
    match err {
        WorkflowError::DeadlineExceeded { node } => assert_eq!(node, "intent_classification"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(h.orchestrator.state_history("t").unwrap().is_empty());
}

#[tokio::test]
async fn test_classification_failure_is_fatal() {
    let h = harness(ScriptedClient::new().on(CompletionTask::IntentClassification, |_| {
        Err(CompletionError::Unavailable("connection refused".into()))
    }));
    let err = h
        .orchestrator
        .ask("t", "count events", &RunContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Classification(_)));
    assert!(!err.user_message().contains("connection refused"));
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 0);
}
