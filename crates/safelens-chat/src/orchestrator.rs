//! Workflow orchestrator: drives a question through the node graph.
//!
//! Runs are strictly sequential within a request. Separate threads may run
//! concurrently; the session and checkpoint stores isolate them.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, error, info, info_span, warn, Instrument};

use safelens_core::config::WorkflowConfig;
use safelens_core::{SafelensError, StreamEvent, VisualizationSpec, WorkflowState};
use safelens_storage::{Checkpoint, CheckpointStore, RelationalStore};

use crate::catalog::{SchemaCatalog, SemanticLoader};
use crate::completion::CompletionClient;
use crate::context::RunContext;
use crate::error::WorkflowError;
use crate::graph::NodeKind;
use crate::nodes::{
    ClarificationAgent, GreetingAgent, IntentClassifier, QueryExecutor, QuerySynthesizer,
    ResultSummarizer, SemanticLoad, TableResolver, VisualizationSynthesizer,
};
use crate::session::SessionStore;

/// Maximum question length in characters.
pub const MAX_QUESTION_CHARS: usize = 4000;

const STREAM_BUFFER: usize = 16;

type EventSender = mpsc::Sender<Result<StreamEvent, WorkflowError>>;

/// Result of one completed run.
#[derive(Clone, Debug)]
pub struct WorkflowOutcome {
    pub thread_id: String,
    pub final_answer: String,
    pub visualization_spec: VisualizationSpec,
    /// Nodes visited, in order.
    pub path: Vec<NodeKind>,
    pub state: WorkflowState,
}

struct Nodes {
    intent: IntentClassifier,
    greeting: GreetingAgent,
    resolver: TableResolver,
    semantic: SemanticLoad,
    synthesizer: QuerySynthesizer,
    executor: QueryExecutor,
    clarifier: ClarificationAgent,
    summarizer: ResultSummarizer,
    visualizer: VisualizationSynthesizer,
}

impl Nodes {
    async fn run(
        &self,
        node: NodeKind,
        state: &mut WorkflowState,
        ctx: &RunContext,
    ) -> Result<(), WorkflowError> {
        match node {
            NodeKind::IntentClassification => self.intent.run(state, ctx).await,
            NodeKind::Greeting => self.greeting.run(state, ctx).await,
            NodeKind::TableResolution => self.resolver.run(state, ctx).await,
            NodeKind::SemanticLoad => self.semantic.run(state, ctx).await,
            NodeKind::QuerySynthesis => self.synthesizer.run(state, ctx).await,
            NodeKind::QueryExecution => self.executor.run(state, ctx).await,
            NodeKind::Clarification => self.clarifier.run(state, ctx).await,
            NodeKind::Summarization => self.summarizer.run(state, ctx).await,
            NodeKind::Visualization => self.visualizer.run(state, ctx).await,
        }
    }
}

/// Central coordinator wiring nodes, sessions and checkpoints.
pub struct Orchestrator {
    nodes: Nodes,
    sessions: Arc<SessionStore>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    request_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Answer one question on `thread_id` and wait for the result.
    pub async fn ask(
        &self,
        thread_id: &str,
        question: &str,
        ctx: &RunContext,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let span = info_span!("workflow", thread_id);
        self.drive(thread_id, question, ctx, None).instrument(span).await
    }

    /// Answer one question, yielding a `node_update` event per completed node
    /// and then a single `final_answer` event.
    ///
    /// A fatal error ends the stream with one `Err` item. Dropping the stream
    /// cancels the run at its next suspension point.
    pub fn ask_streamed(
        self: &Arc<Self>,
        thread_id: impl Into<String>,
        question: impl Into<String>,
        ctx: RunContext,
    ) -> impl Stream<Item = Result<StreamEvent, WorkflowError>> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let this = Arc::clone(self);
        let thread_id = thread_id.into();
        let question = question.into();

        tokio::spawn(async move {
            let span = info_span!("workflow", thread_id = %thread_id);
            let result = this
                .drive(&thread_id, &question, &ctx, Some(&tx))
                .instrument(span)
                .await;
            let last = match result {
                Ok(outcome) => Ok(StreamEvent::final_answer(
                    Some(&outcome.thread_id),
                    &outcome.final_answer,
                    Value::Object(outcome.visualization_spec),
                )),
                Err(e) => Err(e),
            };
            if tx.send(last).await.is_err() {
                debug!("Stream receiver dropped before final event");
            }
        });

        ReceiverStream::new(rx)
    }

    /// Most recent checkpointed state for the thread.
    pub fn latest_state(&self, thread_id: &str) -> Result<Option<WorkflowState>, WorkflowError> {
        match &self.checkpoints {
            Some(store) => Ok(store.latest(thread_id)?.map(|c| c.state)),
            None => Ok(None),
        }
    }

    /// Every checkpoint recorded for the thread, oldest first.
    pub fn state_history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, WorkflowError> {
        match &self.checkpoints {
            Some(store) => Ok(store.history(thread_id)?),
            None => Ok(Vec::new()),
        }
    }

    async fn drive(
        &self,
        thread_id: &str,
        question: &str,
        ctx: &RunContext,
        events: Option<&EventSender>,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let question = validate_question(question)?;
        let ctx = ctx.or_timeout(self.request_timeout);

        let history = self.sessions.history(thread_id)?;
        let mut state = WorkflowState::new(question, history);
        let mut path = Vec::new();
        let mut node = NodeKind::START;

        info!(history = state.history.len(), "Workflow started");

        loop {
            debug!(node = node.as_str(), "Entering node");
            if let Err(e) = self.nodes.run(node, &mut state, &ctx).await {
                error!(node = node.as_str(), "Workflow aborted: {}", e);
                return Err(e);
            }
            path.push(node);

            self.checkpoint(thread_id, node, &state).await;

            if let Some(tx) = events {
                let event =
                    StreamEvent::node_update(Some(thread_id), node.as_str(), node_update_data(node, &state));
                if tx.send(Ok(event)).await.is_err() {
                    debug!("Stream receiver dropped, cancelling run");
                    ctx.cancel();
                }
            }

            match node.next(&state) {
                Some(next) => node = next,
                None => break,
            }
        }

        self.sessions
            .record_exchange(thread_id, &state.question, &state.final_answer)?;

        info!(
            path = ?path.iter().map(NodeKind::as_str).collect::<Vec<_>>(),
            rows = state.result_rows.len(),
            "Workflow finished"
        );

        Ok(WorkflowOutcome {
            thread_id: thread_id.to_string(),
            final_answer: state.final_answer.clone(),
            visualization_spec: state.visualization_spec.clone(),
            path,
            state,
        })
    }

    /// Persist the state after `node`. A failed write is logged and the run
    /// continues without that snapshot.
    async fn checkpoint(&self, thread_id: &str, node: NodeKind, state: &WorkflowState) {
        let Some(store) = &self.checkpoints else {
            return;
        };
        let store = Arc::clone(store);
        let thread = thread_id.to_string();
        let snapshot = state.clone();
        let write =
            tokio::task::spawn_blocking(move || store.append(&thread, Some(node.as_str()), &snapshot));

        match write.await {
            Ok(Ok(sequence)) => debug!(node = node.as_str(), sequence, "Checkpoint saved"),
            Ok(Err(e)) => warn!(node = node.as_str(), "Checkpoint write failed: {}", e),
            Err(e) => warn!(node = node.as_str(), "Checkpoint task failed: {}", e),
        }
    }
}

fn validate_question(question: &str) -> Result<&str, WorkflowError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::EmptyQuestion);
    }
    if trimmed.chars().count() > MAX_QUESTION_CHARS {
        return Err(WorkflowError::QuestionTooLong(MAX_QUESTION_CHARS));
    }
    Ok(trimmed)
}

/// The slice of state a node produced, as event payload.
///
/// Raw execution errors are never included.
fn node_update_data(node: NodeKind, state: &WorkflowState) -> Value {
    match node {
        NodeKind::IntentClassification => json!({ "intent": state.intent }),
        NodeKind::TableResolution => json!({ "resolved_dataset_id": state.resolved_dataset_id }),
        NodeKind::SemanticLoad => json!({ "semantic_context": state.semantic_context }),
        NodeKind::QuerySynthesis => json!({ "synthesized_query": state.synthesized_query }),
        NodeKind::QueryExecution => json!({
            "row_count": state.result_rows.len(),
            "result_rows": state.result_rows,
            "needs_clarification": state.needs_clarification,
        }),
        NodeKind::Greeting | NodeKind::Clarification | NodeKind::Summarization => {
            json!({ "final_answer": state.final_answer })
        }
        NodeKind::Visualization => json!({ "visualization_spec": state.visualization_spec }),
    }
}

// =============================================================================
// OrchestratorBuilder
// =============================================================================

#[derive(Default)]
pub struct OrchestratorBuilder {
    client: Option<Arc<dyn CompletionClient>>,
    store: Option<Arc<dyn RelationalStore>>,
    catalog: Option<SchemaCatalog>,
    semantics: Option<SemanticLoader>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    sessions: Option<Arc<SessionStore>>,
    request_timeout: Option<Duration>,
}

impl OrchestratorBuilder {
    pub fn completion_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn relational_store(mut self, store: Arc<dyn RelationalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn catalog(mut self, catalog: SchemaCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn semantics(mut self, loader: SemanticLoader) -> Self {
        self.semantics = Some(loader);
        self
    }

    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn session_store(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Default deadline for runs whose context carries none.
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Apply request timeout and session bound from config.
    pub fn workflow_config(mut self, config: &WorkflowConfig) -> Self {
        self.request_timeout =
            (config.request_timeout_secs > 0).then(|| Duration::from_secs(config.request_timeout_secs));
        if self.sessions.is_none() {
            self.sessions = Some(Arc::new(SessionStore::new(config.max_session_turns)));
        }
        self
    }

    pub fn build(self) -> Result<Orchestrator, SafelensError> {
        let client = self
            .client
            .ok_or_else(|| SafelensError::Config("completion client is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| SafelensError::Config("relational store is required".to_string()))?;
        let catalog = Arc::new(self.catalog.unwrap_or_else(SchemaCatalog::default_stub));
        let semantics = Arc::new(
            self.semantics
                .unwrap_or_else(|| SemanticLoader::from_map(Default::default())),
        );

        let nodes = Nodes {
            intent: IntentClassifier::new(Arc::clone(&client)),
            greeting: GreetingAgent::new(Arc::clone(&client)),
            resolver: TableResolver::new(Arc::clone(&client), catalog),
            semantic: SemanticLoad::new(semantics),
            synthesizer: QuerySynthesizer::new(Arc::clone(&client)),
            executor: QueryExecutor::new(store),
            clarifier: ClarificationAgent::new(Arc::clone(&client)),
            summarizer: ResultSummarizer::new(Arc::clone(&client)),
            visualizer: VisualizationSynthesizer::new(client),
        };

        Ok(Orchestrator {
            nodes,
            sessions: self.sessions.unwrap_or_default(),
            checkpoints: self.checkpoints,
            request_timeout: self.request_timeout,
        })
    }
}
