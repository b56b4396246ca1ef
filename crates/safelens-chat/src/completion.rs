//! Completion service clients.
//!
//! Every workflow node that needs language understanding sends one
//! [`CompletionRequest`] and receives plain text back. The service is opaque:
//! nodes interpret the text themselves.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use safelens_core::config::CompletionConfig;
use safelens_core::Turn;

use crate::error::CompletionError;

/// Which workflow step a request serves. Used for logging and routing in tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompletionTask {
    IntentClassification,
    Greeting,
    TableResolution,
    QuerySynthesis,
    Clarification,
    Summarization,
    Visualization,
}

impl CompletionTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionTask::IntentClassification => "intent_classification",
            CompletionTask::Greeting => "greeting",
            CompletionTask::TableResolution => "table_resolution",
            CompletionTask::QuerySynthesis => "query_synthesis",
            CompletionTask::Clarification => "clarification",
            CompletionTask::Summarization => "summarization",
            CompletionTask::Visualization => "visualization",
        }
    }
}

/// One request to the completion service.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub task: CompletionTask,
    /// Instructions for the model.
    pub system: String,
    /// Prior conversation turns, already windowed by the caller.
    pub history: Vec<Turn>,
    /// The final user message.
    pub prompt: String,
    /// Ask the service for a JSON object response.
    pub json_mode: bool,
}

/// A blocking request/response completion call.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

// =============================================================================
// OpenAiCompatClient
// =============================================================================

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            temperature,
        })
    }

    fn body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(serde_json::json!({"role": "system", "content": request.system}));
        for turn in &request.history {
            messages.push(serde_json::json!({"role": turn.role.as_str(), "content": turn.content}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.prompt}));

        let mut body = serde_json::json!({
            "model": &self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        if request.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        debug!(task = request.task.as_str(), model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| CompletionError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status, body });
        }

        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Unavailable(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)
    }
}

// =============================================================================
// ClientPool
// =============================================================================

/// Round-robin pool over several completion clients (e.g. one per API key).
///
/// The rotation counter is an atomic owned by the pool, so concurrent requests
/// each take a distinct slot without a read-modify-write race.
pub struct ClientPool {
    clients: Vec<Arc<dyn CompletionClient>>,
    next: AtomicUsize,
}

impl ClientPool {
    pub fn new(clients: Vec<Arc<dyn CompletionClient>>) -> Self {
        Self {
            clients,
            next: AtomicUsize::new(0),
        }
    }

    /// Build one [`OpenAiCompatClient`] per configured API key.
    pub fn from_config(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let clients = config
            .api_keys
            .iter()
            .map(|key| {
                OpenAiCompatClient::new(
                    &config.base_url,
                    key.clone(),
                    &config.model,
                    config.temperature,
                    timeout,
                )
                .map(|c| Arc::new(c) as Arc<dyn CompletionClient>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(clients))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn pick(&self) -> Option<&Arc<dyn CompletionClient>> {
        if self.clients.is_empty() {
            return None;
        }
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        self.clients.get(slot)
    }
}

#[async_trait]
impl CompletionClient for ClientPool {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let client = self.pick().ok_or(CompletionError::NoClients)?;
        client.complete(request).await
    }
}
