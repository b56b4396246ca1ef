use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of event emitted while a request streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    /// A workflow node finished; `data` carries the fields it produced.
    NodeUpdate,
    /// The request finished; `data` carries `final_answer` and `visualization_spec`.
    FinalAnswer,
}

/// One event of a streamed request.
///
/// Node updates arrive strictly in execution order and are followed by
/// exactly one final-answer event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: StreamEventType,
    pub data: Value,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

impl StreamEvent {
    pub fn node_update(thread_id: Option<&str>, node: &str, data: Value) -> Self {
        Self {
            event_type: StreamEventType::NodeUpdate,
            data,
            timestamp: now_rfc3339(),
            thread_id: thread_id.map(str::to_string),
            node: Some(node.to_string()),
        }
    }

    pub fn final_answer(thread_id: Option<&str>, final_answer: &str, visualization: Value) -> Self {
        Self {
            event_type: StreamEventType::FinalAnswer,
            data: serde_json::json!({
                "final_answer": final_answer,
                "visualization_spec": visualization,
            }),
            timestamp: now_rfc3339(),
            thread_id: thread_id.map(str::to_string),
            node: None,
        }
    }

    pub fn is_final(&self) -> bool {
        self.event_type == StreamEventType::FinalAnswer
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
