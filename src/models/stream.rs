use serde::{ Serialize, Deserialize };
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallSummary {
    pub name: String,
    pub args: Value,
}

/// Frames sent by the streaming chat endpoint, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "start")] Start {
        conversation_id: String,
        model: String,
    },
    #[serde(rename = "content")] Content {
        content: String,
    },
    #[serde(rename = "tool_call")] ToolCall {
        tools: Vec<ToolCallSummary>,
    },
    #[serde(rename = "tool_result")] ToolResult {
        content: String,
    },
    #[serde(rename = "done")] Done {
        full_response: String,
    },
    #[serde(rename = "error")] Error {
        error: String,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }

    /// Encodes the event as one `data: <json>\n\n` frame.
    pub fn to_frame(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => format!("data: {}\n\n", json),
            Err(e) =>
                format!(
                    "data: {}\n\n",
                    serde_json::json!({ "type": "error", "error": e.to_string() })
                ),
        }
    }
}
