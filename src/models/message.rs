use serde::{ Serialize, Deserialize };
use serde_json::Value;
use crate::models::chat::{ ChatMessage, Role };

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// Messages exchanged inside the agent loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        content: String,
        tool_call_id: String,
        name: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System { content: content.into() }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Message::Human { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant { content: content.into(), tool_calls: Vec::new() }
    }

    pub fn content(&self) -> &str {
        match self {
            | Message::System { content }
            | Message::Human { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    /// An assistant message that does not ask for another tool round.
    pub fn is_final_reply(&self) -> bool {
        matches!(self, Message::Assistant { tool_calls, .. } if tool_calls.is_empty())
    }
}

impl From<&ChatMessage> for Message {
    fn from(msg: &ChatMessage) -> Self {
        match msg.role {
            Role::Human => Message::human(msg.content.clone()),
            Role::Assistant => Message::assistant(msg.content.clone()),
        }
    }
}

/// Content of the last assistant message that needs no further tool call.
pub fn final_reply(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.is_final_reply())
        .map(Message::content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_request() -> Message {
        Message::Assistant {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: "search".into(),
                args: json!({ "query": "weather" }),
            }],
        }
    }

    #[test]
    fn final_reply_skips_tool_traffic() {
        let messages = vec![
            Message::human("what's the weather?"),
            Message::assistant("let me check"),
            tool_request(),
            Message::Tool {
                content: "sunny".into(),
                tool_call_id: "call_1".into(),
                name: "search".into(),
            }
        ];
        assert_eq!(final_reply(&messages), Some("let me check"));
    }

    #[test]
    fn final_reply_takes_the_latest_answer() {
        let messages = vec![
            Message::assistant("old answer"),
            Message::human("again"),
            tool_request(),
            Message::assistant("new answer")
        ];
        assert_eq!(final_reply(&messages), Some("new answer"));
    }

    #[test]
    fn no_assistant_message_means_no_reply() {
        assert_eq!(final_reply(&[Message::human("hi"), tool_request()]), None);
    }

    #[test]
    fn history_roles_map_onto_agent_messages() {
        assert_eq!(Message::from(&ChatMessage::human("a")), Message::human("a"));
        assert_eq!(Message::from(&ChatMessage::assistant("b")), Message::assistant("b"));
    }

    #[test]
    fn serializes_with_role_tag() {
        let value = serde_json::to_value(tool_request()).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["tool_calls"][0]["name"], "search");
        let value = serde_json::to_value(Message::assistant("x")).unwrap();
        assert!(value.get("tool_calls").is_none());
    }
}
