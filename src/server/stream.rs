use crate::history::HistoryError;
use crate::models::chat::ChatMessage;
use crate::models::message::{ Message, ToolCall };
use crate::models::stream::{ StreamEvent, ToolCallSummary };
use crate::server::api::{ AppState, ChatTurn };
use crate::tools::search::SEARCH_TOOL_NAME;
use futures::StreamExt;
use serde_json::{ json, Value };
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use log::{ debug, error };

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How the final reply is replayed to the client, one character per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Playback {
    pub char_delay: Duration,
}

impl Default for Playback {
    fn default() -> Self {
        Self::from_millis(10)
    }
}

impl Playback {
    pub fn from_millis(ms: u64) -> Self {
        Self { char_delay: Duration::from_millis(ms) }
    }

    pub fn instant() -> Self {
        Self { char_delay: Duration::ZERO }
    }

    /// Returns how many content frames were handed to the reader. Playback
    /// stops as soon as the reader is gone.
    async fn play(&self, text: &str, tx: &mpsc::Sender<StreamEvent>) -> usize {
        let mut sent = 0;
        for ch in text.chars() {
            if tx.send(StreamEvent::Content { content: ch.to_string() }).await.is_err() {
                debug!("Stream receiver dropped; skipping the rest of the playback");
                break;
            }
            sent += 1;
            if !self.char_delay.is_zero() {
                tokio::time::sleep(self.char_delay).await;
            }
        }
        sent
    }
}

/// Starts the turn in the background and returns its events.
///
/// The turn runs to completion even if the receiver is dropped, so history
/// is always written. Exactly one `done` or `error` event ends the stream.
pub fn spawn_chat_stream(state: AppState, turn: ChatTurn) -> ReceiverStream<StreamEvent> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        send(&tx, StreamEvent::Start {
            conversation_id: turn.conversation_id.clone(),
            model: turn.model.clone(),
        }).await;

        let terminal = match stream_turn(&state, &turn, &tx).await {
            Ok(event) => event,
            Err(e) => {
                error!("Streaming chat failed for '{}': {}", turn.conversation_id, e);
                StreamEvent::Error { error: format!("Error processing request: {}", e) }
            }
        };
        send(&tx, terminal).await;
    });

    ReceiverStream::new(rx)
}

async fn send(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) {
    if tx.send(event).await.is_err() {
        debug!("Stream receiver dropped; continuing without a client");
    }
}

async fn stream_turn(
    state: &AppState,
    turn: &ChatTurn,
    tx: &mpsc::Sender<StreamEvent>
) -> Result<StreamEvent, HistoryError> {
    let id = &turn.conversation_id;
    state.history.add_message(id, ChatMessage::human(turn.message.clone())).await?;

    let conversation = state.history.get_conversation(id).await?;
    let messages: Vec<Message> = conversation.messages.iter().map(Message::from).collect();

    let mut steps = state.agent.stream(messages, turn.context());
    let mut full_response = String::new();

    while let Some(step) = steps.next().await {
        match step {
            Ok(step) => {
                debug!("Agent step from {:?} with {} message(s)", step.node, step.messages.len());
                for message in &step.messages {
                    relay(state, turn, tx, message, &mut full_response).await;
                }
            }
            Err(e) => {
                let error = format!("Error invoking agent: {}", e);
                error!("Agent stream failed for '{}': {}", id, e);
                state.history.add_message(id, ChatMessage::assistant(error.clone())).await?;
                return Ok(StreamEvent::Error { error });
            }
        }
    }

    if !full_response.is_empty() {
        state.history.add_message(id, ChatMessage::assistant(full_response.clone())).await?;
    }
    Ok(StreamEvent::Done { full_response })
}

async fn relay(
    state: &AppState,
    turn: &ChatTurn,
    tx: &mpsc::Sender<StreamEvent>,
    message: &Message,
    full_response: &mut String
) {
    match message {
        Message::Assistant { content, tool_calls } if tool_calls.is_empty() => {
            if !content.is_empty() {
                state.settings.playback.play(content, tx).await;
                full_response.push_str(content);
            }
        }
        Message::Assistant { tool_calls, .. } => {
            let tools = tool_calls
                .iter()
                .map(|call| ToolCallSummary { name: call.name.clone(), args: call.args.clone() })
                .collect();
            send(tx, StreamEvent::ToolCall { tools }).await;

            if state.settings.inline_tools {
                for call in tool_calls.iter().filter(|c| c.name == SEARCH_TOOL_NAME) {
                    let preview = preview_search(state, turn, call).await;
                    send(tx, preview).await;
                }
            }
        }
        Message::Tool { content, .. } => {
            send(tx, StreamEvent::ToolResult { content: content.clone() }).await;
        }
        Message::System { .. } | Message::Human { .. } => {}
    }
}

async fn preview_search(state: &AppState, turn: &ChatTurn, call: &ToolCall) -> StreamEvent {
    let query = call.args
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(turn.message.as_str());

    let content = match state.tools.get(SEARCH_TOOL_NAME) {
        Some(tool) =>
            match tool.call(json!({ "query": query }), &turn.context()).await {
                Ok(output) => output,
                Err(e) => format!("Search failed: {}", e),
            }
        None => "Search failed: search tool is not registered".to_string(),
    };
    StreamEvent::ToolResult { content }
}
