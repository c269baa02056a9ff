use crate::agent::{ AgentContext, AgentInvoker };
use crate::cli::Args;
use crate::history::HistoryStore;
use crate::models::chat::{
    ChatMessage,
    ChatRequest,
    ChatResponse,
    ErrorResponse,
    HistoryResponse,
    MessageResponse,
    DEFAULT_CONVERSATION_ID,
};
use crate::models::message::{ final_reply, Message };
use crate::server::stream::{ spawn_chat_stream, Playback };
use crate::tools::ToolRegistry;
use std::convert::Infallible;
use std::error::Error;
use std::num::NonZeroU32;
use std::sync::Arc;
use axum::{
    body::Body,
    extract::{ Path, Request, State },
    http::{ header, StatusCode },
    middleware::{ self, Next },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use chrono::Utc;
use futures::StreamExt;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use serde::Serialize;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn, error };

pub const FALLBACK_REPLY: &str = "Sorry, I was unable to process your request.";
pub const SERVICE_MODE: &str = "direct_agent_invoke";

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Request-independent defaults and policies for the chat endpoints.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub default_model: String,
    pub available_models: Vec<String>,
    pub default_max_search_results: usize,
    pub playback: Playback,
    /// Run `search` calls as soon as they are requested while streaming.
    pub inline_tools: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            default_model: "openai/gpt-4o-mini".to_string(),
            available_models: vec!["openai/gpt-4o-mini".to_string()],
            default_max_search_results: 10,
            playback: Playback::default(),
            inline_tools: true,
        }
    }
}

impl ChatSettings {
    pub fn from_args(args: &Args) -> Self {
        Self {
            default_model: args.default_model.clone(),
            available_models: args.available_models.clone(),
            default_max_search_results: args.default_max_search_results,
            playback: Playback::from_millis(args.stream_char_delay_ms),
            inline_tools: args.stream_inline_tools,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<dyn AgentInvoker>,
    pub history: Arc<dyn HistoryStore>,
    pub tools: ToolRegistry,
    pub settings: Arc<ChatSettings>,
    limiter: Option<Arc<Limiter>>,
}

impl AppState {
    pub fn new(
        agent: Arc<dyn AgentInvoker>,
        history: Arc<dyn HistoryStore>,
        settings: ChatSettings
    ) -> Self {
        Self {
            agent,
            history,
            tools: ToolRegistry::new(),
            settings: Arc::new(settings),
            limiter: None,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Caps chat requests per second across all clients; 0 removes the cap.
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.limiter = NonZeroU32::new(per_second).map(|n|
            Arc::new(RateLimiter::direct(Quota::per_second(n)))
        );
        self
    }
}

/// A chat request with every default applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub message: String,
    pub conversation_id: String,
    pub model: String,
    pub max_search_results: usize,
}

impl ChatTurn {
    pub fn resolve(req: ChatRequest, settings: &ChatSettings) -> Self {
        Self {
            message: req.message,
            conversation_id: req.conversation_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CONVERSATION_ID.to_string()),
            model: req.model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| settings.default_model.clone()),
            max_search_results: req.max_search_results.unwrap_or(
                settings.default_max_search_results
            ),
        }
    }

    pub fn context(&self) -> AgentContext {
        AgentContext {
            model: self.model.clone(),
            max_search_results: self.max_search_results,
        }
    }
}

#[derive(Serialize)]
struct ServiceInfo {
    message: String,
    endpoints: Vec<&'static str>,
    mode: &'static str,
    streaming: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    mode: &'static str,
    graph_available: bool,
    version: &'static str,
    timestamp: String,
}

#[derive(Serialize)]
struct ModelsResponse {
    models: Vec<String>,
    default: String,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let chat_routes = Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
        .route("/api/models", get(models_handler))
        .route(
            "/api/chat/history/{conversation_id}",
            get(get_history_handler).delete(clear_history_handler)
        )
        .merge(chat_routes)
        .layer(cors)
        .with_state(state)
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    let detail = format!("Error processing request: {}", e);
    error!("{}", detail);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { detail })).into_response()
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            warn!("Rate limit exceeded for {}", request.uri().path());
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorResponse { detail: "Too many requests".into() }),
            ).into_response();
        }
    }
    next.run(request).await
}

async fn root_handler() -> impl IntoResponse {
    Json(ServiceInfo {
        message: "ReAct agent API is running (direct invoke mode)".to_string(),
        endpoints: vec![
            "/api/chat",
            "/api/chat/stream",
            "/api/chat/history/{conversation_id}",
            "/api/models",
            "/api/health"
        ],
        mode: SERVICE_MODE,
        streaming: "supported",
    })
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        mode: SERVICE_MODE,
        graph_available: state.agent.is_available(),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn models_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(ModelsResponse {
        models: state.settings.available_models.clone(),
        default: state.settings.default_model.clone(),
    })
}

async fn chat_handler(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    let turn = ChatTurn::resolve(req, &state.settings);
    info!("Chat request for conversation '{}' using {}", turn.conversation_id, turn.model);

    match process_chat(&state, &turn).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn process_chat(
    state: &AppState,
    turn: &ChatTurn
) -> Result<ChatResponse, Box<dyn Error + Send + Sync>> {
    let id = &turn.conversation_id;
    state.history.add_message(id, ChatMessage::human(turn.message.clone())).await?;

    let conversation = state.history.get_conversation(id).await?;
    let messages: Vec<Message> = conversation.messages.iter().map(Message::from).collect();

    let reply = match state.agent.invoke(messages, turn.context()).await {
        Ok(result) =>
            final_reply(&result)
                .filter(|content| !content.is_empty())
                .unwrap_or(FALLBACK_REPLY)
                .to_string(),
        Err(e) => {
            error!("Agent invocation failed for '{}': {}", id, e);
            format!("Error invoking agent: {}", e)
        }
    };

    state.history.add_message(id, ChatMessage::assistant(reply.clone())).await?;

    Ok(ChatResponse {
        response: reply,
        conversation_id: id.clone(),
        status: "success".to_string(),
        model_used: turn.model.clone(),
    })
}

async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>
) -> Response {
    let turn = ChatTurn::resolve(req, &state.settings);
    info!("Streaming chat request for conversation '{}' using {}", turn.conversation_id, turn.model);

    let frames = spawn_chat_stream(state, turn).map(|event| Ok::<_, Infallible>(event.to_frame()));

    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    ).into_response()
}

async fn get_history_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>
) -> Response {
    match state.history.get_conversation(&conversation_id).await {
        Ok(conversation) =>
            Json(HistoryResponse {
                messages: conversation.messages,
                conversation_id,
            }).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn clear_history_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>
) -> Response {
    match state.history.delete_conversation(&conversation_id).await {
        Ok(true) => {
            info!("Cleared history for conversation '{}'", conversation_id);
            Json(MessageResponse {
                message: format!("History for conversation {} cleared", conversation_id),
            }).into_response()
        }
        Ok(false) =>
            Json(MessageResponse {
                message: format!("Conversation {} does not exist", conversation_id),
            }).into_response(),
        Err(e) => internal_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(conversation_id: Option<&str>, model: Option<&str>) -> ChatRequest {
        ChatRequest {
            message: "hello".into(),
            conversation_id: conversation_id.map(str::to_string),
            model: model.map(str::to_string),
            max_search_results: None,
        }
    }

    #[test]
    fn turn_fills_defaults() {
        let settings = ChatSettings { default_max_search_results: 7, ..ChatSettings::default() };
        let turn = ChatTurn::resolve(request(None, None), &settings);
        assert_eq!(turn.conversation_id, DEFAULT_CONVERSATION_ID);
        assert_eq!(turn.model, "openai/gpt-4o-mini");
        assert_eq!(turn.max_search_results, 7);
    }

    #[test]
    fn turn_keeps_client_values() {
        let mut req = request(Some("t1"), Some("ollama/llama3.1"));
        req.max_search_results = Some(2);
        let turn = ChatTurn::resolve(req, &ChatSettings::default());
        assert_eq!(turn.conversation_id, "t1");
        assert_eq!(turn.context(), AgentContext {
            model: "ollama/llama3.1".into(),
            max_search_results: 2,
        });
    }

    #[test]
    fn inline_search_preview_is_on_by_default() {
        assert!(ChatSettings::default().inline_tools);
    }

    #[test]
    fn blank_conversation_id_falls_back_to_default() {
        let turn = ChatTurn::resolve(request(Some("  "), None), &ChatSettings::default());
        assert_eq!(turn.conversation_id, DEFAULT_CONVERSATION_ID);
    }
}
