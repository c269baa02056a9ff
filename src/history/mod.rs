mod memory;
mod redis;

pub use memory::InMemoryHistoryStore;
pub use self::redis::RedisHistoryStore;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;
use crate::cli::Args;
use crate::models::chat::{ ChatMessage, Conversation };

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("history serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Conversation history keyed by conversation id.
///
/// Each call is atomic on its own; callers that append, invoke and append
/// again get no isolation from concurrent requests on the same id.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn add_message(
        &self,
        conversation_id: &str,
        message: ChatMessage
    ) -> Result<(), HistoryError>;

    /// Returns the whole conversation; an unknown id yields an empty one.
    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation, HistoryError>;

    /// Removes the conversation. Returns whether it existed.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool, HistoryError>;
}

pub fn create_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(InMemoryHistoryStore::new())),
        "redis" => {
            let store = RedisHistoryStore::new(&args.history_host, &args.history_redis_prefix)?;
            Ok(Arc::new(store))
        }
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub fn initialize_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    if args.history_type.eq_ignore_ascii_case("memory") {
        info!("Chat history will be kept in memory for the process lifetime");
    } else {
        info!("Chat history will be stored in: {} at {}", args.history_type, args.history_host);
    }
    create_history_store(args)
}
