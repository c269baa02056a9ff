use async_trait::async_trait;
use crate::models::chat::{ ChatMessage, Conversation, Role };
use crate::history::{ HistoryError, HistoryStore };
use chrono::Utc;
use log::error;
use redis::{ Client, AsyncCommands };
use serde::{ Serialize, Deserialize };

#[derive(Serialize, Deserialize)]
struct StoredMessage {
    role: Role,
    content: String,
    timestamp: i64,
}

/// Keeps each conversation as a Redis list under `<prefix><conversation_id>`,
/// oldest message at the head.
pub struct RedisHistoryStore {
    client: Client,
    key_prefix: String,
}

impl RedisHistoryStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, HistoryError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn key(&self, conversation_id: &str) -> String {
        format!("{}{}", self.key_prefix, conversation_id)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn add_message(
        &self,
        conversation_id: &str,
        message: ChatMessage
    ) -> Result<(), HistoryError> {
        let mut conn = self.get_connection().await?;
        let stored = StoredMessage {
            role: message.role,
            content: message.content,
            timestamp: Utc::now().timestamp(),
        };

        let json_msg = serde_json::to_string(&stored)?;
        let _: i64 = conn.rpush(self.key(conversation_id), &json_msg).await?;
        Ok(())
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation, HistoryError> {
        let mut conn = self.get_connection().await?;
        let json_entries: Vec<String> = conn.lrange(self.key(conversation_id), 0, -1).await?;
        let mut messages = Vec::with_capacity(json_entries.len());

        for json_entry in &json_entries {
            match serde_json::from_str::<StoredMessage>(json_entry) {
                Ok(msg) => {
                    messages.push(ChatMessage {
                        role: msg.role,
                        content: msg.content,
                    });
                }
                Err(e) => {
                    error!("Error parsing history entry: {}", e);
                }
            }
        }

        Ok(Conversation {
            id: conversation_id.to_string(),
            messages,
        })
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool, HistoryError> {
        let mut conn = self.get_connection().await?;
        let removed: i64 = conn.del(self.key(conversation_id)).await?;
        Ok(removed > 0)
    }
}
