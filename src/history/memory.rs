use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use crate::history::{ HistoryError, HistoryStore };
use crate::models::chat::{ ChatMessage, Conversation };

/// Process-local history. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    conversations: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn add_message(
        &self,
        conversation_id: &str,
        message: ChatMessage
    ) -> Result<(), HistoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.entry(conversation_id.to_string()).or_default().push(message);
        Ok(())
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation, HistoryError> {
        let conversations = self.conversations.read().await;
        Ok(Conversation {
            id: conversation_id.to_string(),
            messages: conversations.get(conversation_id).cloned().unwrap_or_default(),
        })
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool, HistoryError> {
        let mut conversations = self.conversations.write().await;
        Ok(conversations.remove(conversation_id).is_some())
    }
}
