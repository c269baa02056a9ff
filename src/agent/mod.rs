//! The agent behind the chat endpoints.
//!
//! Handlers only see [`AgentInvoker`]; [`ReactAgent`] is the production
//! implementation that alternates model calls and tool calls.

mod prompt;
mod react;

pub use prompt::render_system_prompt;
pub use react::{ ReactAgent, ReactAgentConfig, STEP_BUDGET_EXHAUSTED };
pub use crate::tools::AgentContext;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use thiserror::Error;
use crate::llm::LlmError;
use crate::models::message::Message;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error("agent stopped before finishing: {0}")]
    Interrupted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentNode {
    Model,
    Tools,
}

/// New messages produced by one node run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStep {
    pub node: AgentNode,
    pub messages: Vec<Message>,
}

pub type AgentStream = Pin<Box<dyn Stream<Item = Result<AgentStep, AgentError>> + Send>>;

#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Runs to completion and returns the input followed by every produced message.
    async fn invoke(
        &self,
        messages: Vec<Message>,
        context: AgentContext
    ) -> Result<Vec<Message>, AgentError>;

    /// Runs in the background and yields each step as it completes. An `Err`
    /// item is always the last one.
    fn stream(&self, messages: Vec<Message>, context: AgentContext) -> AgentStream;

    fn is_available(&self) -> bool {
        true
    }
}
