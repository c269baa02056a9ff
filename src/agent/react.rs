use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use log::{ debug, info, warn };
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ render_system_prompt, AgentContext, AgentError, AgentInvoker, AgentNode, AgentStep, AgentStream };
use crate::llm::ModelProvider;
use crate::llm::chat::{ ChatModel, ToolSpec };
use crate::models::message::{ Message, ToolCall };
use crate::tools::ToolRegistry;

pub const STEP_BUDGET_EXHAUSTED: &str =
    "Sorry, I could not find an answer to your question within the allowed number of steps.";

const STEP_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct ReactAgentConfig {
    pub system_prompt: String,
    /// Model calls allowed per run. The last one may not request tools.
    pub max_steps: usize,
}

impl Default for ReactAgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful AI assistant.\n\nSystem time: {system_time}".to_string(),
            max_steps: 12,
        }
    }
}

/// Reason-and-act loop: call the model, run the tools it asks for, feed the
/// results back, and stop at the first reply without tool calls.
#[derive(Clone)]
pub struct ReactAgent {
    models: Arc<dyn ModelProvider>,
    tools: ToolRegistry,
    config: ReactAgentConfig,
}

type StepSender = mpsc::Sender<Result<AgentStep, AgentError>>;

impl ReactAgent {
    pub fn new(models: Arc<dyn ModelProvider>, tools: ToolRegistry, config: ReactAgentConfig) -> Self {
        let config = ReactAgentConfig { max_steps: config.max_steps.max(1), ..config };
        Self { models, tools, config }
    }

    async fn run(
        &self,
        mut messages: Vec<Message>,
        context: &AgentContext,
        steps: Option<&StepSender>
    ) -> Result<Vec<Message>, AgentError> {
        let model = self.models.resolve(&context.model)?;
        let specs = self.tools.specs();
        let mut model_calls = 0;

        loop {
            model_calls += 1;
            let is_last_step = model_calls >= self.config.max_steps;
            let reply = self.call_model(model.as_ref(), &messages, &specs, is_last_step).await?;
            let tool_calls = reply.tool_calls().to_vec();
            messages.push(reply.clone());
            Self::emit(steps, AgentNode::Model, vec![reply]).await;

            if tool_calls.is_empty() {
                info!("Agent finished after {} model call(s)", model_calls);
                return Ok(messages);
            }

            let results = self.call_tools(&tool_calls, context).await;
            messages.extend(results.iter().cloned());
            Self::emit(steps, AgentNode::Tools, results).await;
        }
    }

    async fn call_model(
        &self,
        model: &dyn ChatModel,
        messages: &[Message],
        specs: &[ToolSpec],
        is_last_step: bool
    ) -> Result<Message, AgentError> {
        let mut prompt = Vec::with_capacity(messages.len() + 1);
        prompt.push(Message::system(render_system_prompt(&self.config.system_prompt, Utc::now())));
        prompt.extend(messages.iter().cloned());

        debug!("Calling model {} with {} messages", model.model_name(), prompt.len());
        let reply = model.invoke(&prompt, specs).await?;

        if is_last_step && reply.has_tool_calls() {
            warn!("Step budget of {} model calls exhausted", self.config.max_steps);
            return Ok(Message::assistant(STEP_BUDGET_EXHAUSTED));
        }
        Ok(reply)
    }

    /// Runs all calls concurrently; results keep the order of the calls.
    async fn call_tools(&self, calls: &[ToolCall], context: &AgentContext) -> Vec<Message> {
        let runs = calls.iter().map(|call| async move {
            let content = match self.tools.get(&call.name) {
                Some(tool) => {
                    info!("Running tool '{}' ({})", call.name, call.id);
                    match tool.call(call.args.clone(), context).await {
                        Ok(output) => output,
                        Err(e) => {
                            warn!("Tool '{}' failed: {}", call.name, e);
                            format!("Error: {}", e)
                        }
                    }
                }
                None => {
                    warn!("Model requested unknown tool '{}'", call.name);
                    format!("Error: {} is not a valid tool", call.name)
                }
            };
            Message::Tool {
                content,
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
            }
        });
        join_all(runs).await
    }

    async fn emit(steps: Option<&StepSender>, node: AgentNode, messages: Vec<Message>) {
        if let Some(tx) = steps {
            // A closed receiver only means nobody is watching; the run still completes.
            let _ = tx.send(Ok(AgentStep { node, messages })).await;
        }
    }
}

#[async_trait]
impl AgentInvoker for ReactAgent {
    async fn invoke(
        &self,
        messages: Vec<Message>,
        context: AgentContext
    ) -> Result<Vec<Message>, AgentError> {
        self.run(messages, &context, None).await
    }

    fn stream(&self, messages: Vec<Message>, context: AgentContext) -> AgentStream {
        let (tx, rx) = mpsc::channel(STEP_CHANNEL_CAPACITY);
        let agent = self.clone();
        let run_tx = tx.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = agent.run(messages, &context, Some(&run_tx)).await {
                let _ = run_tx.send(Err(e)).await;
            }
        });
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                let _ = tx.send(Err(AgentError::Interrupted(e.to_string()))).await;
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    fn is_available(&self) -> bool {
        self.models.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::tools::{ Tool, ToolError };
    use futures::StreamExt;
    use serde_json::{ json, Value };
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records what it was sent.
    struct ScriptedModel {
        replies: Mutex<VecDeque<Message>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Message>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into()), seen: Mutex::new(Vec::new()) })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn invoke(&self, messages: &[Message], _tools: &[ToolSpec]) -> Result<Message, LlmError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Decode("script exhausted".into()))
        }

        fn model_name(&self) -> String {
            "scripted".into()
        }
    }

    struct Fixed(Arc<ScriptedModel>);

    impl ModelProvider for Fixed {
        fn resolve(&self, _model: &str) -> Result<Arc<dyn ChatModel>, LlmError> {
            let model: Arc<dyn ChatModel> = self.0.clone();
            Ok(model)
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echoes its text argument"
        }

        fn parameters(&self) -> Value {
            json!({ "type": "object", "properties": { "text": { "type": "string" } } })
        }

        async fn call(&self, args: Value, context: &AgentContext) -> Result<String, ToolError> {
            Ok(format!("{} (limit {})", args["text"].as_str().unwrap_or(""), context.max_search_results))
        }
    }

    fn tool_request(id: &str, name: &str, args: Value) -> Message {
        Message::Assistant {
            content: String::new(),
            tool_calls: vec![ToolCall { id: id.into(), name: name.into(), args }],
        }
    }

    fn agent(model: Arc<ScriptedModel>, max_steps: usize) -> ReactAgent {
        ReactAgent::new(
            Arc::new(Fixed(model)),
            ToolRegistry::new().with(Arc::new(Echo)),
            ReactAgentConfig { system_prompt: "time: {system_time}".into(), max_steps }
        )
    }

    fn context() -> AgentContext {
        AgentContext { model: "test/scripted".into(), max_search_results: 4 }
    }

    #[tokio::test]
    async fn stops_on_first_plain_reply() {
        let model = ScriptedModel::new(vec![Message::assistant("hello!")]);
        let result = agent(model.clone(), 5)
            .invoke(vec![Message::human("hi")], context()).await
            .unwrap();

        assert_eq!(result, vec![Message::human("hi"), Message::assistant("hello!")]);
        assert_eq!(model.calls(), 1);
        let sent = &model.seen.lock().unwrap()[0];
        assert!(matches!(&sent[0], Message::System { content } if content.starts_with("time: ")));
        assert_eq!(sent[1], Message::human("hi"));
    }

    #[tokio::test]
    async fn feeds_tool_results_back_to_the_model() {
        let model = ScriptedModel::new(vec![
            tool_request("c1", "echo", json!({ "text": "ping" })),
            Message::assistant("got pong")
        ]);
        let result = agent(model.clone(), 5)
            .invoke(vec![Message::human("go")], context()).await
            .unwrap();

        assert_eq!(result.len(), 4);
        assert_eq!(result[2], Message::Tool {
            content: "ping (limit 4)".into(),
            tool_call_id: "c1".into(),
            name: "echo".into(),
        });
        assert_eq!(result[3], Message::assistant("got pong"));
        // Second model call saw the tool output.
        assert_eq!(model.seen.lock().unwrap()[1].last(), Some(&result[2]));
    }

    #[tokio::test]
    async fn unknown_tools_report_an_error_message() {
        let model = ScriptedModel::new(vec![
            tool_request("c9", "teleport", json!({})),
            Message::assistant("sorry")
        ]);
        let result = agent(model, 5).invoke(vec![Message::human("go")], context()).await.unwrap();
        assert_eq!(result[2].content(), "Error: teleport is not a valid tool");
    }

    #[tokio::test]
    async fn step_budget_replaces_a_final_tool_request() {
        let model = ScriptedModel::new(vec![
            tool_request("c1", "echo", json!({ "text": "a" })),
            tool_request("c2", "echo", json!({ "text": "b" }))
        ]);
        let result = agent(model.clone(), 2)
            .invoke(vec![Message::human("loop")], context()).await
            .unwrap();

        assert_eq!(model.calls(), 2);
        assert_eq!(result.last(), Some(&Message::assistant(STEP_BUDGET_EXHAUSTED)));
        // Only the first request's tool ran.
        let tool_runs = result
            .iter()
            .filter(|m| matches!(m, Message::Tool { .. }))
            .count();
        assert_eq!(tool_runs, 1);
    }

    #[tokio::test]
    async fn budget_of_one_runs_no_tools() {
        let model = ScriptedModel::new(vec![tool_request("c1", "echo", json!({ "text": "a" }))]);
        let result = agent(model, 1).invoke(vec![Message::human("x")], context()).await.unwrap();
        assert_eq!(result, vec![Message::human("x"), Message::assistant(STEP_BUDGET_EXHAUSTED)]);
    }

    #[tokio::test]
    async fn stream_yields_each_node_in_order() {
        let model = ScriptedModel::new(vec![
            tool_request("c1", "echo", json!({ "text": "hey" })),
            Message::assistant("final")
        ]);
        let steps: Vec<AgentStep> = agent(model, 5)
            .stream(vec![Message::human("go")], context())
            .map(|step| step.unwrap())
            .collect().await;

        let nodes: Vec<AgentNode> = steps.iter().map(|s| s.node).collect();
        assert_eq!(nodes, vec![AgentNode::Model, AgentNode::Tools, AgentNode::Model]);
        assert_eq!(steps[1].messages[0].content(), "hey (limit 4)");
        assert_eq!(steps[2].messages, vec![Message::assistant("final")]);
    }

    #[tokio::test]
    async fn stream_ends_with_the_model_error() {
        let model = ScriptedModel::new(vec![]);
        let items: Vec<Result<AgentStep, AgentError>> = agent(model, 5)
            .stream(vec![Message::human("go")], context())
            .collect().await;

        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Err(AgentError::Model(LlmError::Decode(_)))));
    }
}
