//! LLM-backed agent: the streaming tool loop

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use inventor_llm::{
    AccumulatedToolCall, AnthropicProvider, ContentBlock, LlmMessage, LlmProvider, LlmRequest,
    StreamDelta, DEFAULT_MODEL,
};
use inventor_tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent::{Agent, AgentEvent, Continuation};
use crate::error::AgentError;

const MAX_TOOL_RESULT_CHARS: usize = 50_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    pub max_tokens: u32,
    pub max_tool_iterations: usize,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 8192,
            max_tool_iterations: 50,
            system_prompt: None,
        }
    }
}

pub struct LlmAgent {
    provider: Arc<dyn LlmProvider>,
    config: AgentConfig,
}

impl LlmAgent {
    pub fn new(api_key: &str, config: AgentConfig) -> Self {
        Self {
            provider: Arc::new(AnthropicProvider::new(api_key)),
            config,
        }
    }

    pub fn with_provider(provider: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

fn truncate(result: String) -> String {
    if result.len() <= MAX_TOOL_RESULT_CHARS {
        return result;
    }
    let mut end = MAX_TOOL_RESULT_CHARS;
    while !result.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}...\n[truncated, {} total chars]",
        &result[..end],
        result.len()
    )
}

#[async_trait]
impl Agent for LlmAgent {
    async fn invoke(
        &self,
        prompt: &str,
        tools: Arc<ToolRegistry>,
        continuation: Option<Continuation>,
        events: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Result<Continuation, AgentError> {
        let mut messages = continuation.map(|c| c.messages).unwrap_or_default();
        messages.push(LlmMessage::user(prompt));
        let definitions = tools.get_definitions();

        let mut iterations = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            iterations += 1;
            if iterations > self.config.max_tool_iterations {
                let _ = events
                    .send(AgentEvent::Error("Max tool iterations exceeded".to_string()))
                    .await;
                return Err(AgentError::MaxIterations(self.config.max_tool_iterations));
            }

            let request = LlmRequest {
                model: self.config.model.clone(),
                messages: messages.clone(),
                tools: Some(definitions.clone()),
                max_tokens: Some(self.config.max_tokens),
                system: self.config.system_prompt.clone(),
                ..Default::default()
            };

            let stream = self
                .provider
                .complete_stream(request, Some(cancel.clone()))
                .await?;
            tokio::pin!(stream);

            let mut text_content = String::new();
            let mut tool_calls: Vec<AccumulatedToolCall> = Vec::new();
            let mut current_tool: Option<AccumulatedToolCall> = None;
            let mut stop_reason = "end_turn".to_string();

            while let Some(delta) = stream.next().await {
                match delta? {
                    StreamDelta::Text(text) => {
                        text_content.push_str(&text);
                        let _ = events.send(AgentEvent::Text(text)).await;
                    }
                    StreamDelta::Thinking(thinking) => {
                        let _ = events.send(AgentEvent::Thinking(thinking)).await;
                    }
                    StreamDelta::ToolCallStart { id, name } => {
                        current_tool = Some(AccumulatedToolCall {
                            id: id.clone(),
                            name: name.clone(),
                            arguments: String::new(),
                        });
                        let _ = events.send(AgentEvent::ToolCallStart { id, name }).await;
                    }
                    StreamDelta::ToolCallDelta { arguments, .. } => {
                        if let Some(tool) = current_tool.as_mut() {
                            tool.arguments.push_str(&arguments);
                        }
                    }
                    StreamDelta::ToolCallEnd { .. } => {
                        if let Some(tool) = current_tool.take() {
                            tool_calls.push(tool);
                        }
                    }
                    StreamDelta::Done {
                        stop_reason: sr, ..
                    } => {
                        if let Some(r) = sr {
                            stop_reason = r;
                        }
                    }
                    StreamDelta::Error(e) => {
                        let _ = events.send(AgentEvent::Error(e)).await;
                    }
                }
            }

            if tool_calls.is_empty() {
                messages.push(LlmMessage::assistant(text_content));
                let _ = events.send(AgentEvent::Done { stop_reason }).await;
                break;
            }

            let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
            if !text_content.is_empty() {
                blocks.push(ContentBlock::Text { text: text_content });
            }
            blocks.extend(tool_calls.iter().map(|tc| ContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.name.clone(),
                input: tc.parse_arguments().unwrap_or_default(),
            }));
            messages.push(LlmMessage::assistant(blocks));

            let mut results = Vec::with_capacity(tool_calls.len());
            for tc in tool_calls {
                let result = match tc.parse_arguments() {
                    Ok(args) => {
                        tools
                            .execute_cancellable(&tc.name, args, cancel.clone())
                            .await
                    }
                    Err(e) => inventor_tools::ToolResult::error(format!(
                        "Invalid tool arguments: {}",
                        e
                    )),
                };
                let is_error = result.is_error();
                let result_str = truncate(result.to_content_string());
                let _ = events
                    .send(AgentEvent::ToolResult {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        result: result_str.clone(),
                        is_error,
                    })
                    .await;
                results.push(ContentBlock::ToolResult {
                    tool_use_id: tc.id,
                    content: result_str,
                    is_error: is_error.then_some(true),
                });
            }
            messages.push(LlmMessage::user(results));

            debug!(iteration = iterations, "tool calls executed, continuing loop");
        }

        info!(messages = messages.len(), iterations, "turn complete");
        Ok(Continuation { messages })
    }
}
