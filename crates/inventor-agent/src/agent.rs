//! The agent capability

use std::sync::Arc;

use async_trait::async_trait;
use inventor_llm::LlmMessage;
use inventor_tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;

#[derive(Clone, Debug, PartialEq)]
pub enum AgentEvent {
    Text(String),
    Thinking(String),
    ToolCallStart {
        id: String,
        name: String,
    },
    ToolResult {
        id: String,
        name: String,
        result: String,
        is_error: bool,
    },
    Done {
        stop_reason: String,
    },
    Error(String),
}

/// Conversation carried from one invocation to the next, so later steps
/// see what earlier steps discussed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Continuation {
    pub messages: Vec<LlmMessage>,
}

impl Continuation {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// One agent turn: take a prompt and a tool set, act through the tools,
/// return the conversation so far. Events are observational.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        tools: Arc<ToolRegistry>,
        continuation: Option<Continuation>,
        events: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Result<Continuation, AgentError>;
}
