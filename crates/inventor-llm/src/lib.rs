//! Inventor LLM - provider adapters with streaming support

pub mod anthropic;
pub mod provider;
pub mod types;

pub use anthropic::{parse_sse_stream, AnthropicProvider};
pub use provider::{LlmError, LlmProvider, LlmResult, LlmStream};
pub use tokio_util::sync::CancellationToken;
pub use types::*;
