//! Anthropic Messages API provider with SSE streaming

use std::fmt::Display;

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmContent, LlmRequest, StreamDelta, Usage};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete_stream(
        &self,
        request: LlmRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream> {
        let mut messages = Vec::with_capacity(request.messages.len());
        for m in &request.messages {
            let content = match &m.content {
                LlmContent::Text(s) => serde_json::Value::String(s.clone()),
                LlmContent::Blocks(blocks) => serde_json::to_value(blocks)
                    .map_err(|e| LlmError::InvalidResponse(e.to_string()))?,
            };
            messages.push(AnthropicMessage {
                role: m.role.clone(),
                content,
            });
        }

        let body = AnthropicRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(8192),
            stream: true,
            system: request.system.clone(),
            temperature: request.temperature,
            tools: request.tools.as_ref().map(|tools| {
                tools
                    .iter()
                    .map(|t| AnthropicTool {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        input_schema: t.input_schema.clone(),
                    })
                    .collect()
            }),
        };

        debug!(model = %body.model, messages = body.messages.len(), "anthropic request");

        let send = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send();

        let response = match &cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(LlmError::Cancelled),
                r = send => r?,
            },
            None => send.await?,
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(60_000);
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_text, "anthropic error");

            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthFailed(error_text),
                429 => LlmError::RateLimited { retry_after_ms },
                503 | 529 => LlmError::Overloaded(error_text),
                _ => LlmError::RequestFailed(format!("{}: {}", status, error_text)),
            });
        }

        Ok(Box::pin(parse_sse_stream(response.bytes_stream(), cancel)))
    }
}

/// Turn a raw SSE byte stream into deltas. Exposed for tests.
pub fn parse_sse_stream<S, B, E>(
    bytes: S,
    cancel: Option<CancellationToken>,
) -> impl Stream<Item = LlmResult<StreamDelta>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let cancel = cancel.unwrap_or_default();
        let events = bytes.eventsource();
        tokio::pin!(events);

        let mut current_tool_id: Option<String> = None;
        let mut stop_reason: Option<String> = None;
        let mut usage: Option<Usage> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = events.next() => Some(next),
            };
            let event = match next {
                None => {
                    yield Err(LlmError::Cancelled);
                    break;
                }
                Some(Some(Ok(event))) => event,
                Some(Some(Err(e))) => {
                    yield Err(LlmError::StreamError(e.to_string()));
                    break;
                }
                Some(None) => break,
            };
            if event.data.is_empty() {
                continue;
            }

            match event.event.as_str() {
                "message_start" => {
                    if let Ok(data) = serde_json::from_str::<MessageStart>(&event.data) {
                        usage = data.message.usage;
                    }
                }
                "content_block_start" => {
                    match serde_json::from_str::<ContentBlockStart>(&event.data) {
                        Ok(ContentBlockStart { content_block: BlockStart::ToolUse { id, name } }) => {
                            current_tool_id = Some(id.clone());
                            yield Ok(StreamDelta::ToolCallStart { id, name });
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "unparsed content_block_start"),
                    }
                }
                "content_block_delta" => {
                    match serde_json::from_str::<ContentBlockDelta>(&event.data) {
                        Ok(ContentBlockDelta { delta: BlockDelta::Text { text } }) => {
                            yield Ok(StreamDelta::Text(text));
                        }
                        Ok(ContentBlockDelta { delta: BlockDelta::Thinking { thinking } }) => {
                            yield Ok(StreamDelta::Thinking(thinking));
                        }
                        Ok(ContentBlockDelta { delta: BlockDelta::InputJson { partial_json } }) => {
                            if let Some(id) = &current_tool_id {
                                yield Ok(StreamDelta::ToolCallDelta {
                                    id: id.clone(),
                                    arguments: partial_json,
                                });
                            }
                        }
                        Ok(ContentBlockDelta { delta: BlockDelta::Other }) => {}
                        Err(e) => warn!(error = %e, "unparsed content_block_delta"),
                    }
                }
                "content_block_stop" => {
                    if let Some(id) = current_tool_id.take() {
                        yield Ok(StreamDelta::ToolCallEnd { id });
                    }
                }
                "message_delta" => {
                    if let Ok(data) = serde_json::from_str::<MessageDelta>(&event.data) {
                        if data.delta.stop_reason.is_some() {
                            stop_reason = data.delta.stop_reason;
                        }
                        if let Some(u) = data.usage {
                            let input_tokens = usage.as_ref().map(|p| p.input_tokens).unwrap_or(u.input_tokens);
                            usage = Some(Usage { input_tokens, output_tokens: u.output_tokens });
                        }
                    }
                }
                "message_stop" => {
                    debug!(stop_reason = ?stop_reason, "message complete");
                    yield Ok(StreamDelta::Done {
                        stop_reason: stop_reason.take().or_else(|| Some("end_turn".to_string())),
                        usage: usage.take(),
                    });
                }
                "error" => {
                    let message = serde_json::from_str::<ErrorEvent>(&event.data)
                        .map(|e| e.error.message)
                        .unwrap_or_else(|_| event.data.clone());
                    yield Err(LlmError::StreamError(message));
                }
                _ => {}
            }
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct MessageStart {
    message: MessageStartBody,
}

#[derive(Deserialize)]
struct MessageStartBody {
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlockStart {
    content_block: BlockStart,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum BlockStart {
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: BlockDelta,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum BlockDelta {
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(rename = "thinking_delta")]
    Thinking { thinking: String },
    #[serde(rename = "input_json_delta")]
    InputJson { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}
