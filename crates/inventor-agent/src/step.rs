//! Step sequencer
//!
//! Invoke the agent, then ask the completion predicate. A failed predicate
//! re-invokes with the failure appended to the prompt, up to `max_retries`
//! more times. The sequencer never touches invention state itself.

use std::future::Future;
use std::sync::Arc;

use inventor_core::{Error, NotificationMessage, Reporter, Result};
use inventor_tools::ToolRegistry;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentEvent, Continuation};

pub const DEFAULT_MAX_RETRIES: usize = 5;

pub struct StepRequest {
    pub name: String,
    pub prompt: String,
    pub tools: Arc<ToolRegistry>,
    pub max_retries: usize,
}

impl StepRequest {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>, tools: ToolRegistry) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            tools: Arc::new(tools),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }
}

pub fn retry_prompt(prompt: &str, error: &str) -> String {
    format!(
        "{}\n\nThe following error occurred: {}\n\nPlease try again.",
        prompt, error
    )
}

/// Run one step to completion. Returns the agent's continuation once the
/// predicate holds, or `StepExhausted` with the last failure reason.
pub async fn run_step<P, Fut>(
    agent: &dyn Agent,
    step: &StepRequest,
    predicate: P,
    reporter: &Reporter,
    continuation: Option<Continuation>,
    cancel: &CancellationToken,
) -> Result<Continuation>
where
    P: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<(), String>>,
{
    let (mut continuation, mut failure) =
        invoke_once(agent, step, &step.prompt, reporter, continuation, cancel).await?;

    for attempt in 1..=step.max_retries {
        let reason = match predicate().await {
            Ok(()) => return Ok(continuation),
            Err(reason) => match failure.take() {
                Some(failure) => format!("{} (the last attempt ended with: {})", reason, failure),
                None => reason,
            },
        };
        warn!(step = %step.name, attempt, reason = %reason, "step incomplete, retrying");
        let prompt = retry_prompt(&step.prompt, &reason);
        (continuation, failure) =
            invoke_once(agent, step, &prompt, reporter, Some(continuation), cancel).await?;
    }

    match predicate().await {
        Ok(()) => Ok(continuation),
        Err(reason) => Err(Error::step_exhausted(&step.name, step.max_retries, reason)),
    }
}

/// One agent invocation. Agent events are forwarded to the reporter while
/// the invocation runs. A retryable agent failure keeps the prior
/// conversation and comes back as the second element, to be named in the
/// next retry prompt.
async fn invoke_once(
    agent: &dyn Agent,
    step: &StepRequest,
    prompt: &str,
    reporter: &Reporter,
    continuation: Option<Continuation>,
    cancel: &CancellationToken,
) -> Result<(Continuation, Option<String>)> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    debug!(step = %step.name, tools = step.tools.len(), "invoking agent");

    let previous = continuation.clone().unwrap_or_default();
    let (tx, rx) = mpsc::channel::<AgentEvent>(256);
    let invocation = agent.invoke(prompt, step.tools.clone(), continuation, tx, cancel.clone());
    let (result, ()) = tokio::join!(invocation, forward_events(rx, reporter));

    match result {
        Ok(next) => {
            info!(step = %step.name, messages = next.len(), "agent turn finished");
            Ok((next, None))
        }
        Err(e) if e.is_retryable() => {
            warn!(step = %step.name, error = %e, "agent turn failed");
            Ok((previous, Some(e.to_string())))
        }
        Err(e) => Err(e.into()),
    }
}

/// Coalesce streamed text into one notification per assistant message.
async fn forward_events(mut rx: mpsc::Receiver<AgentEvent>, reporter: &Reporter) {
    let mut text = String::new();
    let flush = |text: &mut String| {
        if !text.trim().is_empty() {
            reporter.notify(NotificationMessage::AssistantText {
                text: std::mem::take(text),
            });
        }
        text.clear();
    };

    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::Text(delta) => text.push_str(&delta),
            AgentEvent::ToolCallStart { .. } | AgentEvent::Done { .. } => flush(&mut text),
            AgentEvent::ToolResult {
                name,
                result,
                is_error,
                ..
            } => {
                flush(&mut text);
                reporter.notify(NotificationMessage::Tool {
                    name,
                    error: is_error.then_some(result),
                });
            }
            AgentEvent::Error(e) => {
                flush(&mut text);
                debug!(error = %e, "agent stream error");
            }
            AgentEvent::Thinking(_) => {}
        }
    }
    flush(&mut text);
}
