//! Progress notifications and their tree projection
//!
//! The orchestrator only appends notifications. Views are folded from the
//! log with `project`, so nothing here feeds back into invention.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Messages kept per node.
pub const MESSAGE_RING: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum NotificationMessage {
    AssistantText {
        text: String,
    },
    Tool {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Task indices from the root function down to the emitter.
    pub path: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub message: NotificationMessage,
}

/// Observer of progress. Must not block.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Append-only in-memory event log.
#[derive(Default)]
pub struct ProgressLog {
    events: Mutex<Vec<Notification>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> ProgressNode {
        project(&self.events())
    }
}

impl ProgressSink for ProgressLog {
    fn notify(&self, notification: Notification) {
        if let Ok(mut events) = self.events.lock() {
            events.push(notification);
        }
    }
}

/// Mirrors notifications into the tracing log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn notify(&self, n: Notification) {
        let path = format!("{:?}", n.path);
        let name = n.name.as_deref().unwrap_or("-");
        match &n.message {
            NotificationMessage::AssistantText { text } => {
                info!(path = %path, name, chars = text.len(), "assistant text")
            }
            NotificationMessage::Tool { name: tool, error: None } => {
                info!(path = %path, name, tool = %tool, "tool call")
            }
            NotificationMessage::Tool { name: tool, error: Some(e) } => {
                warn!(path = %path, name, tool = %tool, error = %e, "tool call failed")
            }
            NotificationMessage::Done { error: None } => info!(path = %path, name, "done"),
            NotificationMessage::Done { error: Some(e) } => {
                warn!(path = %path, name, error = %e, "done with error")
            }
        }
    }
}

/// Forwards every notification to each inner sink.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ProgressSink for FanoutSink {
    fn notify(&self, notification: Notification) {
        for sink in &self.sinks {
            sink.notify(notification.clone());
        }
    }
}

/// A sink bound to one function's position in the tree.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn ProgressSink>,
    path: Vec<usize>,
    name: Option<String>,
}

impl Reporter {
    pub fn root(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            path: Vec::new(),
            name: None,
        }
    }

    /// Reporter for the sub-function at task `index`.
    pub fn child(&self, index: usize) -> Self {
        let mut path = self.path.clone();
        path.push(index);
        Self {
            sink: self.sink.clone(),
            path,
            name: None,
        }
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn notify(&self, message: NotificationMessage) {
        self.sink.notify(Notification {
            path: self.path.clone(),
            name: self.name.clone(),
            message,
        });
    }

    pub fn done(&self, error: Option<String>) {
        self.notify(NotificationMessage::Done { error });
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressNode {
    pub name: Option<String>,
    pub messages: VecDeque<String>,
    pub done: bool,
    pub error: Option<String>,
    pub children: BTreeMap<usize, ProgressNode>,
}

impl ProgressNode {
    fn push_message(&mut self, message: String) {
        if self.messages.len() == MESSAGE_RING {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    fn node_at(&mut self, path: &[usize]) -> &mut ProgressNode {
        let mut node = self;
        for index in path {
            node = node.children.entry(*index).or_default();
        }
        node
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0, None);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize, index: Option<usize>) {
        let indent = "  ".repeat(depth);
        let label = self.name.as_deref().unwrap_or("(unnamed)");
        let status = match (&self.error, self.done) {
            (Some(e), _) => format!("failed: {}", e),
            (None, true) => "done".to_string(),
            (None, false) => "running".to_string(),
        };
        let prefix = index.map(|i| format!("[{}] ", i)).unwrap_or_default();
        let _ = writeln!(out, "{}{}{} ({})", indent, prefix, label, status);
        for message in &self.messages {
            let line = message.lines().next().unwrap_or_default();
            let _ = writeln!(out, "{}  > {}", indent, line);
        }
        for (i, child) in &self.children {
            child.render_into(out, depth + 1, Some(*i));
        }
    }
}

/// Fold a notification log into a tree keyed by task index.
pub fn project(events: &[Notification]) -> ProgressNode {
    let mut root = ProgressNode::default();
    for event in events {
        let node = root.node_at(&event.path);
        if let Some(name) = &event.name {
            node.name = Some(name.clone());
        }
        match &event.message {
            NotificationMessage::AssistantText { text } => node.push_message(text.clone()),
            NotificationMessage::Tool { name, error: None } => {
                node.push_message(format!("tool {}", name))
            }
            NotificationMessage::Tool { name, error: Some(e) } => {
                node.push_message(format!("tool {} failed: {}", name, e))
            }
            NotificationMessage::Done { error } => {
                node.done = true;
                node.error = error.clone();
            }
        }
    }
    root
}
