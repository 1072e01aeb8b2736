//! Error types for Inventor

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A field value does not match its schema. Fed back to the agent.
    #[error("{0}")]
    Validation(String),

    /// Task count or cross-field inconsistency. Fed back to the agent.
    #[error("{0}")]
    Structural(String),

    #[error("name conflict: {name} - {reason}")]
    NameConflict { name: String, reason: String },

    #[error("step {step} failed after {retries} retries: {reason}")]
    StepExhausted {
        step: String,
        retries: usize,
        reason: String,
    },

    #[error("{} child inventions failed: {}", .0.len(), join_errors(.0))]
    AggregateChild(Vec<Error>),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("vcs error: {0}")]
    Vcs(String),

    #[error("host error: {0}")]
    Host(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }

    pub fn name_conflict(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NameConflict {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn step_exhausted(
        step: impl Into<String>,
        retries: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::StepExhausted {
            step: step.into(),
            retries,
            reason: reason.into(),
        }
    }

    pub fn vcs(message: impl Into<String>) -> Self {
        Self::Vcs(message.into())
    }

    pub fn host(message: impl Into<String>) -> Self {
        Self::Host(message.into())
    }

    /// Whether the agent can correct this failure on a retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Structural(_) | Self::NameConflict { .. }
        )
    }

    /// Collapse settled child failures: none is success, one is rethrown
    /// unchanged, several become an aggregate.
    pub fn from_children(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::AggregateChild(errors)),
        }
    }
}
