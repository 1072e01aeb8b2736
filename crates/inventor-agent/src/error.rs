//! Agent error type

use inventor_llm::LlmError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("max tool iterations exceeded ({0})")]
    MaxIterations(usize),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Failures a fresh attempt of the same step may get past.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MaxIterations(_) => true,
            Self::Llm(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<AgentError> for inventor_core::Error {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Cancelled | AgentError::Llm(LlmError::Cancelled) => Self::Cancelled,
            other => Self::Agent(other.to_string()),
        }
    }
}
