//! Inventor Agent - the agent capability, the LLM tool loop and the step sequencer

pub mod agent;
pub mod error;
pub mod runtime;
pub mod step;

pub use agent::{Agent, AgentEvent, Continuation};
pub use error::AgentError;
pub use runtime::{AgentConfig, LlmAgent};
pub use step::{retry_prompt, run_step, StepRequest, DEFAULT_MAX_RETRIES};
