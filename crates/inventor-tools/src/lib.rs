//! Inventor Tools - the builder tool contract exposed to the agent
//!
//! Each tool wraps one state operation. A step asks for the tools it allows
//! by name; tools that are not registered are never shown to the model.

pub mod registry;
pub mod tools;

pub use registry::{Tool, ToolRegistry, ToolResult};
pub use tools::name::{NameAvailability, WriteNameTool};
pub use tools::{SharedState, StateTool};

use std::sync::Arc;

use inventor_core::InventState;
use tokio::sync::Mutex;

pub fn shared_state(state: InventState) -> SharedState {
    Arc::new(Mutex::new(state))
}

/// Build a registry holding only `allowed_tools`.
///
/// `WriteName` is only registered when a name registry is supplied.
pub fn create_builder_registry(
    state: SharedState,
    availability: Option<Arc<dyn NameAvailability>>,
    allowed_tools: &[&str],
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    for name in allowed_tools {
        if *name == "WriteName" {
            match &availability {
                Some(a) => registry.register(WriteNameTool::new(state.clone(), a.clone())),
                None => tracing::warn!("WriteName requested without a name registry"),
            }
            continue;
        }
        match tools::by_name(name, state.clone()) {
            Some(tool) => registry.register(tool),
            None => tracing::warn!("Unknown tool in step: {}", name),
        }
    }

    registry
}
