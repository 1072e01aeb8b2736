//! WriteName: shape check plus local and remote availability

use std::sync::Arc;

use async_trait::async_trait;
use inventor_core::{validate_name, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{arg_str, SharedState};
use crate::registry::{Tool, ToolResult};

/// Claims function names. `reserve` fails with a name conflict when the
/// name is already taken locally or on the remote host.
#[async_trait]
pub trait NameAvailability: Send + Sync {
    async fn reserve(&self, name: &str) -> Result<()>;

    /// Give back a name reserved earlier in this step.
    async fn release(&self, name: &str);
}

pub struct WriteNameTool {
    state: SharedState,
    availability: Arc<dyn NameAvailability>,
}

impl WriteNameTool {
    pub fn new(state: SharedState, availability: Arc<dyn NameAvailability>) -> Self {
        Self {
            state,
            availability,
        }
    }

    async fn write(&self, args: &Value) -> Result<String> {
        let name = arg_str(args, "name")?;
        validate_name(name)?;

        let previous = self.state.lock().await.name().ok().map(str::to_string);
        if previous.as_deref() == Some(name) {
            return Ok("Name updated".to_string());
        }

        self.availability.reserve(name).await?;
        if let Some(previous) = previous {
            self.availability.release(&previous).await;
        }
        self.state.lock().await.set_name(name)?;
        info!(name, "name reserved");
        Ok("Name updated".to_string())
    }
}

#[async_trait]
impl Tool for WriteNameTool {
    fn name(&self) -> &str {
        "WriteName"
    }

    fn description(&self) -> &str {
        "Write the function Name. Lowercase letters, digits and single hyphens, \
         at most 100 bytes, and not already taken."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "pattern": "^[a-z0-9](-?[a-z0-9])*$" }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let result = self.write(&args).await;
        match &result {
            Err(e) if e.is_recoverable() => debug!(error = %e, "name rejected"),
            Err(e) => warn!(error = %e, "name check failed"),
            Ok(_) => {}
        }
        result.into()
    }
}
