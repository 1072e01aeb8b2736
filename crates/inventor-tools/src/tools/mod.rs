//! Builder tools
//!
//! Each tool wraps one `InventState` operation. Handlers run synchronously
//! under the state lock; the agent is the only writer while a step runs.

pub mod fields;
pub mod name;
pub mod tasks;
pub mod text;

use std::sync::Arc;

use inventor_core::{Error, InventState, Result};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::registry::{Tool, ToolResult};

pub type SharedState = Arc<Mutex<InventState>>;

type Handler = Box<dyn Fn(&mut InventState, &Value) -> Result<String> + Send + Sync>;

pub struct StateTool {
    name: &'static str,
    description: &'static str,
    schema: Value,
    read_only: bool,
    state: SharedState,
    handler: Handler,
}

impl StateTool {
    pub fn reader(
        name: &'static str,
        description: &'static str,
        state: SharedState,
        handler: impl Fn(&InventState, &Value) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            description,
            schema: no_args(),
            read_only: true,
            state,
            handler: Box::new(move |s, args| handler(s, args)),
        }
    }

    pub fn writer(
        name: &'static str,
        description: &'static str,
        schema: Value,
        state: SharedState,
        handler: impl Fn(&mut InventState, &Value) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            description,
            schema,
            read_only: false,
            state,
            handler: Box::new(handler),
        }
    }

    /// Override the input schema of a reader that takes arguments.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait::async_trait]
impl Tool for StateTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let mut state = self.state.lock().await;
        let result = (self.handler)(&mut state, &args);
        match &result {
            Err(e) if e.is_recoverable() => debug!(tool = self.name, error = %e, "tool rejected"),
            Err(e) => warn!(tool = self.name, error = %e, "tool failed"),
            Ok(_) => {}
        }
        result.into()
    }
}

/// Look up a builder tool by name. `WriteName` needs a name registry and is
/// built separately.
pub fn by_name(name: &str, state: SharedState) -> Option<StateTool> {
    let tool = match name {
        "ReadInventSpec" => text::read_invent_spec(state),
        "ReadFunctionType" => text::read_function_type(state),
        "WriteFunctionType" => text::write_function_type(state),
        "ReadName" => text::read_name(state),
        "ReadInventEssay" => text::read_invent_essay(state),
        "WriteInventEssay" => text::write_invent_essay(state),
        "ReadInventEssayTasks" => text::read_invent_essay_tasks(state),
        "WriteInventEssayTasks" => text::write_invent_essay_tasks(state),
        "ReadDescription" => text::read_description(state),
        "WriteDescription" => text::write_description(state),
        "ReadReadme" => text::read_readme(state),
        "WriteReadme" => text::write_readme(state),
        "ReadFunctionInputSchema" => fields::read_input_schema(state),
        "WriteFunctionInputSchema" => fields::write_input_schema(state),
        "ReadFunctionOutputLength" => fields::read_output_length(state),
        "WriteFunctionOutputLength" => fields::write_output_length(state),
        "ReadFunctionInputSplit" => fields::read_input_split(state),
        "WriteFunctionInputSplit" => fields::write_input_split(state),
        "ReadFunctionInputMerge" => fields::read_input_merge(state),
        "WriteFunctionInputMerge" => fields::write_input_merge(state),
        "CheckFields" => fields::check_fields(state),
        "ReadTasksLength" => tasks::read_tasks_length(state),
        "ReadTask" => tasks::read_task(state),
        "ReadTaskSpec" => tasks::read_task_spec(state),
        "AppendTask" => tasks::append_task(state),
        "AppendVectorTask" => tasks::append_vector_task(state),
        "AppendScalarTask" => tasks::append_scalar_task(state),
        "EditTask" => tasks::edit_task(state),
        "EditVectorTask" => tasks::edit_vector_task(state),
        "EditScalarTask" => tasks::edit_scalar_task(state),
        "EditTaskSpec" => tasks::edit_task_spec(state),
        "DeleteTask" => tasks::delete_task(state),
        "CheckFunction" => tasks::check_function(state),
        _ => return None,
    };
    Some(tool)
}

// ----------------------------------------------------------------------
// Argument helpers
// ----------------------------------------------------------------------

pub(crate) fn no_args() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub(crate) fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::validation(format!("Missing required parameter: {}", key)))
}

pub(crate) fn arg_value(args: &Value, key: &str) -> Result<Value> {
    args.get(key)
        .cloned()
        .ok_or_else(|| Error::validation(format!("Missing required parameter: {}", key)))
}

/// Negative, fractional or missing indices are all "Invalid index".
pub(crate) fn arg_index(args: &Value) -> Result<usize> {
    args.get("index")
        .and_then(|v| v.as_u64())
        .map(|i| i as usize)
        .ok_or_else(|| Error::validation("Invalid index"))
}

pub(crate) fn pretty(value: &Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
