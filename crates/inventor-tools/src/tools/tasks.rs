//! Task list tools
//!
//! `AppendTask`/`EditTask` follow the builder variant: completion tasks on
//! leaves, placeholders of the function's own type on branches.
//! `AppendVectorTask`/`AppendScalarTask` and their edit counterparts only
//! make sense on vector branches, where scalar sub-tasks are mapped.

use serde_json::{json, Value};

use super::{arg_index, arg_str, arg_value, SharedState, StateTool};

fn index_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "index": { "type": "integer", "minimum": 0 } },
        "required": ["index"]
    })
}

fn task_schema(with_index: bool, with_spec: bool, with_input_map: bool) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    if with_index {
        properties.insert("index".into(), json!({ "type": "integer", "minimum": 0 }));
        required.push("index");
    }
    properties.insert(
        "value".into(),
        json!({ "type": "object", "description": "The task object" }),
    );
    required.push("value");
    if with_input_map {
        properties.insert(
            "inputMap".into(),
            json!({ "description": "Expression producing the list this task is mapped over" }),
        );
        required.push("inputMap");
    }
    if with_spec {
        properties.insert(
            "spec".into(),
            json!({ "type": "string", "description": "Creative brief for the sub-function" }),
        );
        required.push("spec");
    }
    json!({ "type": "object", "properties": properties, "required": required })
}

pub fn read_tasks_length(state: SharedState) -> StateTool {
    StateTool::reader(
        "ReadTasksLength",
        "Read the number of tasks.",
        state,
        |s, _| Ok(s.builder()?.tasks_len().to_string()),
    )
}

pub fn read_task(state: SharedState) -> StateTool {
    StateTool::reader(
        "ReadTask",
        "Read the task at an index, with its input map when mapped.",
        state,
        |s, args| s.builder()?.read_task(arg_index(args)?),
    )
    .with_schema(index_schema())
}

pub fn read_task_spec(state: SharedState) -> StateTool {
    StateTool::reader(
        "ReadTaskSpec",
        "Read the creative brief of the sub-function task at an index.",
        state,
        |s, args| s.builder()?.read_task_spec(arg_index(args)?),
    )
    .with_schema(index_schema())
}

pub fn append_task(state: SharedState) -> StateTool {
    StateTool::writer(
        "AppendTask",
        "Append a task. Leaf functions take vector.completion tasks; branch \
         functions take a sub-function task plus a spec describing it.",
        task_schema(false, true, false),
        state,
        |s, args| {
            let value = arg_value(args, "value")?;
            let builder = s.builder_mut()?;
            if builder.variant().is_branch() {
                builder.append_placeholder_task(value, arg_str(args, "spec")?)
            } else {
                builder.append_task(value)
            }
        },
    )
}

pub fn append_vector_task(state: SharedState) -> StateTool {
    StateTool::writer(
        "AppendVectorTask",
        "Append an unmapped vector sub-function task with its spec.",
        task_schema(false, true, false),
        state,
        |s, args| {
            s.builder_mut()?
                .append_placeholder_task(arg_value(args, "value")?, arg_str(args, "spec")?)
        },
    )
}

pub fn append_scalar_task(state: SharedState) -> StateTool {
    StateTool::writer(
        "AppendScalarTask",
        "Append a scalar sub-function task mapped over the list produced by \
         inputMap. Its map index is assigned automatically.",
        task_schema(false, true, true),
        state,
        |s, args| {
            s.builder_mut()?.append_mapped_task(
                arg_value(args, "value")?,
                arg_value(args, "inputMap")?,
                arg_str(args, "spec")?,
            )
        },
    )
}

pub fn edit_task(state: SharedState) -> StateTool {
    StateTool::writer(
        "EditTask",
        "Replace the task at an index.",
        task_schema(true, false, false),
        state,
        |s, args| {
            let index = arg_index(args)?;
            s.builder_mut()?
                .edit_task(index, arg_value(args, "value")?)
        },
    )
}

pub fn edit_vector_task(state: SharedState) -> StateTool {
    StateTool::writer(
        "EditVectorTask",
        "Replace the unmapped vector sub-function task at an index.",
        task_schema(true, false, false),
        state,
        |s, args| {
            let index = arg_index(args)?;
            s.builder_mut()?
                .edit_task(index, arg_value(args, "value")?)
        },
    )
}

pub fn edit_scalar_task(state: SharedState) -> StateTool {
    StateTool::writer(
        "EditScalarTask",
        "Replace the mapped scalar sub-function task at an index and its input map.",
        task_schema(true, false, true),
        state,
        |s, args| {
            let index = arg_index(args)?;
            s.builder_mut()?.edit_mapped_task(
                index,
                arg_value(args, "value")?,
                arg_value(args, "inputMap")?,
            )
        },
    )
}

pub fn edit_task_spec(state: SharedState) -> StateTool {
    StateTool::writer(
        "EditTaskSpec",
        "Replace the spec of the sub-function task at an index.",
        json!({
            "type": "object",
            "properties": {
                "index": { "type": "integer", "minimum": 0 },
                "spec": { "type": "string" }
            },
            "required": ["index", "spec"]
        }),
        state,
        |s, args| {
            let index = arg_index(args)?;
            s.builder_mut()?
                .edit_task_spec(index, arg_str(args, "spec")?)
        },
    )
}

pub fn delete_task(state: SharedState) -> StateTool {
    StateTool::writer(
        "DeleteTask",
        "Delete the task at an index.",
        index_schema(),
        state,
        |s, args| {
            let index = arg_index(args)?;
            s.builder_mut()?.delete_task(index)
        },
    )
}

pub fn check_function(state: SharedState) -> StateTool {
    StateTool::reader(
        "CheckFunction",
        "Validate the whole function: task count, task contents and fields.",
        state,
        |s, _| s.builder()?.check_function(),
    )
}
