//! Field tools: input schema and the vector-only expressions

use serde_json::json;

use super::{arg_value, pretty, SharedState, StateTool};

fn expression_schema(key: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            key: {
                "description": "A literal JSON value or an expression object \
                                such as {\"$starlark\": \"...\"}"
            }
        },
        "required": [key]
    })
}

pub fn read_input_schema(state: SharedState) -> StateTool {
    StateTool::reader(
        "ReadFunctionInputSchema",
        "Read the FunctionInputSchema.",
        state,
        |s, _| pretty(s.builder()?.input_schema()?),
    )
}

pub fn write_input_schema(state: SharedState) -> StateTool {
    StateTool::writer(
        "WriteFunctionInputSchema",
        "Write the FunctionInputSchema, the JSON schema of the function's input. \
         Edits that remove image, audio, video or file inputs are rejected once; \
         repeat the call with dangerouslyRemoveModalities: true to confirm.",
        json!({
            "type": "object",
            "properties": {
                "value": { "type": "object", "description": "The input schema" },
                "dangerouslyRemoveModalities": { "type": "boolean" }
            },
            "required": ["value"]
        }),
        state,
        |s, args| {
            let value = arg_value(args, "value")?;
            let dangerously = args
                .get("dangerouslyRemoveModalities")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            s.builder_mut()?.set_input_schema(value, dangerously)
        },
    )
}

pub fn read_output_length(state: SharedState) -> StateTool {
    StateTool::reader(
        "ReadFunctionOutputLength",
        "Read the FunctionOutputLength expression.",
        state,
        |s, _| pretty(s.builder()?.output_length()?),
    )
}

pub fn write_output_length(state: SharedState) -> StateTool {
    StateTool::writer(
        "WriteFunctionOutputLength",
        "Write the FunctionOutputLength: how many items the function ranks, \
         as an integer or an expression over the input.",
        expression_schema("value"),
        state,
        |s, args| s.builder_mut()?.set_output_length(arg_value(args, "value")?),
    )
}

pub fn read_input_split(state: SharedState) -> StateTool {
    StateTool::reader(
        "ReadFunctionInputSplit",
        "Read the FunctionInputSplit expression.",
        state,
        |s, _| pretty(s.builder()?.input_split()?),
    )
}

pub fn write_input_split(state: SharedState) -> StateTool {
    StateTool::writer(
        "WriteFunctionInputSplit",
        "Write the FunctionInputSplit: an expression splitting the input into \
         one input per ranked item.",
        expression_schema("value"),
        state,
        |s, args| s.builder_mut()?.set_input_split(arg_value(args, "value")?),
    )
}

pub fn read_input_merge(state: SharedState) -> StateTool {
    StateTool::reader(
        "ReadFunctionInputMerge",
        "Read the FunctionInputMerge expression.",
        state,
        |s, _| pretty(s.builder()?.input_merge()?),
    )
}

pub fn write_input_merge(state: SharedState) -> StateTool {
    StateTool::writer(
        "WriteFunctionInputMerge",
        "Write the FunctionInputMerge: an expression merging a subset of split \
         inputs back into one input.",
        expression_schema("value"),
        state,
        |s, args| s.builder_mut()?.set_input_merge(arg_value(args, "value")?),
    )
}

pub fn check_fields(state: SharedState) -> StateTool {
    StateTool::reader(
        "CheckFields",
        "Validate the function fields together.",
        state,
        |s, _| s.builder()?.check_fields(),
    )
}
