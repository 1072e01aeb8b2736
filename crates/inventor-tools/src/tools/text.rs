//! Free-text state tools: spec, type, name, essays, description, README

use inventor_core::FunctionType;
use serde_json::json;

use super::{arg_str, SharedState, StateTool};

fn text_schema(key: &str, description: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            key: { "type": "string", "description": description }
        },
        "required": [key]
    })
}

pub fn read_invent_spec(state: SharedState) -> StateTool {
    StateTool::reader(
        "ReadInventSpec",
        "Read the InventSpec, the creative brief this function must satisfy.",
        state,
        |s, _| Ok(s.invent_spec().to_string()),
    )
}

pub fn read_function_type(state: SharedState) -> StateTool {
    StateTool::reader(
        "ReadFunctionType",
        "Read the FunctionType (scalar.function or vector.function).",
        state,
        |s, _| Ok(s.function_type()?.to_string()),
    )
}

pub fn write_function_type(state: SharedState) -> StateTool {
    StateTool::writer(
        "WriteFunctionType",
        "Choose the FunctionType. A scalar.function scores a single input; \
         a vector.function ranks a list of items. Choosing a type resets any \
         fields and tasks written so far.",
        json!({
            "type": "object",
            "properties": {
                "functionType": {
                    "type": "string",
                    "enum": ["scalar.function", "vector.function"]
                }
            },
            "required": ["functionType"]
        }),
        state,
        |s, args| {
            let ty = FunctionType::parse(arg_str(args, "functionType")?)?;
            s.set_function_type(ty)
        },
    )
}

pub fn read_name(state: SharedState) -> StateTool {
    StateTool::reader("ReadName", "Read the function's Name.", state, |s, _| {
        Ok(s.name()?.to_string())
    })
}

pub fn read_invent_essay(state: SharedState) -> StateTool {
    StateTool::reader(
        "ReadInventEssay",
        "Read the InventEssay.",
        state,
        |s, _| Ok(s.invent_essay()?.to_string()),
    )
}

pub fn write_invent_essay(state: SharedState) -> StateTool {
    StateTool::writer(
        "WriteInventEssay",
        "Write the InventEssay: a rationale describing what the function \
         measures and how it should approach the InventSpec.",
        text_schema("essay", "The essay text"),
        state,
        |s, args| {
            s.set_invent_essay(arg_str(args, "essay")?)?;
            Ok("InventEssay updated".to_string())
        },
    )
}

pub fn read_invent_essay_tasks(state: SharedState) -> StateTool {
    StateTool::reader(
        "ReadInventEssayTasks",
        "Read the InventEssayTasks.",
        state,
        |s, _| Ok(s.invent_essay_tasks()?.to_string()),
    )
}

pub fn write_invent_essay_tasks(state: SharedState) -> StateTool {
    StateTool::writer(
        "WriteInventEssayTasks",
        "Write the InventEssayTasks: an enumerated rationale for each task the \
         function will contain.",
        text_schema("essayTasks", "The essay tasks text"),
        state,
        |s, args| {
            s.set_invent_essay_tasks(arg_str(args, "essayTasks")?)?;
            Ok("InventEssayTasks updated".to_string())
        },
    )
}

pub fn read_description(state: SharedState) -> StateTool {
    StateTool::reader(
        "ReadDescription",
        "Read the function Description.",
        state,
        |s, _| Ok(s.description()?.to_string()),
    )
}

pub fn write_description(state: SharedState) -> StateTool {
    StateTool::writer(
        "WriteDescription",
        "Write the function Description, a short summary used as the \
         repository description.",
        text_schema("description", "The description text"),
        state,
        |s, args| {
            s.set_description(arg_str(args, "description")?)?;
            Ok("Description updated".to_string())
        },
    )
}

pub fn read_readme(state: SharedState) -> StateTool {
    StateTool::reader("ReadReadme", "Read the README.", state, |s, _| {
        Ok(s.readme()?.to_string())
    })
}

pub fn write_readme(state: SharedState) -> StateTool {
    StateTool::writer(
        "WriteReadme",
        "Write the README.md for the function repository.",
        text_schema("readme", "The README markdown"),
        state,
        |s, args| {
            s.set_readme(arg_str(args, "readme")?)?;
            Ok("README updated".to_string())
        },
    )
}
