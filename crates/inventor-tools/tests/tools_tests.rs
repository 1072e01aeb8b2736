//! Tests for inventor-tools: ToolResult, ToolRegistry and the builder tool contract

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use inventor_core::{
    Error, InventState, ParameterOverrides, Parameters, QualityChecker, StructuralChecker,
};
use inventor_tools::*;
use serde_json::{json, Value};

fn checker() -> Arc<dyn QualityChecker> {
    Arc::new(StructuralChecker::new())
}

fn state_with(params: Parameters) -> SharedState {
    shared_state(InventState::new(params, "rank dog photos by cuteness", None, checker()).unwrap())
}

fn leaf_state() -> SharedState {
    state_with(Parameters::default())
}

fn branch_state() -> SharedState {
    state_with(
        ParameterOverrides {
            depth: Some(1),
            ..Default::default()
        }
        .resolve(),
    )
}

const ALL: &[&str] = &[
    "ReadInventSpec",
    "ReadFunctionType",
    "WriteFunctionType",
    "ReadName",
    "WriteName",
    "ReadInventEssay",
    "WriteInventEssay",
    "ReadInventEssayTasks",
    "WriteInventEssayTasks",
    "ReadDescription",
    "WriteDescription",
    "ReadReadme",
    "WriteReadme",
    "ReadFunctionInputSchema",
    "WriteFunctionInputSchema",
    "ReadFunctionOutputLength",
    "WriteFunctionOutputLength",
    "ReadFunctionInputSplit",
    "WriteFunctionInputSplit",
    "ReadFunctionInputMerge",
    "WriteFunctionInputMerge",
    "CheckFields",
    "ReadTasksLength",
    "ReadTask",
    "ReadTaskSpec",
    "AppendTask",
    "AppendVectorTask",
    "AppendScalarTask",
    "EditTask",
    "EditVectorTask",
    "EditScalarTask",
    "EditTaskSpec",
    "DeleteTask",
    "CheckFunction",
];

#[derive(Default)]
struct FakeNames {
    taken: Mutex<HashSet<String>>,
    released: Mutex<Vec<String>>,
}

impl FakeNames {
    fn with_taken(names: &[&str]) -> Self {
        let me = Self::default();
        me.taken
            .lock()
            .unwrap()
            .extend(names.iter().map(|s| s.to_string()));
        me
    }
}

#[async_trait]
impl NameAvailability for FakeNames {
    async fn reserve(&self, name: &str) -> inventor_core::Result<()> {
        let mut taken = self.taken.lock().unwrap();
        if !taken.insert(name.to_string()) {
            return Err(Error::name_conflict(name, "already exists"));
        }
        Ok(())
    }

    async fn release(&self, name: &str) {
        self.taken.lock().unwrap().remove(name);
        self.released.lock().unwrap().push(name.to_string());
    }
}

fn registry(state: &SharedState, names: &[&str]) -> ToolRegistry {
    let availability: Arc<dyn NameAvailability> = Arc::new(FakeNames::default());
    create_builder_registry(state.clone(), Some(availability), names)
}

fn completion_task(n: usize) -> Value {
    json!({
        "messages": [{"role": "user", "content": format!("question {}", n)}],
        "responses": ["yes", "no"],
        "output": {"$starlark": "output['scores'][0]"}
    })
}

// ===========================================================================
// ToolResult
// ===========================================================================

#[test]
fn tool_result_text() {
    let r = ToolResult::text("hello");
    assert!(!r.is_error());
    assert_eq!(r.to_content_string(), "hello");
    assert_eq!(r.error_message(), None);
}

#[test]
fn tool_result_error() {
    let r = ToolResult::error("boom");
    assert!(r.is_error());
    assert_eq!(r.to_content_string(), "Error: boom");
    assert_eq!(r.error_message(), Some("boom"));
}

#[test]
fn tool_result_from_result() {
    let ok: ToolResult = Ok::<_, Error>("done".to_string()).into();
    assert_eq!(ok, ToolResult::text("done"));
    let err: ToolResult = Err::<String, _>(Error::validation("Invalid index")).into();
    assert_eq!(err, ToolResult::error("Invalid index"));
}

// ===========================================================================
// ToolRegistry
// ===========================================================================

#[tokio::test]
async fn registry_default_is_empty() {
    let reg = ToolRegistry::new();
    assert!(reg.is_empty());
    assert!(reg.get_definitions().is_empty());
}

#[tokio::test]
async fn registry_execute_missing_tool() {
    let reg = ToolRegistry::new();
    let result = reg.execute("nonexistent", json!({})).await;
    assert!(result.is_error());
    assert!(result.to_content_string().contains("not found"));
}

#[test]
fn every_named_tool_is_constructible() {
    let state = leaf_state();
    let reg = registry(&state, ALL);
    assert_eq!(reg.len(), ALL.len());
    for def in reg.get_definitions() {
        assert_eq!(def.input_schema["type"], "object", "{}", def.name);
        assert!(!def.description.is_empty());
    }
}

#[test]
fn registry_only_holds_allowed_tools() {
    let state = leaf_state();
    let reg = registry(&state, &["ReadInventSpec", "WriteInventEssay", "Bogus"]);
    assert_eq!(reg.list(), vec!["ReadInventSpec", "WriteInventEssay"]);
    assert_eq!(reg.list_read_only(), vec!["ReadInventSpec"]);
}

#[test]
fn write_name_needs_a_name_registry() {
    let state = leaf_state();
    let reg = create_builder_registry(state, None, &["ReadName", "WriteName"]);
    assert_eq!(reg.list(), vec!["ReadName"]);
}

#[tokio::test]
async fn cancelled_execution_reports_error() {
    let state = leaf_state();
    let reg = registry(&state, &["ReadInventSpec"]);
    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();
    let _guard = state.lock().await;
    let result = reg
        .execute_cancellable("ReadInventSpec", json!({}), token)
        .await;
    assert_eq!(result, ToolResult::error("cancelled"));
}

// ===========================================================================
// Text tools
// ===========================================================================

#[tokio::test]
async fn reads_before_writes_report_not_set() {
    let state = leaf_state();
    let reg = registry(&state, ALL);
    for tool in ["ReadName", "ReadInventEssay", "ReadReadme", "ReadFunctionType"] {
        let r = reg.execute(tool, json!({})).await;
        assert!(r.is_error(), "{}", tool);
        assert!(r.to_content_string().ends_with("not set"), "{}", tool);
    }
    let spec = reg.execute("ReadInventSpec", json!({})).await;
    assert_eq!(spec.to_content_string(), "rank dog photos by cuteness");
}

#[tokio::test]
async fn essay_round_trip_and_blank_rejected() {
    let state = leaf_state();
    let reg = registry(&state, ALL);
    let r = reg
        .execute("WriteInventEssay", json!({"essay": "   "}))
        .await;
    assert_eq!(r, ToolResult::error("InventEssay cannot be empty"));

    reg.execute("WriteInventEssay", json!({"essay": "Cuteness is..."}))
        .await;
    let r = reg.execute("ReadInventEssay", json!({})).await;
    assert_eq!(r.to_content_string(), "Cuteness is...");
}

#[tokio::test]
async fn function_type_selects_builder() {
    let state = leaf_state();
    let reg = registry(&state, ALL);
    let r = reg
        .execute("WriteFunctionType", json!({"functionType": "matrix.function"}))
        .await;
    assert!(r.is_error());

    let r = reg
        .execute("WriteFunctionType", json!({"functionType": "vector.function"}))
        .await;
    assert_eq!(r, ToolResult::text("FunctionType set"));
    let r = reg.execute("ReadFunctionType", json!({})).await;
    assert_eq!(r.to_content_string(), "vector.function");
}

#[tokio::test]
async fn description_requires_a_type() {
    let state = leaf_state();
    let reg = registry(&state, ALL);
    let r = reg
        .execute("WriteDescription", json!({"description": "Ranks dogs"}))
        .await;
    assert_eq!(r, ToolResult::error("FunctionType not set"));
}

// ===========================================================================
// WriteName
// ===========================================================================

#[tokio::test]
async fn write_name_checks_shape_and_availability() {
    let state = leaf_state();
    let names = Arc::new(FakeNames::with_taken(&["taken-name"]));
    let reg = create_builder_registry(state.clone(), Some(names.clone()), &["WriteName"]);

    let r = reg.execute("WriteName", json!({"name": "Bad-Name"})).await;
    assert!(r.is_error());

    let r = reg.execute("WriteName", json!({"name": "taken-name"})).await;
    assert!(r.to_content_string().contains("name conflict"));
    assert!(state.lock().await.name().is_err());

    let r = reg.execute("WriteName", json!({"name": "dog-cuteness"})).await;
    assert_eq!(r, ToolResult::text("Name updated"));
    assert_eq!(state.lock().await.name().unwrap(), "dog-cuteness");
}

#[tokio::test]
async fn renaming_releases_previous_reservation() {
    let state = leaf_state();
    let names = Arc::new(FakeNames::default());
    let reg = create_builder_registry(state.clone(), Some(names.clone()), &["WriteName"]);

    reg.execute("WriteName", json!({"name": "first"})).await;
    reg.execute("WriteName", json!({"name": "second"})).await;
    assert_eq!(*names.released.lock().unwrap(), vec!["first".to_string()]);
    assert!(!names.taken.lock().unwrap().contains("first"));

    // Rewriting the same name is a no-op, not a conflict
    let r = reg.execute("WriteName", json!({"name": "second"})).await;
    assert!(!r.is_error());
}

// ===========================================================================
// Field tools
// ===========================================================================

#[tokio::test]
async fn modality_guard_through_tools() {
    let state = leaf_state();
    let reg = registry(&state, ALL);
    reg.execute("WriteFunctionType", json!({"functionType": "scalar.function"}))
        .await;

    let with_image = json!({
        "type": "object",
        "properties": {"photo": {"type": "image"}, "caption": {"type": "string"}}
    });
    let without_image = json!({
        "type": "object",
        "properties": {"caption": {"type": "string"}}
    });

    let r = reg
        .execute("WriteFunctionInputSchema", json!({"value": with_image}))
        .await;
    assert!(!r.is_error(), "{:?}", r);

    let r = reg
        .execute("WriteFunctionInputSchema", json!({"value": without_image}))
        .await;
    assert!(r.to_content_string().contains("image"));

    let r = reg
        .execute(
            "WriteFunctionInputSchema",
            json!({"value": without_image, "dangerouslyRemoveModalities": true}),
        )
        .await;
    assert!(!r.is_error(), "{:?}", r);

    let r = reg.execute("ReadFunctionInputSchema", json!({})).await;
    assert!(!r.to_content_string().contains("image"));
}

#[tokio::test]
async fn scalar_functions_have_no_vector_fields() {
    let state = leaf_state();
    let reg = registry(&state, ALL);
    reg.execute("WriteFunctionType", json!({"functionType": "scalar.function"}))
        .await;
    let r = reg
        .execute("WriteFunctionOutputLength", json!({"value": 3}))
        .await;
    assert!(r.is_error());
}

#[tokio::test]
async fn missing_argument_is_reported() {
    let state = leaf_state();
    let reg = registry(&state, ALL);
    reg.execute("WriteFunctionType", json!({"functionType": "vector.function"}))
        .await;
    let r = reg.execute("WriteFunctionInputSplit", json!({})).await;
    assert_eq!(r, ToolResult::error("Missing required parameter: value"));
}

// ===========================================================================
// Task tools
// ===========================================================================

#[tokio::test]
async fn leaf_append_read_delete() {
    let state = leaf_state();
    let reg = registry(&state, ALL);
    reg.execute("WriteFunctionType", json!({"functionType": "scalar.function"}))
        .await;

    let r = reg
        .execute("AppendTask", json!({"value": completion_task(0)}))
        .await;
    assert_eq!(r, ToolResult::text("New length: 1"));
    reg.execute("AppendTask", json!({"value": completion_task(1)}))
        .await;

    let r = reg.execute("ReadTasksLength", json!({})).await;
    assert_eq!(r.to_content_string(), "2");

    let r = reg.execute("ReadTask", json!({"index": 1})).await;
    assert!(r.to_content_string().contains("question 1"));

    let r = reg.execute("DeleteTask", json!({"index": 0})).await;
    assert_eq!(r, ToolResult::text("New length: 1"));
}

#[tokio::test]
async fn bad_indices_are_invalid() {
    let state = leaf_state();
    let reg = registry(&state, ALL);
    reg.execute("WriteFunctionType", json!({"functionType": "scalar.function"}))
        .await;
    for args in [json!({"index": -1}), json!({"index": 0}), json!({"index": 1.5}), json!({})] {
        let r = reg.execute("DeleteTask", args.clone()).await;
        assert_eq!(r, ToolResult::error("Invalid index"), "{}", args);
    }
}

#[tokio::test]
async fn branch_scalar_append_records_spec() {
    let state = branch_state();
    let reg = registry(&state, ALL);
    reg.execute("WriteFunctionType", json!({"functionType": "scalar.function"}))
        .await;

    let task = json!({"input_schema": {"type": "string"}, "output": {"$starlark": "output"}});
    let r = reg.execute("AppendTask", json!({"value": task})).await;
    assert!(r.is_error(), "spec is required on branches");

    let r = reg
        .execute("AppendTask", json!({"value": task, "spec": "score the tone"}))
        .await;
    assert_eq!(r, ToolResult::text("New length: 1"));

    let r = reg.execute("ReadTaskSpec", json!({"index": 0})).await;
    assert_eq!(r.to_content_string(), "score the tone");

    let r = reg
        .execute("EditTaskSpec", json!({"index": 0, "spec": "score the warmth"}))
        .await;
    assert!(!r.is_error());
    let r = reg.execute("ReadTaskSpec", json!({"index": 0})).await;
    assert_eq!(r.to_content_string(), "score the warmth");
}

#[tokio::test]
async fn mapped_scalar_tasks_get_sequential_maps() {
    let state = branch_state();
    let reg = registry(&state, ALL);
    reg.execute("WriteFunctionType", json!({"functionType": "vector.function"}))
        .await;

    for i in 0..2 {
        let r = reg
            .execute(
                "AppendScalarTask",
                json!({
                    "value": {"input_schema": {"type": "string"}, "map": 99},
                    "inputMap": {"$starlark": "input['items']"},
                    "spec": format!("score item aspect {}", i)
                }),
            )
            .await;
        assert!(!r.is_error(), "{:?}", r);
    }

    let guard = state.lock().await;
    let doc = guard.builder().unwrap().document();
    assert_eq!(doc.tasks[0].map(), Some(0));
    assert_eq!(doc.tasks[1].map(), Some(1));
    assert_eq!(doc.input_maps.as_ref().unwrap().len(), 2);
}

#[tokio::test]
async fn edit_kind_mismatch_is_rejected() {
    let state = branch_state();
    let reg = registry(&state, ALL);
    reg.execute("WriteFunctionType", json!({"functionType": "vector.function"}))
        .await;
    reg.execute(
        "AppendScalarTask",
        json!({
            "value": {"input_schema": {"type": "string"}},
            "inputMap": {"$starlark": "input['items']"},
            "spec": "score one item"
        }),
    )
    .await;

    let r = reg
        .execute(
            "EditVectorTask",
            json!({"index": 0, "value": {"input_schema": {"type": "string"}}}),
        )
        .await;
    assert_eq!(r, ToolResult::error("Existing task is not UnmappedVector"));
}

#[tokio::test]
async fn check_function_reports_width() {
    let state = leaf_state();
    let reg = registry(&state, ALL);
    reg.execute("WriteFunctionType", json!({"functionType": "scalar.function"}))
        .await;
    let r = reg.execute("CheckFunction", json!({})).await;
    assert_eq!(
        r,
        ToolResult::error("Invalid Function: expected between 5 and 10 tasks, found 0")
    );
}
