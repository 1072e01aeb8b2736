//! Quality checking seam
//!
//! The real expression language and semantic checks live outside this
//! workspace. `StructuralChecker` enforces what can be decided from the
//! document shape alone: schema well-formedness, expression envelopes, task
//! kinds per variant and map-index integrity.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::function::{FunctionDocument, Task, Variant};
use crate::modality::Modality;

/// Validates documents and their parts. Errors carry plain messages; callers
/// add the field prefix.
pub trait QualityChecker: Send + Sync {
    fn validate_input_schema(&self, schema: &Value) -> Result<()>;

    fn validate_expression(&self, expr: &Value) -> Result<()>;

    fn validate_task(&self, variant: Variant, task: &Task) -> Result<()>;

    /// Cross-field validation of the fields set before tasks are written.
    fn check_fields(&self, variant: Variant, doc: &FunctionDocument) -> Result<()>;

    fn check_function(&self, variant: Variant, doc: &FunctionDocument) -> Result<()>;
}

const EXPRESSION_KEYS: [&str; 2] = ["$starlark", "$jmespath"];

#[derive(Clone, Copy, Debug, Default)]
pub struct StructuralChecker;

impl StructuralChecker {
    pub fn new() -> Self {
        Self
    }

    fn schema_at(&self, schema: &Value, at: &str) -> Result<()> {
        let obj = schema
            .as_object()
            .ok_or_else(|| Error::validation(format!("{}: schema must be an object", at)))?;

        if let Some(options) = obj.get("anyOf") {
            let options = options
                .as_array()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| {
                    Error::validation(format!("{}: anyOf must be a non-empty array", at))
                })?;
            for (i, option) in options.iter().enumerate() {
                self.schema_at(option, &format!("{}.anyOf[{}]", at, i))?;
            }
            return Ok(());
        }

        let ty = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation(format!("{}: missing \"type\"", at)))?;

        match ty {
            "object" => {
                let props = obj
                    .get("properties")
                    .and_then(|v| v.as_object())
                    .ok_or_else(|| {
                        Error::validation(format!("{}: object schema requires \"properties\"", at))
                    })?;
                for (key, prop) in props {
                    self.schema_at(prop, &format!("{}.{}", at, key))?;
                }
                if let Some(required) = obj.get("required") {
                    let required = required.as_array().ok_or_else(|| {
                        Error::validation(format!("{}: \"required\" must be an array", at))
                    })?;
                    for r in required {
                        match r.as_str() {
                            Some(k) if props.contains_key(k) => {}
                            _ => {
                                return Err(Error::validation(format!(
                                    "{}: required entry {} is not a declared property",
                                    at, r
                                )))
                            }
                        }
                    }
                }
                Ok(())
            }
            "array" => {
                let items = obj.get("items").ok_or_else(|| {
                    Error::validation(format!("{}: array schema requires \"items\"", at))
                })?;
                self.schema_at(items, &format!("{}[]", at))
            }
            "string" => {
                if let Some(values) = obj.get("enum") {
                    let ok = values
                        .as_array()
                        .map(|a| !a.is_empty() && a.iter().all(Value::is_string))
                        .unwrap_or(false);
                    if !ok {
                        return Err(Error::validation(format!(
                            "{}: string enum must be a non-empty array of strings",
                            at
                        )));
                    }
                }
                Ok(())
            }
            "number" | "integer" | "boolean" => Ok(()),
            other if Modality::from_schema_type(other).is_some() => Ok(()),
            other => Err(Error::validation(format!(
                "{}: unsupported type {:?}",
                at, other
            ))),
        }
    }

    fn is_expression(value: &Value) -> bool {
        value
            .as_object()
            .map(|o| o.len() == 1 && EXPRESSION_KEYS.iter().any(|k| o.contains_key(*k)))
            .unwrap_or(false)
    }

    fn require_expression(&self, field: &str, value: Option<&Value>) -> Result<()> {
        let value =
            value.ok_or_else(|| Error::structural(format!("{} not set", field)))?;
        if !Self::is_expression(value) {
            return Err(Error::validation(format!(
                "{} must be a $starlark or $jmespath expression",
                field
            )));
        }
        self.validate_expression(value)
    }

    fn optional_expression(&self, field: &str, value: Option<&Value>) -> Result<()> {
        match value {
            Some(v) => self
                .validate_expression(v)
                .map_err(|e| Error::validation(format!("{}: {}", field, e))),
            None => Ok(()),
        }
    }

    fn contains_array(schema: &Value) -> bool {
        if let Some(options) = schema.get("anyOf").and_then(|v| v.as_array()) {
            return options.iter().any(Self::contains_array);
        }
        match schema.get("type").and_then(|v| v.as_str()) {
            Some("array") => true,
            Some("object") => schema
                .get("properties")
                .and_then(|v| v.as_object())
                .map(|props| props.values().any(Self::contains_array))
                .unwrap_or(false),
            _ => false,
        }
    }

    fn vector_fields(
        &self,
        input_schema: Option<&Value>,
        output_length: Option<&Value>,
        input_split: Option<&Value>,
        input_merge: Option<&Value>,
    ) -> Result<()> {
        let input_schema =
            input_schema.ok_or_else(|| Error::structural("FunctionInputSchema not set"))?;
        if !Self::contains_array(input_schema) {
            return Err(Error::structural(
                "a vector function's input_schema must contain an array of items to rank",
            ));
        }
        let output_length =
            output_length.ok_or_else(|| Error::structural("FunctionOutputLength not set"))?;
        if !Self::is_expression(output_length) && output_length.as_u64().is_none() {
            return Err(Error::validation(
                "output_length must be a non-negative integer or an expression",
            ));
        }
        self.validate_expression(output_length)?;
        self.require_expression("input_split", input_split)?;
        self.require_expression("input_merge", input_merge)
    }
}

impl QualityChecker for StructuralChecker {
    fn validate_input_schema(&self, schema: &Value) -> Result<()> {
        self.schema_at(schema, "input_schema")
    }

    fn validate_expression(&self, expr: &Value) -> Result<()> {
        if let Some(obj) = expr.as_object() {
            for key in EXPRESSION_KEYS {
                if let Some(source) = obj.get(key) {
                    if obj.len() != 1 {
                        return Err(Error::validation(format!(
                            "{} expression must not carry other keys",
                            key
                        )));
                    }
                    return match source.as_str() {
                        Some(s) if !s.trim().is_empty() => Ok(()),
                        _ => Err(Error::validation(format!(
                            "{} expression must be a non-empty string",
                            key
                        ))),
                    };
                }
            }
            if let Some(key) = obj.keys().find(|k| k.starts_with('$')) {
                return Err(Error::validation(format!(
                    "unknown expression kind {:?}",
                    key
                )));
            }
        }
        Ok(())
    }

    fn validate_task(&self, variant: Variant, task: &Task) -> Result<()> {
        let allowed = match variant {
            Variant::LeafScalar | Variant::LeafVector => {
                matches!(task, Task::VectorCompletion(_))
            }
            Variant::BranchScalar => matches!(task, Task::PlaceholderScalar(_) | Task::Scalar(_)),
            Variant::BranchVector => !matches!(task, Task::VectorCompletion(_)),
        };
        if !allowed {
            return Err(Error::validation(format!(
                "{} tasks are not allowed in a {}",
                task.kind(),
                variant.as_str()
            )));
        }

        // Only vector branches map scalar sub-functions over input_maps
        let mapped = task.map().is_some();
        let must_map = variant == Variant::BranchVector
            && matches!(task, Task::PlaceholderScalar(_) | Task::Scalar(_));
        if mapped != must_map {
            return Err(Error::validation(if must_map {
                format!("{} tasks in a {} must be mapped", task.kind(), variant.as_str())
            } else {
                format!("{} tasks in a {} must not be mapped", task.kind(), variant.as_str())
            }));
        }

        self.optional_expression("skip", task.skip())?;
        self.optional_expression("input", task.input())?;
        self.optional_expression("output", task.output())?;

        match task {
            Task::VectorCompletion(t) => {
                let messages = t.messages.as_array().map(Vec::len).unwrap_or(0);
                if messages == 0 && !Self::is_expression(&t.messages) {
                    return Err(Error::validation("messages must be a non-empty array"));
                }
                let responses = t.responses.as_array().map(Vec::len).unwrap_or(0);
                if responses < 2 && !Self::is_expression(&t.responses) {
                    return Err(Error::validation("responses must hold at least 2 entries"));
                }
                Ok(())
            }
            Task::PlaceholderScalar(p) => self.schema_at(&p.input_schema, "input_schema"),
            Task::PlaceholderVector(p) => {
                self.schema_at(&p.input_schema, "input_schema")?;
                self.vector_fields(
                    Some(&p.input_schema),
                    p.output_length.as_ref(),
                    p.input_split.as_ref(),
                    p.input_merge.as_ref(),
                )
            }
            Task::Scalar(r) | Task::Vector(r) => {
                if r.owner.is_empty() || r.repository.is_empty() || r.commit.is_empty() {
                    return Err(Error::validation(
                        "owner, repository and commit must all be set",
                    ));
                }
                Ok(())
            }
        }
    }

    fn check_fields(&self, variant: Variant, doc: &FunctionDocument) -> Result<()> {
        let input_schema = doc
            .input_schema
            .as_ref()
            .ok_or_else(|| Error::structural("FunctionInputSchema not set"))?;
        self.validate_input_schema(input_schema)?;
        if variant.is_vector() {
            self.vector_fields(
                Some(input_schema),
                doc.output_length.as_ref(),
                doc.input_split.as_ref(),
                doc.input_merge.as_ref(),
            )?;
        }
        Ok(())
    }

    fn check_function(&self, variant: Variant, doc: &FunctionDocument) -> Result<()> {
        if doc.function_type != variant.function_type() {
            return Err(Error::structural(format!(
                "document type {} does not match {}",
                doc.function_type,
                variant.as_str()
            )));
        }
        self.check_fields(variant, doc)?;
        if doc.tasks.is_empty() {
            return Err(Error::structural("function has no tasks"));
        }
        for (i, task) in doc.tasks.iter().enumerate() {
            self.validate_task(variant, task)
                .map_err(|e| Error::validation(format!("tasks[{}]: {}", i, e)))?;
        }

        let input_maps = doc.input_maps.as_deref().unwrap_or_default();
        let mut seen = vec![false; input_maps.len()];
        for (i, task) in doc.tasks.iter().enumerate() {
            if let Some(map) = task.map() {
                match seen.get_mut(map) {
                    Some(slot) if !*slot => *slot = true,
                    Some(_) => {
                        return Err(Error::structural(format!(
                            "tasks[{}]: input_maps[{}] is used by more than one task",
                            i, map
                        )))
                    }
                    None => {
                        return Err(Error::structural(format!(
                            "tasks[{}]: map index {} is out of range",
                            i, map
                        )))
                    }
                }
            }
        }
        if let Some(unused) = seen.iter().position(|s| !s) {
            return Err(Error::structural(format!(
                "input_maps[{}] is not used by any task",
                unused
            )));
        }
        for (i, map) in input_maps.iter().enumerate() {
            self.require_expression(&format!("input_maps[{}]", i), Some(map))?;
        }
        Ok(())
    }
}
