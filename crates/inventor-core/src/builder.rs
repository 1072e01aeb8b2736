//! Function builder
//!
//! One builder covers all four variants. The variant decides which fields
//! exist, which task kinds may be appended and whether the placeholder spec
//! sidecar is maintained. Every mutation validates first and leaves the
//! document untouched on failure. Success values are the short confirmations
//! returned to the agent.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::function::{
    Expression, FunctionDocument, FunctionType, PlaceholderTaskSpec, PlaceholderTaskSpecs, Task,
    Variant,
};
use crate::modality::removed_modalities;
use crate::parameters::{Parameters, WidthRange};
use crate::quality::QualityChecker;

/// Fields a parent hands down when it already knows the child's shape.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldPreset {
    pub input_schema: Option<Value>,
    pub output_length: Option<Expression>,
    pub input_split: Option<Expression>,
    pub input_merge: Option<Expression>,
}

pub struct FunctionBuilder {
    variant: Variant,
    width: WidthRange,
    document: FunctionDocument,
    specs: PlaceholderTaskSpecs,
    modality_removal_rejected: bool,
    checker: Arc<dyn QualityChecker>,
}

impl std::fmt::Debug for FunctionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionBuilder")
            .field("variant", &self.variant)
            .field("tasks", &self.document.tasks.len())
            .finish()
    }
}

impl FunctionBuilder {
    pub fn new(
        parameters: &Parameters,
        function_type: FunctionType,
        checker: Arc<dyn QualityChecker>,
    ) -> Self {
        Self {
            variant: Variant::new(parameters.is_branch(), function_type),
            width: parameters.width(),
            document: FunctionDocument::new(function_type),
            specs: Vec::new(),
            modality_removal_rejected: false,
            checker,
        }
    }

    pub fn with_preset(
        parameters: &Parameters,
        function_type: FunctionType,
        preset: FieldPreset,
        checker: Arc<dyn QualityChecker>,
    ) -> Self {
        let mut builder = Self::new(parameters, function_type, checker);
        builder.document.input_schema = preset.input_schema;
        if function_type.is_vector() {
            builder.document.output_length = preset.output_length;
            builder.document.input_split = preset.input_split;
            builder.document.input_merge = preset.input_merge;
        }
        builder
    }

    /// Rebuild from a persisted document and sidecar.
    pub fn restore(
        parameters: &Parameters,
        document: FunctionDocument,
        specs: PlaceholderTaskSpecs,
        checker: Arc<dyn QualityChecker>,
    ) -> Result<Self> {
        let variant = Variant::new(parameters.is_branch(), document.function_type);
        let specs = if variant.is_branch() {
            if specs.len() > document.tasks.len() {
                return Err(Error::structural(format!(
                    "placeholder_task_specs has {} entries for {} tasks",
                    specs.len(),
                    document.tasks.len()
                )));
            }
            let mut specs = specs;
            specs.resize(document.tasks.len(), None);
            specs
        } else {
            Vec::new()
        };
        Ok(Self {
            variant,
            width: parameters.width(),
            document,
            specs,
            modality_removal_rejected: false,
            checker,
        })
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn function_type(&self) -> FunctionType {
        self.variant.function_type()
    }

    pub fn document(&self) -> &FunctionDocument {
        &self.document
    }

    pub fn placeholder_specs(&self) -> &PlaceholderTaskSpecs {
        &self.specs
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    pub fn input_schema(&self) -> Result<&Value> {
        self.document
            .input_schema
            .as_ref()
            .ok_or_else(|| Error::structural("FunctionInputSchema not set"))
    }

    /// Rejects the first edit that drops a rich-content modality and arms a
    /// one-shot guard. `dangerously_remove_modalities` is only honored while
    /// the guard is armed. Any accepted edit disarms it.
    pub fn set_input_schema(
        &mut self,
        value: Value,
        dangerously_remove_modalities: bool,
    ) -> Result<String> {
        self.checker
            .validate_input_schema(&value)
            .map_err(|e| Error::validation(format!("Invalid FunctionInputSchema: {}", e)))?;

        if dangerously_remove_modalities {
            if !self.modality_removal_rejected {
                return Err(Error::validation(
                    "dangerouslyRemoveModalities can only be used after a previous \
                     WriteFunctionInputSchema call was rejected for removing modalities.",
                ));
            }
            self.modality_removal_rejected = false;
            self.document.input_schema = Some(value);
            return Ok("FunctionInputSchema updated".to_string());
        }

        if let Some(current) = &self.document.input_schema {
            let removed = removed_modalities(current, &value);
            if !removed.is_empty() {
                self.modality_removal_rejected = true;
                let names: Vec<&str> = removed.iter().map(|m| m.as_str()).collect();
                debug!(removed = ?names, "input schema edit would remove modalities");
                return Err(Error::validation(format!(
                    "This edit would remove multimodal types: {}. \
                     Re-read the InventSpec and confirm this does not contradict it. \
                     If the spec allows removing these modalities, call WriteFunctionInputSchema \
                     again with dangerouslyRemoveModalities: true.",
                    names.join(", ")
                )));
            }
        }

        self.modality_removal_rejected = false;
        self.document.input_schema = Some(value);
        Ok("FunctionInputSchema updated".to_string())
    }

    pub fn modality_guard_armed(&self) -> bool {
        self.modality_removal_rejected
    }

    fn require_vector(&self, field: &str) -> Result<()> {
        if self.variant.is_vector() {
            Ok(())
        } else {
            Err(Error::structural(format!(
                "{} only exists on vector functions",
                field
            )))
        }
    }

    pub fn output_length(&self) -> Result<&Expression> {
        self.require_vector("FunctionOutputLength")?;
        self.document
            .output_length
            .as_ref()
            .ok_or_else(|| Error::structural("FunctionOutputLength not set"))
    }

    pub fn set_output_length(&mut self, value: Expression) -> Result<String> {
        self.require_vector("FunctionOutputLength")?;
        self.checker
            .validate_expression(&value)
            .map_err(|e| Error::validation(format!("Invalid FunctionOutputLength: {}", e)))?;
        self.document.output_length = Some(value);
        Ok("FunctionOutputLength updated".to_string())
    }

    pub fn input_split(&self) -> Result<&Expression> {
        self.require_vector("FunctionInputSplit")?;
        self.document
            .input_split
            .as_ref()
            .ok_or_else(|| Error::structural("FunctionInputSplit not set"))
    }

    pub fn set_input_split(&mut self, value: Expression) -> Result<String> {
        self.require_vector("FunctionInputSplit")?;
        self.checker
            .validate_expression(&value)
            .map_err(|e| Error::validation(format!("Invalid FunctionInputSplit: {}", e)))?;
        self.document.input_split = Some(value);
        Ok("FunctionInputSplit updated".to_string())
    }

    pub fn input_merge(&self) -> Result<&Expression> {
        self.require_vector("FunctionInputMerge")?;
        self.document
            .input_merge
            .as_ref()
            .ok_or_else(|| Error::structural("FunctionInputMerge not set"))
    }

    pub fn set_input_merge(&mut self, value: Expression) -> Result<String> {
        self.require_vector("FunctionInputMerge")?;
        self.checker
            .validate_expression(&value)
            .map_err(|e| Error::validation(format!("Invalid FunctionInputMerge: {}", e)))?;
        self.document.input_merge = Some(value);
        Ok("FunctionInputMerge updated".to_string())
    }

    pub fn description(&self) -> Option<&str> {
        self.document.description.as_deref()
    }

    pub fn set_description(&mut self, description: String) {
        self.document.description = Some(description);
    }

    pub fn check_fields(&self) -> Result<String> {
        self.input_schema()?;
        if self.variant.is_vector() {
            self.output_length()?;
            self.input_split()?;
            self.input_merge()?;
        }
        self.checker
            .check_fields(self.variant, &self.document)
            .map_err(|e| Error::validation(format!("Invalid Fields: {}", e)))?;
        Ok("Fields are valid".to_string())
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    pub fn tasks_len(&self) -> usize {
        self.document.tasks.len()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.document.tasks.len() {
            Ok(())
        } else {
            Err(Error::validation("Invalid index"))
        }
    }

    /// The task as JSON, with its input map when mapped.
    pub fn read_task(&self, index: usize) -> Result<String> {
        self.check_index(index)?;
        let task = &self.document.tasks[index];
        let input_map = task
            .map()
            .and_then(|m| self.document.input_maps.as_ref().and_then(|maps| maps.get(m)));
        let value = match input_map {
            Some(input_map) => json!({ "task": task, "input_map": input_map }),
            None => json!({ "task": task }),
        };
        Ok(serde_json::to_string_pretty(&value)?)
    }

    pub fn read_task_spec(&self, index: usize) -> Result<String> {
        self.require_branch()?;
        match self.specs.get(index) {
            Some(Some(entry)) if !entry.spec.trim().is_empty() => Ok(entry.spec.clone()),
            _ => Err(Error::validation("Invalid index")),
        }
    }

    fn require_branch(&self) -> Result<()> {
        if self.variant.is_branch() {
            Ok(())
        } else {
            Err(Error::structural("task specs only exist on branch functions"))
        }
    }

    /// Parse an agent-supplied task, filling in `type` when omitted.
    fn parse_task(&self, mut value: Value, kind: &str, label: &str) -> Result<Task> {
        if let Some(obj) = value.as_object_mut() {
            obj.entry("type").or_insert_with(|| Value::String(kind.to_string()));
        }
        let task: Task = serde_json::from_value(value)
            .map_err(|e| Error::validation(format!("Invalid {}: {}", label, e)))?;
        if task.kind() != kind {
            return Err(Error::validation(format!(
                "Invalid {}: expected type {:?}, got {:?}",
                label,
                kind,
                task.kind()
            )));
        }
        Ok(task)
    }

    fn validate(&self, task: &Task, label: &str) -> Result<()> {
        self.checker
            .validate_task(self.variant, task)
            .map_err(|e| Error::validation(format!("Invalid {}: {}", label, e)))
    }

    fn require_spec(spec: &str) -> Result<()> {
        if spec.trim().is_empty() {
            Err(Error::validation("Spec cannot be empty"))
        } else {
            Ok(())
        }
    }

    fn new_length(&self) -> String {
        format!("New length: {}", self.document.tasks.len())
    }

    /// Leaf variants: append a completion task.
    pub fn append_task(&mut self, value: Value) -> Result<String> {
        if self.variant.is_branch() {
            return Err(Error::structural(
                "branch functions append placeholder tasks with a spec",
            ));
        }
        let label = "CompletionTask";
        let mut task = self.parse_task(value, "vector.completion", label)?;
        task.set_map(None);
        self.validate(&task, label)?;
        self.document.tasks.push(task);
        Ok(self.new_length())
    }

    fn unmapped_placeholder_kind(&self) -> (&'static str, &'static str) {
        if self.variant.is_vector() {
            ("placeholder.vector.function", "PlaceholderVectorTask")
        } else {
            ("placeholder.scalar.function", "PlaceholderScalarTask")
        }
    }

    /// Branch variants: append an unmapped placeholder of the function's own
    /// type, minting a fresh correlation token.
    pub fn append_placeholder_task(&mut self, value: Value, spec: &str) -> Result<String> {
        self.require_branch()?;
        let (kind, label) = self.unmapped_placeholder_kind();
        let mut task = self.parse_task(value, kind, label)?;
        task.set_map(None);
        self.validate(&task, label)?;
        Self::require_spec(spec)?;
        self.document.tasks.push(task);
        self.specs.push(Some(PlaceholderTaskSpec::new(spec)));
        Ok(self.new_length())
    }

    /// Vector branches: append a scalar placeholder mapped over a new
    /// `input_maps` entry. Any agent-supplied `map` is replaced.
    pub fn append_mapped_task(
        &mut self,
        value: Value,
        input_map: Expression,
        spec: &str,
    ) -> Result<String> {
        if self.variant != Variant::BranchVector {
            return Err(Error::structural(
                "mapped tasks only exist on branch vector functions",
            ));
        }
        let label = "MappedScalarTask";
        let mut task = self.parse_task(value, "placeholder.scalar.function", label)?;
        let next_map = self.document.input_maps.as_ref().map(Vec::len).unwrap_or(0);
        task.set_map(Some(next_map));
        self.validate(&task, label)?;
        Self::require_spec(spec)?;
        self.checker
            .validate_expression(&input_map)
            .map_err(|e| Error::validation(format!("Invalid InputMap Expression: {}", e)))?;

        self.document.tasks.push(task);
        self.specs.push(Some(PlaceholderTaskSpec::new(spec)));
        self.document
            .input_maps
            .get_or_insert_with(Vec::new)
            .push(input_map);
        Ok(self.new_length())
    }

    /// Replace an unmapped task in place. Placeholder tokens are kept.
    pub fn edit_task(&mut self, index: usize, value: Value) -> Result<String> {
        self.check_index(index)?;
        let (kind, label) = if self.variant.is_branch() {
            self.unmapped_placeholder_kind()
        } else {
            ("vector.completion", "CompletionTask")
        };
        if self.document.tasks[index].map().is_some() {
            return Err(Error::validation("Existing task is not UnmappedVector"));
        }
        let mut task = self.parse_task(value, kind, label)?;
        task.set_map(None);
        self.validate(&task, label)?;
        self.document.tasks[index] = task;
        Ok(if self.variant.is_branch() {
            "Task updated. If the task spec should change, edit it as well.".to_string()
        } else {
            "Task updated.".to_string()
        })
    }

    /// Replace a mapped task and its input map. The map index is kept.
    pub fn edit_mapped_task(
        &mut self,
        index: usize,
        value: Value,
        input_map: Expression,
    ) -> Result<String> {
        if self.variant != Variant::BranchVector {
            return Err(Error::structural(
                "mapped tasks only exist on branch vector functions",
            ));
        }
        self.check_index(index)?;
        let map = self.document.tasks[index]
            .map()
            .ok_or_else(|| Error::validation("Existing task is not MappedScalar"))?;
        let label = "MappedScalarTask";
        let mut task = self.parse_task(value, "placeholder.scalar.function", label)?;
        task.set_map(Some(map));
        self.validate(&task, label)?;
        self.checker
            .validate_expression(&input_map)
            .map_err(|e| Error::validation(format!("Invalid InputMap Expression: {}", e)))?;

        let slot = self
            .document
            .input_maps
            .as_mut()
            .and_then(|maps| maps.get_mut(map))
            .ok_or_else(|| Error::Internal(format!("input_maps[{}] missing", map)))?;
        *slot = input_map;
        self.document.tasks[index] = task;
        Ok("Task updated. If the task spec should change, edit it as well.".to_string())
    }

    /// Rewrite the brief of a placeholder. Its correlation token is kept.
    pub fn edit_task_spec(&mut self, index: usize, spec: &str) -> Result<String> {
        self.require_branch()?;
        self.check_index(index)?;
        Self::require_spec(spec)?;
        match self.specs.get_mut(index) {
            Some(Some(entry)) => entry.spec = spec.to_string(),
            Some(slot @ None) => *slot = Some(PlaceholderTaskSpec::new(spec)),
            None => return Err(Error::validation("Invalid index")),
        }
        Ok("Task spec updated. If the task should change, edit it as well.".to_string())
    }

    /// Remove a task and its sidecar entry. A mapped task also takes its
    /// `input_maps` entry with it, and every later map index shifts down.
    pub fn delete_task(&mut self, index: usize) -> Result<String> {
        self.check_index(index)?;
        if let Some(map) = self.document.tasks[index].map() {
            for task in self.document.tasks.iter_mut() {
                if let Some(m) = task.map() {
                    if m > map {
                        task.set_map(Some(m - 1));
                    }
                }
            }
            if let Some(maps) = self.document.input_maps.as_mut() {
                if map < maps.len() {
                    maps.remove(map);
                }
            }
        }
        self.document.tasks.remove(index);
        if index < self.specs.len() {
            self.specs.remove(index);
        }
        Ok(self.new_length())
    }

    /// Validate the whole document: task count, mapped share, sidecar
    /// alignment and the quality checker.
    pub fn check_function(&self) -> Result<String> {
        let n = self.document.tasks.len();
        if !self.width.contains(n) {
            return Err(Error::structural(format!(
                "Invalid Function: expected {} tasks, found {}",
                self.width.describe(),
                n
            )));
        }
        if self.variant == Variant::BranchVector && self.document.mapped_task_count() * 2 > n {
            return Err(Error::structural(
                "Invalid Function: at most 50% of tasks can be mapped scalar tasks",
            ));
        }
        if self.variant.is_branch() {
            for i in self.document.placeholder_indices() {
                if !matches!(self.specs.get(i), Some(Some(_))) {
                    return Err(Error::structural(format!(
                        "Invalid Function: placeholder task {} has no spec",
                        i
                    )));
                }
            }
        }

        // Description is written in a later step
        let mut candidate = self.document.clone();
        if candidate.description.as_deref().map_or(true, |d| d.trim().is_empty()) {
            candidate.description = Some("description".to_string());
        }
        self.checker
            .check_function(self.variant, &candidate)
            .map_err(|e| Error::validation(format!("Invalid Function: {}", e)))?;
        Ok("Function is valid".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterOverrides;
    use crate::quality::StructuralChecker;

    fn branch_vector() -> FunctionBuilder {
        let params = ParameterOverrides {
            depth: Some(1),
            ..Default::default()
        }
        .resolve();
        FunctionBuilder::new(&params, FunctionType::Vector, Arc::new(StructuralChecker::new()))
    }

    #[test]
    fn scalar_fields_are_not_vector_fields() {
        let params = Parameters::default();
        let b = FunctionBuilder::new(&params, FunctionType::Scalar, Arc::new(StructuralChecker));
        assert!(b.output_length().is_err());
        assert_eq!(b.variant(), Variant::LeafScalar);
    }

    #[test]
    fn edit_task_spec_keeps_token() {
        let mut b = branch_vector();
        b.append_mapped_task(
            json!({"input_schema": {"type": "string"}}),
            json!({"$starlark": "input['items']"}),
            "score one item",
        )
        .unwrap();
        let token = b.placeholder_specs()[0].as_ref().unwrap().token.clone();
        b.edit_task_spec(0, "score one item carefully").unwrap();
        let entry = b.placeholder_specs()[0].as_ref().unwrap();
        assert_eq!(entry.token, token);
        assert_eq!(entry.spec, "score one item carefully");
    }
}
