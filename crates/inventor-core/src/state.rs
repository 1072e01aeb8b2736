//! Per-function invention state
//!
//! Everything the agent reads and writes while one function is invented.
//! The builder exists only once the function type is known.

use std::sync::Arc;

use crate::builder::{FieldPreset, FunctionBuilder};
use crate::error::{Error, Result};
use crate::function::FunctionType;
use crate::name::validate_name;
use crate::parameters::Parameters;
use crate::quality::QualityChecker;

/// Type and fields fixed by a parent's placeholder task.
#[derive(Clone, Debug, PartialEq)]
pub struct TypePreset {
    pub function_type: FunctionType,
    pub fields: FieldPreset,
}

pub struct InventState {
    parameters: Parameters,
    invent_spec: String,
    name: Option<String>,
    invent_essay: Option<String>,
    invent_essay_tasks: Option<String>,
    readme: Option<String>,
    builder: Option<FunctionBuilder>,
    checker: Arc<dyn QualityChecker>,
}

fn non_empty(field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        Err(Error::validation(format!("{} cannot be empty", field)))
    } else {
        Ok(value)
    }
}

fn not_set(field: &str) -> Error {
    Error::structural(format!("{} not set", field))
}

impl InventState {
    pub fn new(
        parameters: Parameters,
        invent_spec: impl Into<String>,
        preset: Option<TypePreset>,
        checker: Arc<dyn QualityChecker>,
    ) -> Result<Self> {
        let invent_spec = non_empty("InventSpec", invent_spec.into())?;
        let builder = preset.map(|p| {
            FunctionBuilder::with_preset(&parameters, p.function_type, p.fields, checker.clone())
        });
        Ok(Self {
            parameters,
            invent_spec,
            name: None,
            invent_essay: None,
            invent_essay_tasks: None,
            readme: None,
            builder,
            checker,
        })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn invent_spec(&self) -> &str {
        &self.invent_spec
    }

    pub fn name(&self) -> Result<&str> {
        self.name.as_deref().ok_or_else(|| not_set("Name"))
    }

    /// Shape check only; availability is the caller's concern.
    pub fn set_name(&mut self, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        validate_name(&value)?;
        self.name = Some(value);
        Ok(())
    }

    pub fn invent_essay(&self) -> Result<&str> {
        self.invent_essay
            .as_deref()
            .ok_or_else(|| not_set("InventEssay"))
    }

    pub fn set_invent_essay(&mut self, value: impl Into<String>) -> Result<()> {
        self.invent_essay = Some(non_empty("InventEssay", value.into())?);
        Ok(())
    }

    pub fn invent_essay_tasks(&self) -> Result<&str> {
        self.invent_essay_tasks
            .as_deref()
            .ok_or_else(|| not_set("InventEssayTasks"))
    }

    pub fn set_invent_essay_tasks(&mut self, value: impl Into<String>) -> Result<()> {
        self.invent_essay_tasks = Some(non_empty("InventEssayTasks", value.into())?);
        Ok(())
    }

    pub fn readme(&self) -> Result<&str> {
        self.readme.as_deref().ok_or_else(|| not_set("Readme"))
    }

    pub fn set_readme(&mut self, value: impl Into<String>) -> Result<()> {
        self.readme = Some(non_empty("Readme", value.into())?);
        Ok(())
    }

    pub fn description(&self) -> Result<&str> {
        self.builder
            .as_ref()
            .and_then(|b| b.description())
            .ok_or_else(|| not_set("Description"))
    }

    pub fn set_description(&mut self, value: impl Into<String>) -> Result<()> {
        let value = non_empty("Description", value.into())?;
        self.builder_mut()?.set_description(value);
        Ok(())
    }

    pub fn function_type(&self) -> Result<FunctionType> {
        self.builder
            .as_ref()
            .map(|b| b.function_type())
            .ok_or_else(|| not_set("FunctionType"))
    }

    /// Choosing a type starts a fresh builder for this depth class.
    pub fn set_function_type(&mut self, function_type: FunctionType) -> Result<String> {
        self.builder = Some(FunctionBuilder::new(
            &self.parameters,
            function_type,
            self.checker.clone(),
        ));
        Ok("FunctionType set".to_string())
    }

    pub fn builder(&self) -> Result<&FunctionBuilder> {
        self.builder.as_ref().ok_or_else(|| not_set("FunctionType"))
    }

    pub fn builder_mut(&mut self) -> Result<&mut FunctionBuilder> {
        self.builder.as_mut().ok_or_else(|| not_set("FunctionType"))
    }

    /// Install a builder rebuilt from a staging directory.
    pub fn restore_builder(&mut self, builder: FunctionBuilder) {
        self.builder = Some(builder);
    }

    pub fn checker(&self) -> Arc<dyn QualityChecker> {
        self.checker.clone()
    }
}
