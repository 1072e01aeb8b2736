//! Function document model

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// An expression is either a literal JSON value or an object of the form
/// `{"$starlark": "..."}` / `{"$jmespath": "..."}`. The expression language
/// itself is not evaluated here.
pub type Expression = Value;

/// Scalar functions score one input, vector functions rank items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionType {
    #[serde(rename = "scalar.function")]
    Scalar,
    #[serde(rename = "vector.function")]
    Vector,
}

impl FunctionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar.function",
            Self::Vector => "vector.function",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "scalar.function" => Ok(Self::Scalar),
            "vector.function" => Ok(Self::Vector),
            other => Err(Error::validation(format!(
                "Invalid FunctionType: expected \"scalar.function\" or \"vector.function\", got {:?}",
                other
            ))),
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector)
    }
}

impl std::fmt::Display for FunctionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Depth class × function type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variant {
    LeafScalar,
    LeafVector,
    BranchScalar,
    BranchVector,
}

impl Variant {
    pub fn new(branch: bool, ty: FunctionType) -> Self {
        match (branch, ty) {
            (false, FunctionType::Scalar) => Self::LeafScalar,
            (false, FunctionType::Vector) => Self::LeafVector,
            (true, FunctionType::Scalar) => Self::BranchScalar,
            (true, FunctionType::Vector) => Self::BranchVector,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Self::BranchScalar | Self::BranchVector)
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Self::LeafVector | Self::BranchVector)
    }

    pub fn function_type(&self) -> FunctionType {
        if self.is_vector() {
            FunctionType::Vector
        } else {
            FunctionType::Scalar
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeafScalar => "leaf.scalar.function",
            Self::LeafVector => "leaf.vector.function",
            Self::BranchScalar => "branch.scalar.function",
            Self::BranchVector => "branch.vector.function",
        }
    }
}

/// The persisted `function.json`. Field order is the on-disk order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDocument {
    #[serde(rename = "type")]
    pub function_type: FunctionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_maps: Option<Vec<Expression>>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_length: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_split: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_merge: Option<Expression>,
}

impl FunctionDocument {
    pub fn new(function_type: FunctionType) -> Self {
        Self {
            function_type,
            description: None,
            input_schema: None,
            input_maps: None,
            tasks: Vec::new(),
            output_length: None,
            input_split: None,
            input_merge: None,
        }
    }

    pub fn placeholder_indices(&self) -> Vec<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_placeholder())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn has_placeholders(&self) -> bool {
        self.tasks.iter().any(Task::is_placeholder)
    }

    /// Concrete sub-function references held by this document.
    pub fn remote_children(&self) -> Vec<ArtifactRef> {
        self.tasks.iter().filter_map(Task::reference).collect()
    }

    pub fn mapped_task_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.map().is_some()).count()
    }
}

/// A leaf task: one prompt scored against a fixed set of responses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<usize>,
    pub messages: Expression,
    pub responses: Expression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Expression>,
}

/// A sub-function that has not been invented yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Expression>,
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_length: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_split: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_merge: Option<Expression>,
}

/// A reference to a finalized, pushed sub-function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteTask {
    pub owner: String,
    pub repository: String,
    pub commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Expression>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Task {
    #[serde(rename = "vector.completion")]
    VectorCompletion(CompletionTask),
    #[serde(rename = "placeholder.scalar.function")]
    PlaceholderScalar(PlaceholderTask),
    #[serde(rename = "placeholder.vector.function")]
    PlaceholderVector(PlaceholderTask),
    #[serde(rename = "scalar.function")]
    Scalar(RemoteTask),
    #[serde(rename = "vector.function")]
    Vector(RemoteTask),
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VectorCompletion(_) => "vector.completion",
            Self::PlaceholderScalar(_) => "placeholder.scalar.function",
            Self::PlaceholderVector(_) => "placeholder.vector.function",
            Self::Scalar(_) => "scalar.function",
            Self::Vector(_) => "vector.function",
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::PlaceholderScalar(_) | Self::PlaceholderVector(_))
    }

    pub fn map(&self) -> Option<usize> {
        match self {
            Self::VectorCompletion(t) => t.map,
            Self::PlaceholderScalar(t) | Self::PlaceholderVector(t) => t.map,
            Self::Scalar(t) | Self::Vector(t) => t.map,
        }
    }

    pub fn set_map(&mut self, map: Option<usize>) {
        match self {
            Self::VectorCompletion(t) => t.map = map,
            Self::PlaceholderScalar(t) | Self::PlaceholderVector(t) => t.map = map,
            Self::Scalar(t) | Self::Vector(t) => t.map = map,
        }
    }

    pub fn skip(&self) -> Option<&Expression> {
        match self {
            Self::VectorCompletion(t) => t.skip.as_ref(),
            Self::PlaceholderScalar(t) | Self::PlaceholderVector(t) => t.skip.as_ref(),
            Self::Scalar(t) | Self::Vector(t) => t.skip.as_ref(),
        }
    }

    pub fn input(&self) -> Option<&Expression> {
        match self {
            Self::VectorCompletion(_) => None,
            Self::PlaceholderScalar(t) | Self::PlaceholderVector(t) => t.input.as_ref(),
            Self::Scalar(t) | Self::Vector(t) => t.input.as_ref(),
        }
    }

    pub fn output(&self) -> Option<&Expression> {
        match self {
            Self::VectorCompletion(t) => t.output.as_ref(),
            Self::PlaceholderScalar(t) | Self::PlaceholderVector(t) => t.output.as_ref(),
            Self::Scalar(t) | Self::Vector(t) => t.output.as_ref(),
        }
    }

    pub fn reference(&self) -> Option<ArtifactRef> {
        match self {
            Self::Scalar(t) | Self::Vector(t) => Some(ArtifactRef {
                owner: t.owner.clone(),
                repository: t.repository.clone(),
                commit: t.commit.clone(),
            }),
            _ => None,
        }
    }

    /// Rewrite a placeholder into a concrete reference, keeping its
    /// skip/map/input/output expressions. Other kinds return `None`.
    pub fn resolve(&self, artifact: &ArtifactRef) -> Option<Task> {
        let (placeholder, vector) = match self {
            Self::PlaceholderScalar(p) => (p, false),
            Self::PlaceholderVector(p) => (p, true),
            _ => return None,
        };
        let remote = RemoteTask {
            owner: artifact.owner.clone(),
            repository: artifact.repository.clone(),
            commit: artifact.commit.clone(),
            skip: placeholder.skip.clone(),
            map: placeholder.map,
            input: placeholder.input.clone(),
            output: placeholder.output.clone(),
        };
        Some(if vector {
            Self::Vector(remote)
        } else {
            Self::Scalar(remote)
        })
    }
}

/// Creative brief for a placeholder plus the token its child carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderTaskSpec {
    pub spec: String,
    pub token: String,
}

impl PlaceholderTaskSpec {
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            token: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Index-aligned with `tasks`; `None` marks a non-placeholder task.
pub type PlaceholderTaskSpecs = Vec<Option<PlaceholderTaskSpec>>;

/// Identity of an immutable, pushed document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub owner: String,
    pub repository: String,
    pub commit: String,
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repository, self.commit)
    }
}
