//! Step catalogue
//!
//! Each step names the tools the agent may use, the prompt it starts from
//! and the predicate that decides when the step is done. Prompts depend on
//! the builder variant and the task-count range for the function's depth.

use inventor_core::{InventState, Variant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    Type,
    Name,
    Essay,
    Fields,
    EssayTasks,
    Body,
    Description,
}

/// Bootstrap steps, run before anything is written to disk.
pub const BOOTSTRAP: [StepKind; 2] = [StepKind::Type, StepKind::Name];

/// Generation steps, each checkpointed.
pub const GENERATION: [StepKind; 5] = [
    StepKind::Essay,
    StepKind::Fields,
    StepKind::EssayTasks,
    StepKind::Body,
    StepKind::Description,
];

const CONTEXT_TOOLS: [&str; 3] = ["ReadInventSpec", "ReadFunctionType", "ReadName"];

const VECTOR_FIELD_READS: [&str; 3] = [
    "ReadFunctionOutputLength",
    "ReadFunctionInputSplit",
    "ReadFunctionInputMerge",
];

const VECTOR_FIELD_WRITES: [&str; 3] = [
    "WriteFunctionOutputLength",
    "WriteFunctionInputSplit",
    "WriteFunctionInputMerge",
];

const FINISHING: &str = "## Finishing\n\n\
    1. Call CheckFunction and fix every error it reports until it passes.\n\
    2. Re-read the InventSpec. It is the source of truth and must never be contradicted.";

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Name => "name",
            Self::Essay => "essay",
            Self::Fields => "fields",
            Self::EssayTasks => "essay_tasks",
            Self::Body => "body",
            Self::Description => "description",
        }
    }

    /// Tool names offered during this step.
    pub fn tools(&self, variant: Option<Variant>) -> Vec<&'static str> {
        let vector = variant.map_or(false, |v| v.is_vector());
        let branch = variant.map_or(false, |v| v.is_branch());
        let mut tools: Vec<&'static str> = Vec::new();

        match self {
            Self::Type => tools.extend(["ReadInventSpec", "WriteFunctionType"]),
            Self::Name => tools.extend(["ReadInventSpec", "ReadFunctionType", "WriteName"]),
            Self::Essay => {
                tools.extend(CONTEXT_TOOLS);
                tools.push("WriteInventEssay");
            }
            Self::Fields => {
                tools.extend(CONTEXT_TOOLS);
                tools.extend([
                    "ReadInventEssay",
                    "ReadFunctionInputSchema",
                    "WriteFunctionInputSchema",
                ]);
                if vector {
                    tools.extend(VECTOR_FIELD_READS);
                    tools.extend(VECTOR_FIELD_WRITES);
                }
                tools.push("CheckFields");
            }
            Self::EssayTasks => {
                tools.extend(CONTEXT_TOOLS);
                tools.extend(["ReadInventEssay", "WriteInventEssayTasks"]);
            }
            Self::Body => {
                tools.extend(CONTEXT_TOOLS);
                tools.extend(["ReadInventEssay", "ReadFunctionInputSchema"]);
                if vector {
                    tools.extend(VECTOR_FIELD_READS);
                }
                tools.push("ReadInventEssayTasks");
                match variant {
                    Some(Variant::BranchVector) => tools.extend([
                        "AppendVectorTask",
                        "AppendScalarTask",
                        "EditVectorTask",
                        "EditScalarTask",
                    ]),
                    _ => tools.extend(["AppendTask", "EditTask"]),
                }
                tools.push("DeleteTask");
                if branch {
                    tools.push("EditTaskSpec");
                }
                tools.extend(["CheckFunction", "ReadTasksLength", "ReadTask"]);
                if branch {
                    tools.push("ReadTaskSpec");
                }
            }
            Self::Description => {
                tools.extend(CONTEXT_TOOLS);
                tools.extend([
                    "ReadInventEssay",
                    "ReadFunctionInputSchema",
                    "ReadInventEssayTasks",
                    "ReadTasksLength",
                    "ReadTask",
                ]);
                if branch {
                    tools.push("ReadTaskSpec");
                }
                tools.extend(["WriteDescription", "WriteReadme"]);
            }
        }
        tools
    }

    /// Whether the state already satisfies this step.
    pub fn check(&self, state: &InventState) -> Result<(), String> {
        let result = match self {
            Self::Type => state.function_type().map(drop),
            Self::Name => state.name().map(drop),
            Self::Essay => state.invent_essay().map(drop),
            Self::Fields => state.builder().and_then(|b| b.check_fields()).map(drop),
            Self::EssayTasks => state.invent_essay_tasks().map(drop),
            Self::Body => state.builder().and_then(|b| b.check_function()).map(drop),
            Self::Description => return check_description(state),
        };
        result.map_err(|e| e.to_string())
    }

    pub fn prompt(&self, state: &InventState) -> String {
        let parameters = state.parameters();
        let count = parameters.width().describe();
        let variant = state.builder().ok().map(|b| b.variant());
        let kind = match variant.map(|v| v.is_vector()) {
            Some(true) => "Vector Function",
            _ => "Scalar Function",
        };

        match self {
            Self::Type => "You are inventing a new scoring Function. A \"vector.function\" ranks \
                several input items against one another; a \"scalar.function\" scores a single \
                input. Read the InventSpec, decide which kind of input it expects and write the \
                FunctionType."
                .to_string(),
            Self::Name => "Choose a name for your Function, the way you would name a function in \
                code: lowercase words separated by single dashes, without \"function\" in it. If \
                the name is taken, pick another."
                .to_string(),
            Self::Essay => {
                let focus = if variant.map_or(false, |v| v.is_vector()) {
                    "the qualities and values that decide how items rank relative to one another"
                } else {
                    "the qualities and values that must be evaluated for the input"
                };
                format!(
                    "Write a non-technical essay about the {kind} you are building. Cover its \
                     purpose, its input and its use-cases in detail, then explore {focus}. There \
                     should be {count} qualities or values. The essay sets the philosophy every \
                     later step follows."
                )
            }
            Self::Fields => {
                if variant.map_or(false, |v| v.is_vector()) {
                    format!(
                        "Create the InputSchema for your {kind}, consistent with the InventSpec \
                         and your essay. Then write three expressions over `input`:\n\
                         - OutputLength: the number of items being ranked.\n\
                         - InputSplit: an array of inputs that are each valid on their own, one \
                         per rankable item (an array input becomes an array of 1-length arrays).\n\
                         - InputMerge: given an array of such inputs, recombine them into the \
                         original input shape.\n\
                         Call CheckFields before finishing."
                    )
                } else {
                    format!(
                        "Create the InputSchema for your {kind}, consistent with the InventSpec \
                         and your essay. Call CheckFields before finishing."
                    )
                }
            }
            Self::EssayTasks => format!(
                "Write EssayTasks: list and describe, in plain language, the tasks the Function \
                 must perform to carry out the evaluations in your essay. Each one becomes an \
                 entry of the `tasks` array. There should be {count} tasks."
            ),
            Self::Body => body_prompt(variant, &count, parameters.depth),
            Self::Description => description_prompt(state),
        }
    }
}

fn body_prompt(variant: Option<Variant>, count: &str, depth: u32) -> String {
    let spec_guidance = if depth > 1 {
        "- Write a detailed `spec` for each task first: it is the brief for the agent that will \
         invent the sub-function. That sub-function will have sub-functions of its own, so \
         include anything that must be passed further down.\n"
    } else {
        "- Write a detailed `spec` for each task first: it is the brief for the agent that will \
         invent the sub-function.\n"
    };

    match variant {
        Some(Variant::BranchVector) => format!(
            "Create the Tasks for your Vector Function.\n\n\
             ## Task Structure\n\n\
             Create {count} placeholder tasks from your EssayTasks. Each one becomes a \
             sub-function that is invented automatically once you finish. Two kinds can be mixed:\n\
             - Unmapped vector tasks (`placeholder.vector.function`) rank the items they are \
             given. Use AppendVectorTask.\n\
             - Mapped scalar tasks (`placeholder.scalar.function` with `map`) score each item \
             produced by an InputMap expression. Use AppendScalarTask. At most half of the \
             tasks may be mapped.\n\n\
             {spec_guidance}\
             - Vector tasks need their own input_schema, output_length, input_split and \
             input_merge.\n\
             - `skip` conditionally skips a task, `input` derives the task input from the parent \
             input, `output` turns the sub-function result into a valid parent output.\n\n\
             {FINISHING}"
        ),
        Some(Variant::BranchScalar) => format!(
            "Create the Tasks for your Scalar Function.\n\n\
             ## Task Structure\n\n\
             Create {count} placeholder tasks from your EssayTasks. Each one becomes a \
             sub-function that is invented automatically once you finish. A task may take the \
             whole parent input or only the part it evaluates.\n\n\
             {spec_guidance}\
             - `skip` conditionally skips a task, `input` derives the task input from the parent \
             input, `output` turns the sub-function result into a valid parent output.\n\n\
             {FINISHING}"
        ),
        Some(Variant::LeafVector) => format!(
            "Create the Tasks for your Vector Function.\n\n\
             ## Task Structure\n\n\
             Create {count} vector completion tasks from your EssayTasks. Each task is a prompt \
             (`messages`) and a set of candidate replies (`responses`); the probability of each \
             reply is what ranks the items.\n\n\
             - Make the items being ranked the responses themselves. Never put them in the \
             messages and never ask the model which item is best.\n\
             - Every task must rank the items in the same order.\n\
             - Vary the tasks: different context, different subsets, multiple messages.\n\
             - `output` turns the completion scores into a valid parent output.\n\n\
             {FINISHING}"
        ),
        _ => format!(
            "Create the Tasks for your Scalar Function.\n\n\
             ## Task Structure\n\n\
             Create {count} vector completion tasks from your EssayTasks. Each task is a prompt \
             (`messages`) built from the input and a fixed set of candidate replies \
             (`responses`), each reply standing for a score.\n\n\
             - Never ask the model for a score directly; make the replies things an assistant \
             would really say.\n\
             - A uniform reply distribution must yield a final score of 0.5.\n\
             - Vary the tasks: different context, different subsets, multiple messages.\n\
             - `output` folds the completion scores into a single score in [0, 1].\n\n\
             {FINISHING}"
        ),
    }
}

fn description_prompt(state: &InventState) -> String {
    let mut prompt = String::from(
        "First write a one-paragraph description of the Function you invented. Then write a \
         thorough README covering its input, its output, its use-cases and everything it \
         evaluates.",
    );
    let indices = placeholder_indices(state);
    if !indices.is_empty() {
        prompt.push_str(
            "\n\nThe README must link every sub-function using exactly these templates:\n",
        );
        for i in &indices {
            prompt.push_str(&format!("https://github.com/{{{{ .Owner }}}}/{{{{ .Task{} }}}}\n", i));
        }
        prompt.push_str(
            "They are replaced with the real repositories once the sub-functions exist. \
             {{ .Owner }} and {{ .TaskN }} may be used anywhere else in the README as well.",
        );
    }
    prompt
}

fn placeholder_indices(state: &InventState) -> Vec<usize> {
    match state.builder() {
        Ok(b) if b.variant().is_branch() => b.document().placeholder_indices(),
        _ => Vec::new(),
    }
}

fn check_description(state: &InventState) -> Result<(), String> {
    state.description().map_err(|e| e.to_string())?;
    let readme = state.readme().map_err(|e| e.to_string())?;
    let missing: Vec<String> = placeholder_indices(state)
        .into_iter()
        .map(|i| format!("{{{{ .Task{} }}}}", i))
        .filter(|template| !readme.contains(template.as_str()))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("README must reference {}", missing.join(", ")))
    }
}
