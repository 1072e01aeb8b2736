//! Staging directories
//!
//! One directory per function under `<state_dir>/<owner>/<name>`. Only the
//! allow-listed files are committed; `draft.json` holds the in-progress
//! document between steps and never leaves the machine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use inventor_core::{
    Error, FunctionBuilder, FunctionDocument, InventState, Parameters, PlaceholderTaskSpecs,
    QualityChecker, Result, TypePreset,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const PARAMETERS_FILE: &str = "parameters.json";
pub const FUNCTION_FILE: &str = "function.json";
pub const INVENT_SPEC_FILE: &str = "INVENT_SPEC.md";
pub const INVENT_ESSAY_FILE: &str = "INVENT_ESSAY.md";
pub const INVENT_ESSAY_TASKS_FILE: &str = "INVENT_ESSAY_TASKS.md";
pub const README_FILE: &str = "README.md";
pub const PLACEHOLDER_TASK_SPECS_FILE: &str = "placeholder_task_specs.json";
pub const PARENT_FILE: &str = "parent.txt";
pub const GITIGNORE_FILE: &str = ".gitignore";
pub const DRAFT_FILE: &str = "draft.json";

const COMMITTED_FILES: [&str; 9] = [
    GITIGNORE_FILE,
    PARAMETERS_FILE,
    FUNCTION_FILE,
    INVENT_SPEC_FILE,
    INVENT_ESSAY_FILE,
    INVENT_ESSAY_TASKS_FILE,
    README_FILE,
    PLACEHOLDER_TASK_SPECS_FILE,
    PARENT_FILE,
];

pub fn gitignore() -> String {
    let mut out = String::from("# Ignore everything\n*\n\n# Allow specific files\n");
    for name in COMMITTED_FILES {
        out.push('!');
        out.push_str(name);
        out.push('\n');
    }
    out
}

/// The in-progress document, saved after every generation step.
#[derive(Debug, Serialize, Deserialize)]
struct Draft {
    document: FunctionDocument,
    #[serde(default)]
    placeholder_task_specs: PlaceholderTaskSpecs,
}

/// Everything a staging directory holds, each file optional.
#[derive(Debug, Default)]
pub struct Staged {
    pub name: String,
    pub parameters: Option<Parameters>,
    pub invent_spec: Option<String>,
    pub invent_essay: Option<String>,
    pub invent_essay_tasks: Option<String>,
    pub readme: Option<String>,
    pub document: Option<FunctionDocument>,
    pub placeholder_task_specs: Option<PlaceholderTaskSpecs>,
    pub draft: Option<(FunctionDocument, PlaceholderTaskSpecs)>,
    pub parent_token: Option<String>,
}

pub struct StagingStore {
    owner_dir: PathBuf,
    tokens: DashMap<String, PathBuf>,
}

impl StagingStore {
    pub fn new(state_dir: impl AsRef<Path>, owner: &str) -> Self {
        Self {
            owner_dir: state_dir.as_ref().join(owner),
            tokens: DashMap::new(),
        }
    }

    pub fn owner_dir(&self) -> &Path {
        &self.owner_dir
    }

    pub fn dir(&self, name: &str) -> PathBuf {
        self.owner_dir.join(name)
    }

    pub fn name_of(dir: &Path) -> Result<String> {
        dir.file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Internal(format!("no name in {}", dir.display())))
    }

    /// Create the directory for `name`, failing if it already exists.
    pub async fn create(&self, name: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.owner_dir).await?;
        let dir = self.dir(name);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => Ok(dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::name_conflict(
                name,
                "a function with this name already exists locally",
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a directory created by `create` that nothing was written to.
    pub async fn discard(&self, name: &str) {
        if let Err(e) = tokio::fs::remove_dir(self.dir(name)).await {
            debug!(name, error = %e, "staging directory not discarded");
        }
    }

    pub async fn write_initial(
        &self,
        dir: &Path,
        parameters: &Parameters,
        invent_spec: &str,
        parent_token: Option<&str>,
    ) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        write_text(dir, GITIGNORE_FILE, &gitignore()).await?;
        write_json(dir, PARAMETERS_FILE, parameters).await?;
        write_text(dir, INVENT_SPEC_FILE, invent_spec).await?;
        if let Some(token) = parent_token {
            write_text(dir, PARENT_FILE, token).await?;
            self.tokens.insert(token.to_string(), dir.to_path_buf());
        }
        Ok(())
    }

    /// Save whatever the state holds so far.
    pub async fn checkpoint(&self, dir: &Path, state: &InventState) -> Result<()> {
        self.write_texts(dir, state).await?;
        if let Ok(builder) = state.builder() {
            let draft = Draft {
                document: builder.document().clone(),
                placeholder_task_specs: builder.placeholder_specs().clone(),
            };
            write_json(dir, DRAFT_FILE, &draft).await?;
        }
        Ok(())
    }

    /// Write the finished function and drop the draft.
    pub async fn write_final(&self, dir: &Path, state: &InventState) -> Result<()> {
        self.write_texts(dir, state).await?;
        write_json(dir, PARAMETERS_FILE, state.parameters()).await?;
        let builder = state.builder()?;
        write_json(dir, FUNCTION_FILE, builder.document()).await?;
        if builder.variant().is_branch() {
            write_json(dir, PLACEHOLDER_TASK_SPECS_FILE, builder.placeholder_specs()).await?;
        }
        match tokio::fs::remove_file(dir.join(DRAFT_FILE)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_texts(&self, dir: &Path, state: &InventState) -> Result<()> {
        write_text(dir, INVENT_SPEC_FILE, state.invent_spec()).await?;
        if let Ok(essay) = state.invent_essay() {
            write_text(dir, INVENT_ESSAY_FILE, essay).await?;
        }
        if let Ok(tasks) = state.invent_essay_tasks() {
            write_text(dir, INVENT_ESSAY_TASKS_FILE, tasks).await?;
        }
        if let Ok(readme) = state.readme() {
            write_text(dir, README_FILE, readme).await?;
        }
        Ok(())
    }

    pub async fn write_function(&self, dir: &Path, document: &FunctionDocument) -> Result<()> {
        write_json(dir, FUNCTION_FILE, document).await
    }

    pub async fn write_readme(&self, dir: &Path, readme: &str) -> Result<()> {
        write_text(dir, README_FILE, readme).await
    }

    /// The staging directory whose `parent.txt` holds `token`.
    pub async fn find_by_token(&self, token: &str) -> Result<Option<PathBuf>> {
        if let Some(dir) = self.tokens.get(token) {
            return Ok(Some(dir.clone()));
        }

        let mut entries = match tokio::fs::read_dir(&self.owner_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let dir = entry.path();
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(found) = read_text(&dir, PARENT_FILE).await? {
                self.tokens.insert(found.clone(), dir.clone());
                if found == token {
                    return Ok(Some(dir));
                }
            }
        }
        Ok(None)
    }

    pub async fn load(&self, dir: &Path) -> Result<Staged> {
        let draft = read_json::<Draft>(dir, DRAFT_FILE)
            .await?
            .map(|d| (d.document, d.placeholder_task_specs));
        Ok(Staged {
            name: Self::name_of(dir)?,
            parameters: read_json(dir, PARAMETERS_FILE).await?,
            invent_spec: read_text(dir, INVENT_SPEC_FILE).await?,
            invent_essay: read_text(dir, INVENT_ESSAY_FILE).await?,
            invent_essay_tasks: read_text(dir, INVENT_ESSAY_TASKS_FILE).await?,
            readme: read_text(dir, README_FILE).await?,
            document: read_json(dir, FUNCTION_FILE).await?,
            placeholder_task_specs: read_json(dir, PLACEHOLDER_TASK_SPECS_FILE).await?,
            draft,
            parent_token: read_text(dir, PARENT_FILE).await?,
        })
    }

    /// Rebuild invention state from a directory left by an earlier run.
    /// `invent_spec` and `parameters` from the caller win over the files.
    pub async fn restore_state(
        &self,
        dir: &Path,
        invent_spec: Option<&str>,
        parameters: Option<Parameters>,
        preset: Option<TypePreset>,
        checker: Arc<dyn QualityChecker>,
    ) -> Result<InventState> {
        let staged = self.load(dir).await?;
        let parameters = parameters
            .or(staged.parameters)
            .ok_or_else(|| Error::structural(format!("{} missing in {}", PARAMETERS_FILE, dir.display())))?;
        let invent_spec = invent_spec
            .map(str::to_string)
            .or(staged.invent_spec)
            .ok_or_else(|| {
                Error::structural(format!(
                    "Function at {} cannot be resumed without an InventSpec",
                    dir.display()
                ))
            })?;

        let mut state = InventState::new(parameters, invent_spec, preset, checker.clone())?;
        state.set_name(&staged.name)?;
        if let Some(essay) = staged.invent_essay {
            state.set_invent_essay(essay)?;
        }
        if let Some(tasks) = staged.invent_essay_tasks {
            state.set_invent_essay_tasks(tasks)?;
        }
        if let Some(readme) = staged.readme {
            state.set_readme(readme)?;
        }
        if let Some((document, specs)) = staged.draft {
            match FunctionBuilder::restore(&parameters, document, specs, checker) {
                Ok(builder) => state.restore_builder(builder),
                Err(e) => warn!(dir = %dir.display(), error = %e, "ignoring unusable draft"),
            }
        }
        Ok(state)
    }
}

async fn write_text(dir: &Path, file: &str, content: &str) -> Result<()> {
    tokio::fs::write(dir.join(file), content).await?;
    Ok(())
}

async fn write_json<T: Serialize>(dir: &Path, file: &str, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    write_text(dir, file, &text).await
}

/// Trimmed file contents; missing or blank files read as `None`.
async fn read_text(dir: &Path, file: &str) -> Result<Option<String>> {
    match tokio::fs::read_to_string(dir.join(file)).await {
        Ok(content) => {
            let content = content.trim();
            Ok((!content.is_empty()).then(|| content.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Unparseable JSON reads as `None`, like a missing file.
async fn read_json<T: for<'de> Deserialize<'de>>(dir: &Path, file: &str) -> Result<Option<T>> {
    let Some(text) = read_text(dir, file).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&text) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(file, dir = %dir.display(), error = %e, "unreadable staging file");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gitignore_allows_exactly_the_committed_files() {
        let text = gitignore();
        let allowed: Vec<&str> = text
            .lines()
            .filter_map(|l| l.strip_prefix('!'))
            .collect();
        assert_eq!(allowed.len(), COMMITTED_FILES.len());
        assert!(allowed.contains(&"placeholder_task_specs.json"));
        assert!(!allowed.contains(&DRAFT_FILE));
        assert!(text.contains("\n*\n"));
    }
}
