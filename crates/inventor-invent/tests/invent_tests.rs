//! Tests for inventor-invent: the pipeline end to end against in-memory
//! version control, host and agent fakes, plus the staging store

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use inventor_agent::{Agent, AgentError, AgentEvent, Continuation};
use inventor_core::{
    ArtifactRef, Error, FunctionDocument, FunctionType, InventState, NotificationMessage,
    ParameterOverrides, Parameters, PlaceholderTaskSpec, ProgressLog, StructuralChecker, Task,
};
use inventor_invent::staging::{gitignore, DRAFT_FILE, GITIGNORE_FILE};
use inventor_invent::*;
use inventor_tools::ToolRegistry;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const OWNER: &str = "acme";

// ===========================================================================
// Fakes
// ===========================================================================

/// Commits are snapshots of the committed files; dirty means the files on
/// disk differ from the last snapshot. A push delivers the current snapshot
/// number, unless its attempt number is listed in `failing_pushes`.
#[derive(Default)]
struct FakeVcs {
    commits: Mutex<Vec<(String, String)>>,
    snapshots: Mutex<HashMap<PathBuf, (usize, BTreeMap<String, String>)>>,
    pushed: Mutex<HashMap<PathBuf, usize>>,
    failing_pushes: Mutex<HashSet<usize>>,
    pushes: AtomicUsize,
}

impl FakeVcs {
    fn snapshot(dir: &Path) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let name = entry.file_name().to_string_lossy().to_string();
            if name == DRAFT_FILE || !entry.file_type().unwrap().is_file() {
                continue;
            }
            files.insert(name, std::fs::read_to_string(entry.path()).unwrap());
        }
        files
    }

    fn fail_push(&self, attempt: usize) {
        self.failing_pushes.lock().unwrap().insert(attempt);
    }

    fn pushed_head(&self, dir: &Path) -> Option<String> {
        self.pushed
            .lock()
            .unwrap()
            .get(dir)
            .map(|n| format!("{}-{}", repo_of(dir), n))
    }

    fn messages(&self, repo: &str) -> Vec<String> {
        self.commits
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == repo)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

fn repo_of(dir: &Path) -> String {
    dir.file_name().unwrap().to_string_lossy().to_string()
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn init(&self, _dir: &Path) -> inventor_core::Result<()> {
        Ok(())
    }

    async fn stage_all(&self, _dir: &Path) -> inventor_core::Result<()> {
        Ok(())
    }

    async fn commit(
        &self,
        dir: &Path,
        message: &str,
        _author: &GitAuthor,
    ) -> inventor_core::Result<()> {
        let files = Self::snapshot(dir);
        let mut snapshots = self.snapshots.lock().unwrap();
        let entry = snapshots.entry(dir.to_path_buf()).or_default();
        entry.0 += 1;
        entry.1 = files;
        self.commits
            .lock()
            .unwrap()
            .push((repo_of(dir), message.to_string()));
        Ok(())
    }

    async fn is_dirty(&self, dir: &Path) -> inventor_core::Result<bool> {
        let files = Self::snapshot(dir);
        let snapshots = self.snapshots.lock().unwrap();
        Ok(snapshots.get(dir).map_or(true, |(_, committed)| *committed != files))
    }

    async fn head_commit(&self, dir: &Path) -> inventor_core::Result<Option<String>> {
        let snapshots = self.snapshots.lock().unwrap();
        Ok(snapshots
            .get(dir)
            .map(|(n, _)| format!("{}-{}", repo_of(dir), n)))
    }

    async fn set_remote(&self, _dir: &Path, _url: &str) -> inventor_core::Result<()> {
        Ok(())
    }

    async fn push(&self, dir: &Path) -> inventor_core::Result<()> {
        let attempt = self.pushes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_pushes.lock().unwrap().contains(&attempt) {
            return Err(Error::vcs("network down"));
        }
        let head = self.snapshots.lock().unwrap().get(dir).map(|(n, _)| *n);
        if let Some(head) = head {
            self.pushed.lock().unwrap().insert(dir.to_path_buf(), head);
        }
        Ok(())
    }

    async fn has_unpushed(&self, dir: &Path) -> inventor_core::Result<bool> {
        let head = self.snapshots.lock().unwrap().get(dir).map(|(n, _)| *n);
        let pushed = self.pushed.lock().unwrap().get(dir).copied();
        Ok(head.is_some() && head != pushed)
    }

    async fn remove_metadata(&self, dir: &Path) -> inventor_core::Result<()> {
        self.snapshots.lock().unwrap().remove(dir);
        self.pushed.lock().unwrap().remove(dir);
        Ok(())
    }
}

/// Serves pushed functions straight from the staging root. Commit lookups
/// for the repository named in `flaky_repo` fail.
struct FakeHost {
    owner_dir: PathBuf,
    taken: HashSet<String>,
    offline: AtomicBool,
    flaky_repo: Mutex<Option<String>>,
    created: Mutex<Vec<String>>,
    descriptions: Mutex<HashMap<String, String>>,
}

impl FakeHost {
    fn new(state_dir: &Path) -> Self {
        Self {
            owner_dir: state_dir.join(OWNER),
            taken: HashSet::new(),
            offline: AtomicBool::new(false),
            flaky_repo: Mutex::new(None),
            created: Mutex::new(Vec::new()),
            descriptions: Mutex::new(HashMap::new()),
        }
    }

    fn taking(mut self, name: &str) -> Self {
        self.taken.insert(name.to_string());
        self
    }
}

#[async_trait]
impl Host for FakeHost {
    async fn authenticated_owner(&self) -> inventor_core::Result<String> {
        Ok(OWNER.to_string())
    }

    async fn name_available(&self, _owner: &str, name: &str) -> inventor_core::Result<bool> {
        Ok(!self.taken.contains(name))
    }

    async fn create_repository(
        &self,
        name: &str,
        _description: Option<&str>,
    ) -> inventor_core::Result<String> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::host("repository creation refused"));
        }
        self.created.lock().unwrap().push(name.to_string());
        Ok(format!("https://example.invalid/{}/{}.git", OWNER, name))
    }

    async fn update_description(
        &self,
        _owner: &str,
        name: &str,
        description: &str,
    ) -> inventor_core::Result<()> {
        self.descriptions
            .lock()
            .unwrap()
            .insert(name.to_string(), description.to_string());
        Ok(())
    }

    async fn fetch_functions(
        &self,
        refs: &[ArtifactRef],
    ) -> inventor_core::Result<Option<Vec<FunctionDocument>>> {
        let mut docs = Vec::new();
        for r in refs {
            let path = self.owner_dir.join(&r.repository).join("function.json");
            match std::fs::read_to_string(path) {
                Ok(text) => docs.push(serde_json::from_str(&text)?),
                Err(_) => return Ok(None),
            }
        }
        Ok(Some(docs))
    }

    async fn commit_exists(
        &self,
        _owner: &str,
        name: &str,
        _commit: &str,
    ) -> inventor_core::Result<bool> {
        if self.flaky_repo.lock().unwrap().as_deref() == Some(name) {
            return Err(Error::host("502 bad gateway"));
        }
        Ok(true)
    }
}

/// Plays every step through the tools it is given. The name is the brief
/// in kebab case; children get "<brief> part <i>" briefs.
struct Autopilot {
    branch_tasks: usize,
    leaf_tasks: usize,
    fail_on: Option<&'static str>,
    calls: AtomicUsize,
}

impl Autopilot {
    fn new(branch_tasks: usize, leaf_tasks: usize) -> Self {
        Self {
            branch_tasks,
            leaf_tasks,
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_on(mut self, marker: &'static str) -> Self {
        self.fail_on = Some(marker);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn slug(spec: &str) -> String {
    spec.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn completion_task(n: usize) -> Value {
    json!({
        "messages": [{"role": "user", "content": format!("Is this funny? ({})", n)}],
        "responses": ["very", "not at all"],
        "output": {"$starlark": "output['scores'][0]"}
    })
}

#[async_trait]
impl Agent for Autopilot {
    async fn invoke(
        &self,
        _prompt: &str,
        tools: Arc<ToolRegistry>,
        continuation: Option<Continuation>,
        events: mpsc::Sender<AgentEvent>,
        _cancel: CancellationToken,
    ) -> Result<Continuation, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let spec = tools
            .execute("ReadInventSpec", json!({}))
            .await
            .to_content_string();
        let _ = events.send(AgentEvent::Text(format!("on it: {}", spec))).await;

        if tools.contains("WriteFunctionType") {
            tools
                .execute("WriteFunctionType", json!({"functionType": "scalar.function"}))
                .await;
        }
        if tools.contains("WriteName") {
            tools.execute("WriteName", json!({"name": slug(&spec)})).await;
        }
        if tools.contains("WriteInventEssay") {
            if self.fail_on.map_or(false, |m| spec.contains(m)) {
                return Err(AgentError::Other(format!("gave up on {}", spec)));
            }
            tools
                .execute("WriteInventEssay", json!({"essay": "Humor is timing."}))
                .await;
        }
        if tools.contains("WriteFunctionInputSchema") {
            tools
                .execute("WriteFunctionInputSchema", json!({"value": {"type": "string"}}))
                .await;
        }
        if tools.contains("WriteInventEssayTasks") {
            tools
                .execute("WriteInventEssayTasks", json!({"essayTasks": "1. Judge the punchline."}))
                .await;
        }
        if tools.contains("CheckFunction") {
            if tools.contains("ReadTaskSpec") {
                for i in 0..self.branch_tasks {
                    let task = json!({"input_schema": {"type": "string"}, "output": {"$starlark": "output"}});
                    tools
                        .execute(
                            "AppendTask",
                            json!({"value": task, "spec": format!("{} part {}", spec, i)}),
                        )
                        .await;
                }
            } else {
                for i in 0..self.leaf_tasks {
                    tools
                        .execute("AppendTask", json!({"value": completion_task(i)}))
                        .await;
                }
            }
        }
        if tools.contains("WriteReadme") {
            tools
                .execute("WriteDescription", json!({"description": format!("Scores {}", spec)}))
                .await;
            let n: usize = tools
                .execute("ReadTasksLength", json!({}))
                .await
                .to_content_string()
                .parse()
                .unwrap_or(0);
            let mut readme = format!("# {}\n", slug(&spec));
            if tools.contains("ReadTaskSpec") {
                for i in 0..n {
                    readme.push_str(&format!(
                        "- https://github.com/{{{{ .Owner }}}}/{{{{ .Task{} }}}}\n",
                        i
                    ));
                }
            }
            tools.execute("WriteReadme", json!({"readme": readme})).await;
        }

        let _ = events
            .send(AgentEvent::Done {
                stop_reason: "end_turn".into(),
            })
            .await;
        Ok(continuation.unwrap_or_default())
    }
}

struct Harness {
    _tmp: tempfile::TempDir,
    state_dir: PathBuf,
    vcs: Arc<FakeVcs>,
    host: Arc<FakeHost>,
}

impl Harness {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let state_dir = tmp.path().to_path_buf();
        Self {
            vcs: Arc::new(FakeVcs::default()),
            host: Arc::new(FakeHost::new(&state_dir)),
            state_dir,
            _tmp: tmp,
        }
    }

    fn inventor(&self, agent: Arc<Autopilot>, max_retries: usize) -> Inventor {
        Inventor::new(
            agent,
            self.vcs.clone(),
            self.host.clone(),
            Arc::new(StructuralChecker::new()),
            InventorOptions {
                state_dir: self.state_dir.clone(),
                owner: OWNER.to_string(),
                author: GitAuthor {
                    name: "tester".into(),
                    email: "tester@example.com".into(),
                },
                max_retries,
                max_concurrency: 4,
            },
        )
    }

    fn dir(&self, name: &str) -> PathBuf {
        self.state_dir.join(OWNER).join(name)
    }

    fn function(&self, name: &str) -> FunctionDocument {
        let text = std::fs::read_to_string(self.dir(name).join("function.json")).unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

fn new_request(spec: &str, parameters: Parameters) -> InventRequest {
    InventRequest::New {
        invent_spec: spec.to_string(),
        parameters,
        preset: None,
    }
}

fn branch_parameters() -> Parameters {
    ParameterOverrides {
        depth: Some(1),
        branch_width: Some(3),
        leaf_width: Some(1),
        ..Default::default()
    }
    .resolve()
}

fn leaf_parameters() -> Parameters {
    ParameterOverrides {
        leaf_width: Some(5),
        ..Default::default()
    }
    .resolve()
}

// ===========================================================================
// Leaf pipeline
// ===========================================================================

#[tokio::test]
async fn leaf_scalar_end_to_end() {
    let h = Harness::new();
    let agent = Arc::new(Autopilot::new(0, 5));
    let log = Arc::new(ProgressLog::new());

    let invented = h
        .inventor(agent.clone(), 5)
        .invent(new_request("rate jokes", leaf_parameters()), log.clone())
        .await
        .unwrap();

    assert_eq!(invented.name, "rate-jokes");
    assert_eq!(invented.dir, h.dir("rate-jokes"));
    assert_eq!(agent.calls(), 7, "one invocation per step");

    let doc = h.function("rate-jokes");
    assert_eq!(doc.function_type, FunctionType::Scalar);
    assert_eq!(doc.tasks.len(), 5);
    assert_eq!(doc.description.as_deref(), Some("Scores rate jokes"));
    assert!(!h.dir("rate-jokes").join(DRAFT_FILE).exists());
    assert!(!h.dir("rate-jokes").join("placeholder_task_specs.json").exists());

    assert_eq!(
        h.vcs.messages("rate-jokes"),
        ["initial commit", "implement rate-jokes"]
    );
    assert_eq!(h.vcs.pushes.load(Ordering::SeqCst), 2);
    assert_eq!(
        h.host.descriptions.lock().unwrap().get("rate-jokes").map(String::as_str),
        Some("Scores rate jokes")
    );
    assert_eq!(*h.host.created.lock().unwrap(), ["rate-jokes"]);

    let tree = log.snapshot();
    assert_eq!(tree.name.as_deref(), Some("rate-jokes"));
    assert!(tree.done);
    assert_eq!(tree.error, None);
    assert!(tree.children.is_empty());
}

#[tokio::test]
async fn finished_function_reloads_unchanged() {
    let h = Harness::new();
    let agent = Arc::new(Autopilot::new(0, 5));
    let inventor = h.inventor(agent, 5);
    inventor
        .invent(new_request("rate jokes", leaf_parameters()), Arc::new(ProgressLog::new()))
        .await
        .unwrap();

    let quality = read_quality_function(
        inventor.store(),
        h.host.as_ref(),
        &StructuralChecker::new(),
        &h.dir("rate-jokes"),
    )
    .await
    .unwrap()
    .expect("complete function");
    assert_eq!(quality.document, h.function("rate-jokes"));
    assert_eq!(quality.parameters, leaf_parameters());
    assert!(quality.specs.is_empty());
}

#[tokio::test]
async fn resume_of_finished_function_skips_the_agent() {
    let h = Harness::new();
    h.inventor(Arc::new(Autopilot::new(0, 5)), 5)
        .invent(new_request("rate jokes", leaf_parameters()), Arc::new(ProgressLog::new()))
        .await
        .unwrap();

    let agent = Arc::new(Autopilot::new(0, 5));
    let log = Arc::new(ProgressLog::new());
    let invented = h
        .inventor(agent.clone(), 5)
        .invent(
            InventRequest::Resume {
                name: "rate-jokes".into(),
            },
            log.clone(),
        )
        .await
        .unwrap();

    assert_eq!(invented.name, "rate-jokes");
    assert_eq!(agent.calls(), 0);
    assert_eq!(h.vcs.messages("rate-jokes").len(), 2, "nothing new to commit");
    let events = log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message, NotificationMessage::Done { error: None });
    assert_eq!(events[0].name.as_deref(), Some("rate-jokes"));
}

#[tokio::test]
async fn resume_of_unknown_name_fails() {
    let h = Harness::new();
    let err = h
        .inventor(Arc::new(Autopilot::new(0, 5)), 5)
        .invent(
            InventRequest::Resume {
                name: "nothing-here".into(),
            },
            Arc::new(ProgressLog::new()),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Function directory not found for name: nothing-here"
    );
}

#[tokio::test]
async fn taken_name_exhausts_the_name_step() {
    let mut h = Harness::new();
    h.host = Arc::new(FakeHost::new(&h.state_dir).taking("rate-jokes"));
    let agent = Arc::new(Autopilot::new(0, 5));
    let log = Arc::new(ProgressLog::new());

    let err = h
        .inventor(agent.clone(), 1)
        .invent(new_request("rate jokes", leaf_parameters()), log.clone())
        .await
        .unwrap_err();

    match err {
        Error::StepExhausted { step, retries, .. } => {
            assert_eq!(step, "name");
            assert_eq!(retries, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(agent.calls(), 3, "type once, name twice");
    assert!(!h.dir("rate-jokes").exists(), "reservation released");
    assert!(log
        .events()
        .iter()
        .all(|e| !matches!(e.message, NotificationMessage::Done { .. })));
}

#[tokio::test]
async fn failed_first_push_is_retried_on_resume() {
    let h = Harness::new();
    h.host.offline.store(true, Ordering::SeqCst);
    let log = Arc::new(ProgressLog::new());

    let err = h
        .inventor(Arc::new(Autopilot::new(0, 5)), 5)
        .invent(new_request("rate jokes", leaf_parameters()), log.clone())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "host error: repository creation refused");
    assert_eq!(
        log.snapshot().error.as_deref(),
        Some("host error: repository creation refused")
    );
    assert!(h.dir("rate-jokes").join("INVENT_SPEC.md").exists());

    h.host.offline.store(false, Ordering::SeqCst);
    let agent = Arc::new(Autopilot::new(0, 5));
    h.inventor(agent.clone(), 5)
        .invent(
            InventRequest::Resume {
                name: "rate-jokes".into(),
            },
            Arc::new(ProgressLog::new()),
        )
        .await
        .unwrap();

    assert_eq!(agent.calls(), 5, "type and name are restored from disk");
    assert_eq!(*h.host.created.lock().unwrap(), ["rate-jokes"]);
    assert_eq!(
        h.vcs.messages("rate-jokes"),
        ["initial commit", "initial commit"],
        "the first attempt's commit was dropped with its metadata"
    );
    assert!(h.function("rate-jokes").tasks.len() == 5);
}

#[tokio::test]
async fn commit_stranded_by_a_failed_push_is_pushed_on_resume() {
    let h = Harness::new();
    h.vcs.fail_push(2);

    let err = h
        .inventor(Arc::new(Autopilot::new(0, 5)), 5)
        .invent(new_request("rate jokes", leaf_parameters()), Arc::new(ProgressLog::new()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "vcs error: network down");
    let dir = h.dir("rate-jokes");
    assert_eq!(h.vcs.pushed_head(&dir).as_deref(), Some("rate-jokes-1"));
    assert!(h.host.descriptions.lock().unwrap().get("rate-jokes").is_none());

    let agent = Arc::new(Autopilot::new(0, 5));
    let invented = h
        .inventor(agent.clone(), 5)
        .invent(
            InventRequest::Resume {
                name: "rate-jokes".into(),
            },
            Arc::new(ProgressLog::new()),
        )
        .await
        .unwrap();

    assert_eq!(invented.name, "rate-jokes");
    assert_eq!(agent.calls(), 0);
    assert_eq!(
        h.vcs.messages("rate-jokes"),
        ["initial commit", "implement rate-jokes"],
        "the stranded commit is pushed as is"
    );
    assert_eq!(h.vcs.pushed_head(&dir).as_deref(), Some("rate-jokes-2"));
    assert_eq!(h.vcs.pushes.load(Ordering::SeqCst), 3);
    assert_eq!(
        h.host.descriptions.lock().unwrap().get("rate-jokes").map(String::as_str),
        Some("Scores rate jokes")
    );
}

// ===========================================================================
// Fan-out
// ===========================================================================

#[tokio::test]
async fn one_failed_child_keeps_its_siblings() {
    let h = Harness::new();
    let agent = Arc::new(Autopilot::new(3, 1).failing_on("part 1"));
    let log = Arc::new(ProgressLog::new());

    let err = h
        .inventor(agent.clone(), 5)
        .invent(new_request("rate jokes", branch_parameters()), log.clone())
        .await
        .unwrap_err();

    match &err {
        Error::Agent(message) => assert_eq!(message, "gave up on rate jokes part 1"),
        other => panic!("expected the child's own error, got {other}"),
    }
    // root: 7 steps; children 0 and 2: name, essay, essay_tasks, body,
    // description; child 1: name, then the failing essay
    assert_eq!(agent.calls(), 19);

    let doc = h.function("rate-jokes");
    match (&doc.tasks[0], &doc.tasks[1], &doc.tasks[2]) {
        (Task::Scalar(first), Task::PlaceholderScalar(_), Task::Scalar(third)) => {
            assert_eq!(first.owner, OWNER);
            assert_eq!(first.repository, "rate-jokes-part-0");
            assert_eq!(first.commit, "rate-jokes-part-0-2");
            assert_eq!(first.output, Some(json!({"$starlark": "output"})));
            assert_eq!(third.repository, "rate-jokes-part-2");
        }
        other => panic!("unexpected tasks: {other:?}"),
    }
    assert_eq!(
        h.vcs.messages("rate-jokes"),
        ["initial commit", "implement rate-jokes", "update rate-jokes"]
    );

    let readme = std::fs::read_to_string(h.dir("rate-jokes").join("README.md")).unwrap();
    assert!(readme.contains("https://github.com/acme/rate-jokes-part-0"));
    assert!(readme.contains("https://github.com/acme/{{ .Task1 }}"));
    assert!(readme.contains("https://github.com/acme/rate-jokes-part-2"));

    let tree = log.snapshot();
    assert!(tree.done && tree.error.is_none());
    assert_eq!(tree.children.len(), 3);
    assert_eq!(tree.children[&0].name.as_deref(), Some("rate-jokes-part-0"));
    assert!(tree.children[&0].done && tree.children[&0].error.is_none());
    assert_eq!(
        tree.children[&1].error.as_deref(),
        Some("agent error: gave up on rate jokes part 1")
    );
    let specs: Vec<Option<PlaceholderTaskSpec>> = serde_json::from_str(
        &std::fs::read_to_string(h.dir("rate-jokes").join("placeholder_task_specs.json")).unwrap(),
    )
    .unwrap();
    let failed = specs[1].as_ref().unwrap();
    assert_eq!(failed.spec, "rate jokes part 1");
    assert_eq!(
        std::fs::read_to_string(h.dir("rate-jokes-part-1").join("parent.txt")).unwrap(),
        failed.token
    );

    // A restarted run only finishes the failed child.
    let agent = Arc::new(Autopilot::new(3, 1));
    let invented = h
        .inventor(agent.clone(), 5)
        .invent(
            InventRequest::Resume {
                name: "rate-jokes".into(),
            },
            Arc::new(ProgressLog::new()),
        )
        .await
        .unwrap();
    assert_eq!(invented.name, "rate-jokes");
    assert_eq!(agent.calls(), 4, "essay, essay_tasks, body, description");

    let doc = h.function("rate-jokes");
    assert!(!doc.has_placeholders());
    assert_eq!(doc.remote_children().len(), 3);
    assert_eq!(
        h.vcs.messages("rate-jokes-part-1"),
        ["initial commit", "implement rate-jokes-part-1"]
    );
    assert_eq!(h.vcs.messages("rate-jokes").len(), 4);
    let readme = std::fs::read_to_string(h.dir("rate-jokes").join("README.md")).unwrap();
    assert!(!readme.contains("{{"));
}

#[tokio::test]
async fn several_failed_children_aggregate() {
    let h = Harness::new();
    let agent = Arc::new(Autopilot::new(3, 1).failing_on("part"));

    let err = h
        .inventor(agent, 5)
        .invent(new_request("rate jokes", branch_parameters()), Arc::new(ProgressLog::new()))
        .await
        .unwrap_err();

    match err {
        Error::AggregateChild(errors) => assert_eq!(errors.len(), 3),
        other => panic!("expected an aggregate, got {other}"),
    }
    assert!(h.function("rate-jokes").tasks.iter().all(Task::is_placeholder));
    assert_eq!(
        h.vcs.messages("rate-jokes"),
        ["initial commit", "implement rate-jokes"],
        "nothing resolved, nothing re-committed"
    );
}

#[tokio::test]
async fn failed_child_lookup_keeps_the_other_resolutions() {
    let h = Harness::new();
    *h.host.flaky_repo.lock().unwrap() = Some("rate-jokes-part-2".into());
    let agent = Arc::new(Autopilot::new(3, 1));

    let err = h
        .inventor(agent.clone(), 5)
        .invent(new_request("rate jokes", branch_parameters()), Arc::new(ProgressLog::new()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "host error: 502 bad gateway");
    assert_eq!(agent.calls(), 22, "all three children finished");

    let doc = h.function("rate-jokes");
    assert!(matches!(
        (&doc.tasks[0], &doc.tasks[1], &doc.tasks[2]),
        (Task::Scalar(_), Task::Scalar(_), Task::PlaceholderScalar(_))
    ));
    assert_eq!(
        h.vcs.messages("rate-jokes"),
        ["initial commit", "implement rate-jokes", "update rate-jokes"]
    );
    let readme = std::fs::read_to_string(h.dir("rate-jokes").join("README.md")).unwrap();
    assert!(readme.contains("https://github.com/acme/rate-jokes-part-1"));
    assert!(readme.contains("https://github.com/acme/{{ .Task2 }}"));

    *h.host.flaky_repo.lock().unwrap() = None;
    let agent = Arc::new(Autopilot::new(3, 1));
    h.inventor(agent.clone(), 5)
        .invent(
            InventRequest::Resume {
                name: "rate-jokes".into(),
            },
            Arc::new(ProgressLog::new()),
        )
        .await
        .unwrap();

    assert_eq!(agent.calls(), 0);
    assert!(!h.function("rate-jokes").has_placeholders());
    assert_eq!(h.vcs.messages("rate-jokes").len(), 4);
}

#[tokio::test]
async fn two_levels_resolve_bottom_up() {
    let h = Harness::new();
    let agent = Arc::new(Autopilot::new(2, 1));
    let log = Arc::new(ProgressLog::new());
    let parameters = ParameterOverrides {
        depth: Some(2),
        branch_width: Some(2),
        leaf_width: Some(1),
        ..Default::default()
    }
    .resolve();

    h.inventor(agent.clone(), 5)
        .invent(new_request("rate jokes", parameters), log.clone())
        .await
        .unwrap();

    // root: 7 steps; two branch children and four leaves: 5 steps each
    assert_eq!(agent.calls(), 37);

    let child_params: Parameters = serde_json::from_str(
        &std::fs::read_to_string(h.dir("rate-jokes-part-0").join("parameters.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(child_params.depth, 1);
    let grandchild_params: Parameters = serde_json::from_str(
        &std::fs::read_to_string(h.dir("rate-jokes-part-0-part-1").join("parameters.json"))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(grandchild_params.depth, 0);

    let child = h.function("rate-jokes-part-0");
    assert!(!child.has_placeholders());
    match &child.tasks[1] {
        Task::Scalar(task) => assert_eq!(task.repository, "rate-jokes-part-0-part-1"),
        other => panic!("unexpected task: {other:?}"),
    }
    assert_eq!(
        h.vcs.messages("rate-jokes-part-0"),
        [
            "initial commit",
            "implement rate-jokes-part-0",
            "update rate-jokes-part-0"
        ]
    );

    // The root links each child at the commit that spliced its grandchildren.
    let root = h.function("rate-jokes");
    match (&root.tasks[0], &root.tasks[1]) {
        (Task::Scalar(first), Task::Scalar(second)) => {
            assert_eq!(first.repository, "rate-jokes-part-0");
            assert_eq!(first.commit, "rate-jokes-part-0-3");
            assert_eq!(second.commit, "rate-jokes-part-1-3");
        }
        other => panic!("unexpected tasks: {other:?}"),
    }

    assert!(log.events().iter().any(|e| e.path == vec![1, 0]));
    let tree = log.snapshot();
    let grandchild = &tree.children[&0].children[&1];
    assert_eq!(grandchild.name.as_deref(), Some("rate-jokes-part-0-part-1"));
    assert!(grandchild.done && grandchild.error.is_none());
    assert!(tree.done && tree.error.is_none());
}

// ===========================================================================
// Staging store
// ===========================================================================

#[tokio::test]
async fn staging_layout_and_token_lookup() {
    let tmp = tempfile::tempdir().unwrap();
    let store = StagingStore::new(tmp.path(), OWNER);
    let params = Parameters::default();

    let dir = store.create("tone-score").await.unwrap();
    store
        .write_initial(&dir, &params, "Score the tone", Some("token-1"))
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.join(GITIGNORE_FILE)).unwrap(),
        gitignore()
    );
    assert_eq!(
        std::fs::read_to_string(dir.join("parent.txt")).unwrap(),
        "token-1"
    );
    assert!(matches!(
        store.create("tone-score").await,
        Err(Error::NameConflict { .. })
    ));

    assert_eq!(store.find_by_token("token-1").await.unwrap(), Some(dir.clone()));

    // A fresh store has no index and falls back to scanning.
    let cold = StagingStore::new(tmp.path(), OWNER);
    assert_eq!(cold.find_by_token("token-1").await.unwrap(), Some(dir));
    assert_eq!(cold.find_by_token("token-2").await.unwrap(), None);
}

#[tokio::test]
async fn checkpoint_restores_partial_work() {
    let tmp = tempfile::tempdir().unwrap();
    let store = StagingStore::new(tmp.path(), OWNER);
    let params = leaf_parameters();
    let checker = Arc::new(StructuralChecker::new());

    let dir = store.create("rate-jokes").await.unwrap();
    store
        .write_initial(&dir, &params, "rate jokes", None)
        .await
        .unwrap();

    let mut state = InventState::new(params, "rate jokes", None, checker.clone()).unwrap();
    state.set_function_type(FunctionType::Scalar).unwrap();
    state.set_name("rate-jokes").unwrap();
    state.set_invent_essay("Humor is timing.").unwrap();
    {
        let builder = state.builder_mut().unwrap();
        builder
            .set_input_schema(json!({"type": "string"}), false)
            .unwrap();
        builder.append_task(completion_task(0)).unwrap();
        builder.append_task(completion_task(1)).unwrap();
    }
    store.checkpoint(&dir, &state).await.unwrap();
    assert!(dir.join(DRAFT_FILE).exists());

    let restored = StagingStore::new(tmp.path(), OWNER)
        .restore_state(&dir, None, None, None, checker)
        .await
        .unwrap();
    assert_eq!(restored.name().unwrap(), "rate-jokes");
    assert_eq!(restored.invent_spec(), "rate jokes");
    assert_eq!(restored.invent_essay().unwrap(), "Humor is timing.");
    assert!(restored.invent_essay_tasks().is_err());
    let builder = restored.builder().unwrap();
    assert_eq!(builder.tasks_len(), 2);
    assert!(builder.check_fields().is_ok());
}
