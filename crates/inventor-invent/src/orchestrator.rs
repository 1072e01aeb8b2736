//! Invention pipeline
//!
//! Per function: bootstrap (type, name, initial push), generation (five
//! checkpointed steps, then the `implement` push) and closure (invent every
//! placeholder's child, splice the finished ones back in). A directory that
//! already holds a complete function skips straight to closure, which makes
//! a restarted run pick up where it stopped.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use inventor_agent::{run_step, Agent, Continuation, StepRequest};
use inventor_core::{
    ArtifactRef, Error, InventState, Parameters, PlaceholderTaskSpec, ProgressSink,
    QualityChecker, Reporter, Result, TypePreset,
};
use inventor_tools::{create_builder_registry, shared_state, NameAvailability, SharedState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::host::Host;
use crate::names::StagingNames;
use crate::pool::{child_jobs, run_all, settle, ChildJob};
use crate::publish::Publisher;
use crate::quality::{read_quality_function, QualityFunction};
use crate::resolve::{resolve_placeholders, substitute_readme};
use crate::staging::StagingStore;
use crate::steps::{StepKind, BOOTSTRAP, GENERATION};
use crate::vcs::{GitAuthor, Vcs};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Debug)]
pub enum InventRequest {
    /// Invent from a creative brief.
    New {
        invent_spec: String,
        parameters: Parameters,
        preset: Option<TypePreset>,
    },
    /// Continue a function already staged under this name.
    Resume { name: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invented {
    pub name: String,
    pub dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct InventorOptions {
    pub state_dir: PathBuf,
    pub owner: String,
    pub author: GitAuthor,
    pub max_retries: usize,
    pub max_concurrency: usize,
}

pub struct Inventor {
    agent: Arc<dyn Agent>,
    store: Arc<StagingStore>,
    host: Arc<dyn Host>,
    names: Arc<dyn NameAvailability>,
    publisher: Publisher,
    checker: Arc<dyn QualityChecker>,
    max_retries: usize,
    max_concurrency: usize,
    cancel: CancellationToken,
}

impl Inventor {
    pub fn new(
        agent: Arc<dyn Agent>,
        vcs: Arc<dyn Vcs>,
        host: Arc<dyn Host>,
        checker: Arc<dyn QualityChecker>,
        options: InventorOptions,
    ) -> Self {
        let store = Arc::new(StagingStore::new(&options.state_dir, &options.owner));
        let names: Arc<dyn NameAvailability> =
            Arc::new(StagingNames::new(store.clone(), host.clone(), &options.owner));
        Self {
            agent,
            publisher: Publisher::new(vcs, host.clone(), options.author, &options.owner),
            store,
            host,
            names,
            checker,
            max_retries: options.max_retries,
            max_concurrency: options.max_concurrency,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &StagingStore {
        &self.store
    }

    /// Invent a function tree. Progress goes to `sink`, paths rooted here.
    pub async fn invent(
        &self,
        request: InventRequest,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Invented> {
        self.run(request, None, Reporter::root(sink)).await
    }

    fn run<'a>(
        &'a self,
        request: InventRequest,
        parent_token: Option<String>,
        mut reporter: Reporter,
    ) -> BoxFuture<'a, Result<Invented>> {
        Box::pin(async move {
            let mut dir = match &request {
                InventRequest::Resume { name } => {
                    let dir = self.store.dir(name);
                    if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                        return Err(Error::structural(format!(
                            "Function directory not found for name: {}",
                            name
                        )));
                    }
                    Some(dir)
                }
                InventRequest::New { .. } => match &parent_token {
                    Some(token) => self.store.find_by_token(token).await?,
                    None => None,
                },
            };
            if let Some(dir) = &dir {
                reporter.set_name(StagingStore::name_of(dir)?);
            }

            let quality = match self
                .prepare(&request, parent_token.as_deref(), &mut dir, &mut reporter)
                .await
            {
                Ok(quality) => quality,
                Err(e) => {
                    if dir.is_some() {
                        reporter.done(Some(e.to_string()));
                    }
                    return Err(e);
                }
            };
            let dir = dir.ok_or_else(|| Error::Internal("no staging directory".into()))?;

            reporter.done(None);
            let name = quality.name.clone();
            self.close(&dir, quality, &reporter).await?;
            Ok(Invented { name, dir })
        })
    }

    /// Bootstrap and generate as needed until `dir` holds a complete
    /// function. `dir` is filled in as soon as it exists on disk.
    async fn prepare(
        &self,
        request: &InventRequest,
        parent_token: Option<&str>,
        dir: &mut Option<PathBuf>,
        reporter: &mut Reporter,
    ) -> Result<QualityFunction> {
        let mut fresh = None;
        if dir.is_none() {
            let InventRequest::New {
                invent_spec,
                parameters,
                preset,
            } = request
            else {
                return Err(Error::Internal("resume without a directory".into()));
            };
            let state = shared_state(InventState::new(
                *parameters,
                invent_spec.as_str(),
                preset.clone(),
                self.checker.clone(),
            )?);
            let continuation = self
                .bootstrap(&state, invent_spec, parameters, parent_token, dir, reporter)
                .await?;
            fresh = Some((state, continuation));
        }
        let dir = dir
            .clone()
            .ok_or_else(|| Error::Internal("bootstrap left no directory".into()))?;

        if let Some(quality) = self.read_quality(&dir).await? {
            debug!(name = %quality.name, "complete function found, skipping generation");
            return Ok(quality);
        }

        let (state, continuation) = match fresh {
            Some(fresh) => fresh,
            None => {
                let restored = match request {
                    InventRequest::New {
                        invent_spec,
                        parameters,
                        preset,
                    } => {
                        self.store
                            .restore_state(
                                &dir,
                                Some(invent_spec.as_str()),
                                Some(*parameters),
                                preset.clone(),
                                self.checker.clone(),
                            )
                            .await?
                    }
                    InventRequest::Resume { .. } => {
                        self.store
                            .restore_state(&dir, None, None, None, self.checker.clone())
                            .await?
                    }
                };
                info!(dir = %dir.display(), "resuming generation");
                (shared_state(restored), None)
            }
        };

        self.generate(&dir, &state, continuation, reporter).await?;

        self.read_quality(&dir).await?.ok_or_else(|| {
            Error::Internal("generation finished without a complete function".into())
        })
    }

    /// Type and name, then the initial files and push.
    async fn bootstrap(
        &self,
        state: &SharedState,
        invent_spec: &str,
        parameters: &Parameters,
        parent_token: Option<&str>,
        dir: &mut Option<PathBuf>,
        reporter: &mut Reporter,
    ) -> Result<Option<Continuation>> {
        let mut continuation = None;
        for kind in BOOTSTRAP {
            continuation = self.run_kind(kind, state, reporter, continuation).await?;
        }

        let name = state.lock().await.name()?.to_string();
        let staged = self.store.dir(&name);
        self.store
            .write_initial(&staged, parameters, invent_spec, parent_token)
            .await?;
        self.store.checkpoint(&staged, &*state.lock().await).await?;
        *dir = Some(staged.clone());
        reporter.set_name(&name);
        info!(name = %name, path = ?reporter.path(), "function staged");

        self.publisher.push_initial(&staged, &name).await?;
        Ok(continuation)
    }

    async fn generate(
        &self,
        dir: &Path,
        state: &SharedState,
        mut continuation: Option<Continuation>,
        reporter: &Reporter,
    ) -> Result<()> {
        // A directory staged without a draft has lost its type choice.
        for kind in std::iter::once(StepKind::Type).chain(GENERATION) {
            continuation = self.run_kind(kind, state, reporter, continuation).await?;
            self.store.checkpoint(dir, &*state.lock().await).await?;
        }

        let (name, description) = {
            let state = state.lock().await;
            self.store.write_final(dir, &state).await?;
            (state.name()?.to_string(), state.description()?.to_string())
        };
        self.publisher
            .push_update(
                dir,
                &name,
                &format!("implement {}", name),
                Some(&description),
            )
            .await
    }

    /// Run one step unless the state already satisfies it.
    async fn run_kind(
        &self,
        kind: StepKind,
        state: &SharedState,
        reporter: &Reporter,
        continuation: Option<Continuation>,
    ) -> Result<Option<Continuation>> {
        let (satisfied, prompt, tools) = {
            let state = state.lock().await;
            let variant = state.builder().ok().map(|b| b.variant());
            (kind.check(&state), kind.prompt(&state), kind.tools(variant))
        };
        if satisfied.is_ok() {
            debug!(step = kind.as_str(), "step already satisfied");
            return Ok(continuation);
        }

        let registry = create_builder_registry(state.clone(), Some(self.names.clone()), &tools);
        let step = StepRequest::new(kind.as_str(), prompt, registry)
            .with_max_retries(self.max_retries);
        let predicate = || {
            let state = state.clone();
            async move { kind.check(&*state.lock().await) }
        };
        info!(step = kind.as_str(), path = ?reporter.path(), "running step");
        let next = run_step(
            self.agent.as_ref(),
            &step,
            predicate,
            reporter,
            continuation,
            &self.cancel,
        )
        .await?;
        Ok(Some(next))
    }

    async fn read_quality(&self, dir: &Path) -> Result<Option<QualityFunction>> {
        read_quality_function(&self.store, self.host.as_ref(), self.checker.as_ref(), dir).await
    }

    /// Invent every placeholder's child and splice the finished ones in.
    async fn close(&self, dir: &Path, quality: QualityFunction, reporter: &Reporter) -> Result<()> {
        let name = quality.name.clone();
        let update = format!("update {}", name);

        if self.publisher.needs_publish(dir).await? {
            self.publisher
                .push_update(dir, &name, &update, quality.document.description.as_deref())
                .await?;
        }
        if !quality.variant.is_branch() {
            return Ok(());
        }

        let jobs = child_jobs(&quality, reporter);
        if !jobs.is_empty() {
            info!(name = %name, children = jobs.len(), "inventing sub-functions");
        }
        let settled = run_all(jobs, self.max_concurrency, |job| self.run_child(job)).await;
        let (_, mut errors) = settle(settled);
        for e in &errors {
            warn!(name = %name, error = %e, "sub-function invention failed");
        }

        // A failed lookup leaves that placeholder for the next run; the
        // others are still spliced in.
        let mut resolved = BTreeMap::new();
        for index in quality.document.placeholder_indices() {
            let Some(spec) = quality.spec(index) else {
                continue;
            };
            match self.resolve_child(index, spec).await {
                Ok(Some(artifact)) => {
                    resolved.insert(index, artifact);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(name = %name, index, error = %e, "sub-function lookup failed");
                    errors.push(e);
                }
            }
        }

        let mut document = quality.document;
        if resolve_placeholders(&mut document, &resolved) > 0 {
            self.store.write_function(dir, &document).await?;
            if let Some(readme) = self.store.load(dir).await?.readme {
                let repositories: BTreeMap<usize, String> = resolved
                    .iter()
                    .map(|(&i, artifact)| (i, artifact.repository.clone()))
                    .collect();
                let readme = substitute_readme(&readme, self.publisher.owner(), &repositories);
                self.store.write_readme(dir, &readme).await?;
            }
            self.publisher
                .push_update(dir, &name, &update, document.description.as_deref())
                .await?;
            info!(name = %name, resolved = resolved.len(), "sub-functions linked");
        }

        Error::from_children(errors)
    }

    /// The pushed child behind a placeholder, once it is complete and free
    /// of placeholders of its own.
    async fn resolve_child(
        &self,
        index: usize,
        spec: &PlaceholderTaskSpec,
    ) -> Result<Option<ArtifactRef>> {
        let Some(child_dir) = self.store.find_by_token(&spec.token).await? else {
            return Ok(None);
        };
        let Some(child) = self.read_quality(&child_dir).await? else {
            return Ok(None);
        };
        if child.document.has_placeholders() {
            debug!(index, child = %child.name, "child still has placeholders");
            return Ok(None);
        }
        self.publisher.artifact_ref(&child_dir, &child.name).await
    }

    fn run_child(&self, job: ChildJob) -> BoxFuture<'_, Result<Invented>> {
        let ChildJob {
            spec,
            parameters,
            preset,
            reporter,
            ..
        } = job;
        self.run(
            InventRequest::New {
                invent_spec: spec.spec,
                parameters,
                preset: Some(preset),
            },
            Some(spec.token),
            reporter,
        )
    }
}
