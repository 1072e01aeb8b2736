//! Committing and pushing staging directories

use std::path::Path;
use std::sync::Arc;

use inventor_core::{ArtifactRef, Result};
use tracing::{info, warn};

use crate::host::Host;
use crate::vcs::{GitAuthor, Vcs};

pub struct Publisher {
    vcs: Arc<dyn Vcs>,
    host: Arc<dyn Host>,
    author: GitAuthor,
    owner: String,
}

impl Publisher {
    pub fn new(
        vcs: Arc<dyn Vcs>,
        host: Arc<dyn Host>,
        author: GitAuthor,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            vcs,
            host,
            author,
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// First commit of a new function: init, create the remote, push.
    /// A failed first push drops the local repository again so the next
    /// attempt starts from a clean init.
    pub async fn push_initial(&self, dir: &Path, name: &str) -> Result<()> {
        self.vcs.init(dir).await?;
        if let Err(e) = self.first_push(dir, name).await {
            if let Err(cleanup) = self.vcs.remove_metadata(dir).await {
                warn!(name, error = %cleanup, "repository metadata not removed");
            }
            return Err(e);
        }
        info!(name, "initial commit pushed");
        Ok(())
    }

    async fn first_push(&self, dir: &Path, name: &str) -> Result<()> {
        self.vcs.stage_all(dir).await?;
        self.vcs.commit(dir, "initial commit", &self.author).await?;
        let url = self.host.create_repository(name, None).await?;
        self.vcs.set_remote(dir, &url).await?;
        self.vcs.push(dir).await
    }

    /// Commit whatever changed and push, including commits an earlier push
    /// failed to deliver. Nothing to commit is not an error. A directory
    /// whose first push never landed is published first.
    pub async fn push_update(
        &self,
        dir: &Path,
        name: &str,
        message: &str,
        description: Option<&str>,
    ) -> Result<()> {
        if self.vcs.head_commit(dir).await?.is_none() {
            self.push_initial(dir, name).await?;
        }
        self.vcs.stage_all(dir).await?;
        if self.vcs.is_dirty(dir).await? {
            self.vcs.commit(dir, message, &self.author).await?;
        }
        if self.vcs.has_unpushed(dir).await? {
            self.vcs.push(dir).await?;
            info!(name, message, "pushed");
        }
        if let Some(description) = description {
            self.host
                .update_description(&self.owner, name, description)
                .await?;
        }
        Ok(())
    }

    /// Whether the remote is missing anything: the repository itself,
    /// uncommitted changes, or commits a failed push left behind.
    pub async fn needs_publish(&self, dir: &Path) -> Result<bool> {
        if self.vcs.head_commit(dir).await?.is_none() {
            return Ok(true);
        }
        Ok(self.vcs.is_dirty(dir).await? || self.vcs.has_unpushed(dir).await?)
    }

    /// The pushed identity of a staging directory, if its head commit is
    /// known to the host.
    pub async fn artifact_ref(&self, dir: &Path, name: &str) -> Result<Option<ArtifactRef>> {
        let Some(commit) = self.vcs.head_commit(dir).await? else {
            return Ok(None);
        };
        if !self.host.commit_exists(&self.owner, name, &commit).await? {
            return Ok(None);
        }
        Ok(Some(ArtifactRef {
            owner: self.owner.clone(),
            repository: name.to_string(),
            commit,
        }))
    }
}
