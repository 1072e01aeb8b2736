//! Version control seam and the git CLI adapter

use std::path::Path;

use async_trait::async_trait;
use inventor_core::{Error, Result};
use tokio::process::Command;
use tracing::debug;

/// Identity recorded on every commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitAuthor {
    pub name: String,
    pub email: String,
}

#[async_trait]
pub trait Vcs: Send + Sync {
    async fn init(&self, dir: &Path) -> Result<()>;

    async fn stage_all(&self, dir: &Path) -> Result<()>;

    async fn commit(&self, dir: &Path, message: &str, author: &GitAuthor) -> Result<()>;

    /// Uncommitted changes to tracked or allow-listed files.
    async fn is_dirty(&self, dir: &Path) -> Result<bool>;

    /// `None` before the first commit.
    async fn head_commit(&self, dir: &Path) -> Result<Option<String>>;

    async fn set_remote(&self, dir: &Path, url: &str) -> Result<()>;

    async fn push(&self, dir: &Path) -> Result<()>;

    /// Local commits the remote has not received. A repository with commits
    /// but no upstream has never been pushed.
    async fn has_unpushed(&self, dir: &Path) -> Result<bool>;

    /// Delete the repository metadata, leaving the working files.
    async fn remove_metadata(&self, dir: &Path) -> Result<()>;
}

/// Shells out to `git`.
#[derive(Clone, Debug, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> Result<String> {
        debug!(dir = %dir.display(), cmd = args.first().copied().unwrap_or(""), "git");
        let output = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::vcs(format!("git could not be started: {}", e)))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::vcs(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or(""),
                redact_credentials(stderr.trim())
            )))
        }
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn init(&self, dir: &Path) -> Result<()> {
        self.git(dir, &["init", "--initial-branch=main"]).await?;
        Ok(())
    }

    async fn stage_all(&self, dir: &Path) -> Result<()> {
        self.git(dir, &["add", "--all"]).await?;
        Ok(())
    }

    async fn commit(&self, dir: &Path, message: &str, author: &GitAuthor) -> Result<()> {
        let name = format!("user.name={}", author.name);
        let email = format!("user.email={}", author.email);
        self.git(dir, &["-c", &name, "-c", &email, "commit", "-m", message])
            .await?;
        Ok(())
    }

    async fn is_dirty(&self, dir: &Path) -> Result<bool> {
        Ok(!self.git(dir, &["status", "--porcelain"]).await?.is_empty())
    }

    async fn head_commit(&self, dir: &Path) -> Result<Option<String>> {
        match self.git(dir, &["rev-parse", "--verify", "--quiet", "HEAD"]).await {
            Ok(sha) if !sha.is_empty() => Ok(Some(sha)),
            Ok(_) | Err(_) => Ok(None),
        }
    }

    async fn set_remote(&self, dir: &Path, url: &str) -> Result<()> {
        if self.git(dir, &["remote", "set-url", "origin", url]).await.is_err() {
            self.git(dir, &["remote", "add", "origin", url]).await?;
        }
        Ok(())
    }

    async fn push(&self, dir: &Path) -> Result<()> {
        self.git(dir, &["push", "--set-upstream", "origin", "HEAD:main"])
            .await?;
        Ok(())
    }

    async fn has_unpushed(&self, dir: &Path) -> Result<bool> {
        if self.head_commit(dir).await?.is_none() {
            return Ok(false);
        }
        match self.git(dir, &["rev-list", "--count", "@{u}..HEAD"]).await {
            Ok(count) => Ok(count != "0"),
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "no upstream");
                Ok(true)
            }
        }
    }

    async fn remove_metadata(&self, dir: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(dir.join(".git")).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Strip `user:token@` from any URL in git's output.
fn redact_credentials(text: &str) -> String {
    let re = match regex::Regex::new(r"https://[^@\s/]+@") {
        Ok(re) => re,
        Err(_) => return text.to_string(),
    };
    re.replace_all(text, "https://***@").into_owned()
}
