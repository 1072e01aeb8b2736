//! Remote repository host seam and the GitHub adapter

use async_trait::async_trait;
use futures::future::try_join_all;
use inventor_core::{ArtifactRef, Error, FunctionDocument, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_RAW_URL: &str = "https://raw.githubusercontent.com";
const USER_AGENT: &str = concat!("inventor/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait Host: Send + Sync {
    /// Login of the account the credentials belong to.
    async fn authenticated_owner(&self) -> Result<String>;

    async fn name_available(&self, owner: &str, name: &str) -> Result<bool>;

    /// Create an empty repository and return the URL to push to.
    async fn create_repository(&self, name: &str, description: Option<&str>) -> Result<String>;

    async fn update_description(&self, owner: &str, name: &str, description: &str) -> Result<()>;

    /// `function.json` of every reference, in order. `None` when any of them
    /// is missing.
    async fn fetch_functions(&self, refs: &[ArtifactRef]) -> Result<Option<Vec<FunctionDocument>>>;

    async fn commit_exists(&self, owner: &str, name: &str, commit: &str) -> Result<bool>;
}

pub struct GitHubHost {
    client: Client,
    token: String,
    api_url: String,
    raw_url: String,
}

impl std::fmt::Debug for GitHubHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubHost")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct User {
    login: String,
}

impl GitHubHost {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            api_url: GITHUB_API_URL.to_string(),
            raw_url: GITHUB_RAW_URL.to_string(),
        }
    }

    pub fn with_urls(mut self, api_url: impl Into<String>, raw_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self.raw_url = raw_url.into();
        self
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .bearer_auth(&self.token)
            .header("user-agent", USER_AGENT)
            .header("accept", "application/vnd.github+json")
    }

    fn push_url(&self, owner: &str, name: &str) -> String {
        format!(
            "https://x-access-token:{}@github.com/{}/{}.git",
            self.token, owner, name
        )
    }

    async fn fetch_function(&self, r: &ArtifactRef) -> Result<Option<FunctionDocument>> {
        let url = format!(
            "{}/{}/{}/{}/function.json",
            self.raw_url, r.owner, r.repository, r.commit
        );
        let response = self.get(url).send().await.map_err(host_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(artifact = %r, "function.json not found");
            return Ok(None);
        }
        let response = check(response).await?;
        match response.json::<FunctionDocument>().await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                warn!(artifact = %r, error = %e, "unreadable remote function.json");
                Ok(None)
            }
        }
    }
}

fn host_error(e: reqwest::Error) -> Error {
    Error::host(e.without_url().to_string())
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::host(format!("{}: {}", status, body)))
}

#[async_trait]
impl Host for GitHubHost {
    async fn authenticated_owner(&self) -> Result<String> {
        let response = self
            .get(format!("{}/user", self.api_url))
            .send()
            .await
            .map_err(host_error)?;
        let user: User = check(response).await?.json().await.map_err(host_error)?;
        Ok(user.login)
    }

    async fn name_available(&self, owner: &str, name: &str) -> Result<bool> {
        let response = self
            .get(format!("{}/repos/{}/{}", self.api_url, owner, name))
            .send()
            .await
            .map_err(host_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(true);
        }
        check(response).await?;
        Ok(false)
    }

    async fn create_repository(&self, name: &str, description: Option<&str>) -> Result<String> {
        let mut body = json!({ "name": name, "auto_init": false });
        if let Some(description) = description {
            body["description"] = json!(description);
        }
        let response = self
            .client
            .post(format!("{}/user/repos", self.api_url))
            .bearer_auth(&self.token)
            .header("user-agent", USER_AGENT)
            .json(&body)
            .send()
            .await
            .map_err(host_error)?;
        check(response).await?;
        let owner = self.authenticated_owner().await?;
        Ok(self.push_url(&owner, name))
    }

    async fn update_description(&self, owner: &str, name: &str, description: &str) -> Result<()> {
        let response = self
            .client
            .patch(format!("{}/repos/{}/{}", self.api_url, owner, name))
            .bearer_auth(&self.token)
            .header("user-agent", USER_AGENT)
            .json(&json!({ "description": description }))
            .send()
            .await
            .map_err(host_error)?;
        check(response).await?;
        Ok(())
    }

    async fn fetch_functions(&self, refs: &[ArtifactRef]) -> Result<Option<Vec<FunctionDocument>>> {
        let fetched = try_join_all(refs.iter().map(|r| self.fetch_function(r))).await?;
        Ok(fetched.into_iter().collect())
    }

    async fn commit_exists(&self, owner: &str, name: &str, commit: &str) -> Result<bool> {
        let response = self
            .get(format!(
                "{}/repos/{}/{}/commits/{}",
                self.api_url, owner, name, commit
            ))
            .send()
            .await
            .map_err(host_error)?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => Ok(false),
            _ => {
                check(response).await?;
                Ok(true)
            }
        }
    }
}
