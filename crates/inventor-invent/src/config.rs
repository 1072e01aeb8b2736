//! Inventor configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file
//! exists. Secrets never live in the file; they come from the environment.

use std::path::{Path, PathBuf};

use inventor_agent::AgentConfig;
use inventor_core::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventConfig {
    /// Model and tool-loop settings.
    pub agent: AgentConfig,
    /// Pipeline settings.
    pub invent: InventSection,
    /// Commit identity.
    pub git: GitSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventSection {
    /// Root of the staging directories, one subdirectory per owner.
    pub state_dir: PathBuf,
    /// Extra agent attempts per step after the first.
    pub max_retries: usize,
    /// Children invented at once per fan-out.
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSection {
    pub author_name: String,
    pub author_email: String,
}

impl Default for InventSection {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            max_retries: inventor_agent::DEFAULT_MAX_RETRIES,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl Default for GitSection {
    fn default() -> Self {
        Self {
            author_name: "inventor".to_string(),
            author_email: "inventor@localhost".to_string(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".inventor"))
        .unwrap_or_else(|| PathBuf::from(".inventor"))
}

// ============================================================
// Loading
// ============================================================

impl InventConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} - using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Apply `INVENTOR_STATE_DIR`, `GIT_AUTHOR_NAME` and `GIT_AUTHOR_EMAIL`.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("INVENTOR_STATE_DIR").filter(|v| !v.is_empty()) {
            self.invent.state_dir = PathBuf::from(dir);
        }
        if let Some(name) = lookup("GIT_AUTHOR_NAME").filter(|v| !v.is_empty()) {
            self.git.author_name = name;
        }
        if let Some(email) = lookup("GIT_AUTHOR_EMAIL").filter(|v| !v.is_empty()) {
            self.git.author_email = email;
        }
    }
}

/// Credentials read from the environment.
#[derive(Clone)]
pub struct Secrets {
    pub anthropic_api_key: String,
    pub github_token: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secrets { .. }")
    }
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{} must be set", key)))
        };
        Ok(Self {
            anthropic_api_key: require("ANTHROPIC_API_KEY")?,
            github_token: require("GITHUB_TOKEN")?,
        })
    }
}
