//! Name reservation against the staging root and the remote host

use std::sync::Arc;

use async_trait::async_trait;
use inventor_core::{Error, Result};
use inventor_tools::NameAvailability;
use tracing::debug;

use crate::host::Host;
use crate::staging::StagingStore;

/// A name is free when no staging directory holds it and the host has no
/// repository of that name. Reserving creates the directory.
pub struct StagingNames {
    store: Arc<StagingStore>,
    host: Arc<dyn Host>,
    owner: String,
}

impl StagingNames {
    pub fn new(store: Arc<StagingStore>, host: Arc<dyn Host>, owner: impl Into<String>) -> Self {
        Self {
            store,
            host,
            owner: owner.into(),
        }
    }
}

#[async_trait]
impl NameAvailability for StagingNames {
    async fn reserve(&self, name: &str) -> Result<()> {
        self.store.create(name).await?;
        match self.host.name_available(&self.owner, name).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.store.discard(name).await;
                Err(Error::name_conflict(
                    name,
                    "a repository with this name already exists",
                ))
            }
            Err(e) => {
                self.store.discard(name).await;
                Err(e)
            }
        }
    }

    async fn release(&self, name: &str) {
        debug!(name, "releasing name");
        self.store.discard(name).await;
    }
}
