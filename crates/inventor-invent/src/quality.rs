//! Reading a finished function back from its staging directory

use std::path::Path;

use inventor_core::{
    FunctionDocument, Parameters, PlaceholderTaskSpecs, QualityChecker, Result, Variant,
};
use tracing::debug;

use crate::host::Host;
use crate::staging::StagingStore;

/// A staging directory whose `function.json` passes the quality check.
#[derive(Clone, Debug)]
pub struct QualityFunction {
    pub name: String,
    pub parameters: Parameters,
    pub variant: Variant,
    pub document: FunctionDocument,
    pub specs: PlaceholderTaskSpecs,
}

impl QualityFunction {
    pub fn spec(&self, index: usize) -> Option<&inventor_core::PlaceholderTaskSpec> {
        self.specs.get(index).and_then(Option::as_ref)
    }
}

/// `None` whenever the directory does not hold a complete function: files
/// missing, a placeholder without a spec, an unreachable remote child, or a
/// failed check.
pub async fn read_quality_function(
    store: &StagingStore,
    host: &dyn Host,
    checker: &dyn QualityChecker,
    dir: &Path,
) -> Result<Option<QualityFunction>> {
    let staged = store.load(dir).await?;
    let (Some(parameters), Some(document)) = (staged.parameters, staged.document) else {
        return Ok(None);
    };
    let variant = Variant::new(parameters.is_branch(), document.function_type);

    let mut specs = PlaceholderTaskSpecs::new();
    if variant.is_branch() {
        specs = staged.placeholder_task_specs.unwrap_or_default();
        let unspecified = document
            .placeholder_indices()
            .into_iter()
            .find(|&i| specs.get(i).map_or(true, Option::is_none));
        if let Some(index) = unspecified {
            debug!(name = %staged.name, index, "placeholder without a spec");
            return Ok(None);
        }

        let children = document.remote_children();
        if !children.is_empty() && host.fetch_functions(&children).await?.is_none() {
            debug!(name = %staged.name, "remote child missing");
            return Ok(None);
        }
    }

    if let Err(e) = checker.check_function(variant, &document) {
        debug!(name = %staged.name, error = %e, "function fails quality check");
        return Ok(None);
    }

    Ok(Some(QualityFunction {
        name: staged.name,
        parameters,
        variant,
        document,
        specs,
    }))
}
