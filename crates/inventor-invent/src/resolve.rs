//! Splicing finished children into their parent

use std::collections::BTreeMap;

use inventor_core::{ArtifactRef, FunctionDocument};
use regex::{Captures, Regex};
use tracing::warn;

/// Replace placeholders with concrete references. Returns how many tasks
/// were rewritten; indices that are not placeholders are left alone.
pub fn resolve_placeholders(
    document: &mut FunctionDocument,
    resolved: &BTreeMap<usize, ArtifactRef>,
) -> usize {
    let mut replaced = 0;
    for (&index, artifact) in resolved {
        let Some(task) = document.tasks.get_mut(index) else {
            continue;
        };
        if let Some(concrete) = task.resolve(artifact) {
            *task = concrete;
            replaced += 1;
        }
    }
    replaced
}

/// Fill `{{ .Owner }}` and the `{{ .TaskN }}` of every resolved index.
/// Templates for unresolved tasks stay in place.
pub fn substitute_readme(
    readme: &str,
    owner: &str,
    repositories: &BTreeMap<usize, String>,
) -> String {
    let (owner_re, task_re) = match (
        Regex::new(r"\{\{\s*\.Owner\s*\}\}"),
        Regex::new(r"\{\{\s*\.Task(\d+)\s*\}\}"),
    ) {
        (Ok(o), Ok(t)) => (o, t),
        _ => {
            warn!("README templates not substituted");
            return readme.to_string();
        }
    };

    let readme = owner_re.replace_all(readme, owner.replace('$', "$$").as_str());
    task_re
        .replace_all(&readme, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| repositories.get(&i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
