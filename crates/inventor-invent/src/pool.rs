//! Child jobs for the recursive stage
//!
//! One job per placeholder that carries a spec. Jobs run with bounded
//! concurrency and every job settles; a failure never cancels a sibling.

use std::future::Future;

use futures::stream::{self, StreamExt};
use inventor_core::{
    Error, FieldPreset, FunctionType, Parameters, PlaceholderTaskSpec, Reporter, Result, Task,
    TypePreset,
};

use crate::quality::QualityFunction;

#[derive(Clone)]
pub struct ChildJob {
    /// Task index in the parent, also the last element of the child's path.
    pub index: usize,
    pub spec: PlaceholderTaskSpec,
    pub parameters: Parameters,
    pub preset: TypePreset,
    pub reporter: Reporter,
}

impl std::fmt::Debug for ChildJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildJob")
            .field("index", &self.index)
            .field("token", &self.spec.token)
            .field("path", &self.reporter.path())
            .finish()
    }
}

/// Type and fields a placeholder fixes for its child.
pub fn preset_for(task: &Task) -> Option<TypePreset> {
    match task {
        Task::PlaceholderScalar(p) => Some(TypePreset {
            function_type: FunctionType::Scalar,
            fields: FieldPreset {
                input_schema: Some(p.input_schema.clone()),
                ..Default::default()
            },
        }),
        Task::PlaceholderVector(p) => Some(TypePreset {
            function_type: FunctionType::Vector,
            fields: FieldPreset {
                input_schema: Some(p.input_schema.clone()),
                output_length: p.output_length.clone(),
                input_split: p.input_split.clone(),
                input_merge: p.input_merge.clone(),
            },
        }),
        _ => None,
    }
}

/// Jobs for every placeholder of `parent` that has a spec.
pub fn child_jobs(parent: &QualityFunction, reporter: &Reporter) -> Vec<ChildJob> {
    let parameters = parent.parameters.for_children();
    parent
        .document
        .tasks
        .iter()
        .enumerate()
        .filter_map(|(index, task)| {
            let spec = parent.spec(index)?.clone();
            let preset = preset_for(task)?;
            Some(ChildJob {
                index,
                spec,
                parameters,
                preset,
                reporter: reporter.child(index),
            })
        })
        .collect()
}

/// Run every job, at most `max_concurrency` at once, and wait for all of
/// them. Results come back ordered by task index.
pub async fn run_all<T, F, Fut>(
    jobs: Vec<ChildJob>,
    max_concurrency: usize,
    run: F,
) -> Vec<(usize, Result<T>)>
where
    F: Fn(ChildJob) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut settled: Vec<(usize, Result<T>)> = stream::iter(jobs)
        .map(|job| {
            let index = job.index;
            let running = run(job);
            async move { (index, running.await) }
        })
        .buffer_unordered(max_concurrency.max(1))
        .collect()
        .await;
    settled.sort_by_key(|(index, _)| *index);
    settled
}

/// Split settled results into successes and failures, both in index order.
pub fn settle<T>(settled: Vec<(usize, Result<T>)>) -> (Vec<(usize, T)>, Vec<Error>) {
    let mut ok = Vec::new();
    let mut errors = Vec::new();
    for (index, result) in settled {
        match result {
            Ok(value) => ok.push((index, value)),
            Err(e) => errors.push(e),
        }
    }
    (ok, errors)
}
