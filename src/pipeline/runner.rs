use super::stage::{Stage, StageContext};
use crate::model::{Batch, StageSnapshot, StageStat};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use tracing::info;

/// Bounded concurrency for per-row side-query fan-out inside a stage.
pub const FAN_OUT_CONCURRENCY: usize = 8;

/// Runs a worker over `ids` with bounded concurrency and folds the
/// results back into a map keyed by id, so callers can re-apply them to
/// the batch in its original order.
pub async fn fan_out<T, F, Fut>(ids: &[String], concurrency: usize, f: F) -> HashMap<String, T>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(ids.iter().cloned())
        .map(|id| {
            let fut = f(id.clone());
            async move { (id, fut.await) }
        })
        .buffer_unordered(concurrency)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect()
}

/// Threads a batch through an ordered list of stages, capturing
/// per-stage statistics and snapshots. Stops early (without treating it
/// as an error) once the batch empties.
pub struct Runner {
    stages: Vec<Box<dyn Stage>>,
}

pub struct RunOutcome {
    pub final_batch: Batch,
    pub stats: Vec<StageStat>,
    pub snapshots: Vec<StageSnapshot>,
}

impl Runner {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub async fn run(&self, initial: Batch, ctx: &StageContext<'_>) -> RunOutcome {
        let mut current = initial;
        let mut stats = Vec::with_capacity(self.stages.len());
        let mut snapshots = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let meta = stage.meta();
            let input_count = current.len();
            if input_count == 0 {
                info!(step = meta.step_number, name = meta.name, "batch empty, stopping runner");
                break;
            }

            current = stage.screen(&current, ctx).await;
            let output_count = current.len();
            info!(
                step = meta.step_number,
                name = meta.name,
                input_count,
                output_count,
                "stage complete"
            );

            stats.push(StageStat {
                step_number: meta.step_number,
                name: meta.name.to_string(),
                input_count,
                output_count,
            });
            snapshots.push(StageSnapshot {
                step_number: meta.step_number,
                name: meta.name.to_string(),
                batch: current.clone(),
            });
        }

        RunOutcome { final_batch: current, stats, snapshots }
    }
}
