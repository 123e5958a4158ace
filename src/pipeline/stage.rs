use crate::config::ScreeningParams;
use crate::model::Batch;
use crate::providers::{DerivedQueries, HistoryStore, ReferenceData};
use futures::future::BoxFuture;

#[derive(Debug, Clone)]
pub struct StageMeta {
    pub step_number: u32,
    pub name: &'static str,
}

/// Shared references every stage may issue side-queries against, plus the
/// run's threshold configuration. Mirrors the way a history/profile
/// builder threads a client handle and retry policy through a call.
pub struct StageContext<'a> {
    pub history: &'a HistoryStore,
    pub reference: &'a ReferenceData,
    pub derived: &'a DerivedQueries,
    pub params: &'a ScreeningParams,
    /// Benchmark (index) change_pct for the run, used by RelativeStrength.
    pub benchmark_change_pct: Option<f64>,
}

/// A single predicate: reads a batch, optionally enriches rows from
/// Reference/History/Derived, returns the passing subset plus any derived
/// columns. Implementors must only ever narrow the batch and must never
/// drop a column a prior stage attached.
pub trait Stage: Send + Sync {
    fn meta(&self) -> StageMeta;
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch>;
}
