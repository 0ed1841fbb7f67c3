//! Persistence sinks and the fetch → normalize → persist pipeline.
//!
//! Two interchangeable [`Persister`]s receive a normalized batch:
//! [`store::PostStore`] writes authors, posts and engagement metrics to SQLite
//! inside one transaction, and [`snapshot::SnapshotStore`] merges the batch
//! into the JSON file for the current day. [`pipeline::Pipeline`] wires a
//! fetcher and a sink together for one run.
pub mod pipeline;
pub mod snapshot;
pub mod store;

use async_trait::async_trait;
use perch_social::twitter::types::NormalizedItem;
use serde::Serialize;

/// A sink for one normalized batch.
///
/// Implementations either store the whole batch or return an error and leave
/// the sink as it was. Per-post data-quality problems are counted in
/// [`PersistReport::skipped`] rather than failing the batch.
#[async_trait]
pub trait Persister: Send + Sync {
    fn name(&self) -> &'static str;

    async fn persist(&self, batch: Vec<NormalizedItem>) -> perch_common::Result<PersistReport>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    pub sink: &'static str,
    /// Posts handed to the sink.
    pub received: usize,
    /// Posts written (or merged) by this run.
    pub persisted: usize,
    /// Posts dropped for missing identity.
    pub skipped: usize,
    /// Engagement rows appended (relational sink only).
    pub metrics_appended: usize,
    /// Records held by the sink after the run, when cheap to know.
    pub total: Option<usize>,
}
