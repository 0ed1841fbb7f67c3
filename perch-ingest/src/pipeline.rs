//! One ingest run: fetch a page, normalize it, hand it to a sink.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use perch_common::PerchError;
use perch_social::twitter::extract::{normalize_batch, NormalizeOptions};
use perch_social::twitter::Fetcher;
use serde::Serialize;
use tracing::info;

use crate::{PersistReport, Persister};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Page size requested from the fetcher.
    pub fetch_count: u32,
    pub normalize: NormalizeOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub fetched: usize,
    pub normalized: usize,
    pub persist: PersistReport,
}

pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn Fetcher>,
    persister: Arc<dyn Persister>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<dyn Fetcher>,
        persister: Arc<dyn Persister>,
    ) -> Self {
        Self {
            config,
            fetcher,
            persister,
        }
    }

    pub async fn run(&self) -> perch_common::Result<RunReport> {
        self.run_at(Utc::now()).await
    }

    /// Run with an explicit "now" for the recency filter.
    pub async fn run_at(&self, now: DateTime<Utc>) -> perch_common::Result<RunReport> {
        let raw = self
            .fetcher
            .fetch_recent_posts(self.config.fetch_count)
            .await
            .map_err(|e| PerchError::Fetch(format!("{e:#}")))?;
        let fetched = raw.len();

        let normalized = normalize_batch(&raw, &self.config.normalize, now);
        let kept = normalized.len();

        let persist = self.persister.persist(normalized).await?;
        info!(
            sink = self.persister.name(),
            fetched,
            normalized = kept,
            persisted = persist.persisted,
            skipped = persist.skipped,
            "ingest.pipeline.done"
        );

        Ok(RunReport {
            fetched,
            normalized: kept,
            persist,
        })
    }
}
