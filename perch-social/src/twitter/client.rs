//! Timeline fetchers.
//!
//! [`Fetcher`] is the seam the pipeline depends on. [`TimelineApi`] reads a
//! live latest-timeline page over HTTP; [`JsonFileFetcher`] replays a captured
//! dump. Pagination, rate limits and session handling stay with whoever runs
//! the endpoint; a fetch returns one already-materialized page.
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use crate::twitter::raw::RawItem;

const MAX_PAGE_SIZE: u32 = 100;

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_recent_posts(&self, count: u32) -> Result<Vec<RawItem>>;
}

#[derive(Clone)]
pub struct TimelineApi {
    http: reqwest::Client,
    endpoint: Url,
    bearer: String,
}

impl TimelineApi {
    pub fn new(endpoint: &str, bearer_token: String) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("invalid timeline endpoint: {endpoint}"))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("perch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            endpoint,
            bearer: bearer_token,
        })
    }
}

#[async_trait]
impl Fetcher for TimelineApi {
    async fn fetch_recent_posts(&self, count: u32) -> Result<Vec<RawItem>> {
        let count = count.clamp(1, MAX_PAGE_SIZE);
        tracing::debug!(endpoint = %self.endpoint, count, "social.timeline.fetch.start");

        let resp = self
            .http
            .get(self.endpoint.clone())
            .bearer_auth(&self.bearer)
            .query(&[("count", count.to_string())])
            .send()
            .await
            .context("timeline request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            bail!("timeline endpoint returned {status}: {snippet}");
        }

        let page: Value = resp.json().await.context("timeline response is not JSON")?;
        let items = items_from_page(page)?;
        tracing::info!(count = items.len(), "social.timeline.fetch.done");
        Ok(items)
    }
}

/// Replays raw items from a JSON file captured earlier.
#[derive(Debug, Clone)]
pub struct JsonFileFetcher {
    path: PathBuf,
}

impl JsonFileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Fetcher for JsonFileFetcher {
    async fn fetch_recent_posts(&self, count: u32) -> Result<Vec<RawItem>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read timeline dump: {}", self.path.display()))?;
        let page: Value = serde_json::from_str(&text)
            .with_context(|| format!("timeline dump is not JSON: {}", self.path.display()))?;
        let mut items = items_from_page(page)?;
        items.truncate(count as usize);
        tracing::info!(
            path = %self.path.display(),
            count = items.len(),
            "social.timeline.replay"
        );
        Ok(items)
    }
}

/// Accepts a bare array or an object whose `data` field is an array.
pub fn items_from_page(page: Value) -> Result<Vec<RawItem>> {
    let list = match page {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items,
            _ => bail!("timeline page has no `data` array"),
        },
        other => bail!("unexpected timeline page shape: {}", shape_of(&other)),
    };
    Ok(list.into_iter().map(RawItem::new).collect())
}

fn shape_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
