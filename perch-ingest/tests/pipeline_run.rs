use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use perch_common::PerchError;
use perch_ingest::pipeline::{Pipeline, PipelineConfig};
use perch_ingest::snapshot::SnapshotStore;
use perch_ingest::store::{PostStore, Table};
use perch_social::twitter::extract::NormalizeOptions;
use perch_social::twitter::{Fetcher, RawItem};
use serde_json::json;

struct StaticFetcher(Vec<serde_json::Value>);

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch_recent_posts(&self, count: u32) -> anyhow::Result<Vec<RawItem>> {
        Ok(self
            .0
            .iter()
            .take(count as usize)
            .cloned()
            .map(RawItem::new)
            .collect())
    }
}

struct FailingFetcher;

#[async_trait]
impl Fetcher for FailingFetcher {
    async fn fetch_recent_posts(&self, _count: u32) -> anyhow::Result<Vec<RawItem>> {
        Err(anyhow!("session expired"))
    }
}

fn raw(id: &str, user_id: Option<&str>, handle: &str, text: &str) -> serde_json::Value {
    let mut legacy = json!({
        "idStr": id,
        "fullText": text,
        "createdAt": "Sat Oct 17 08:00:00 +0000 2026",
        "favoriteCount": 4
    });
    if let Some(uid) = user_id {
        legacy["userIdStr"] = json!(uid);
    }
    json!({
        "user": { "legacy": { "screenName": handle, "name": handle } },
        "raw": { "result": { "views": { "count": "99" }, "legacy": legacy } }
    })
}

fn page() -> Vec<serde_json::Value> {
    vec![
        raw("1846000000000000003", Some("1"), "alice", "third"),
        raw("1846000000000000002", None, "ghost", "no author id"),
        raw("1846000000000000001", Some("2"), "bob", "RT @alice: third"),
        raw("999999999999999999", Some("3"), "carol", "older id, shorter"),
    ]
}

fn config() -> PipelineConfig {
    PipelineConfig {
        fetch_count: 100,
        normalize: NormalizeOptions {
            include_referenced: false,
            include_retweet_text: false,
            max_age_days: Some(1),
        },
    }
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn relational_run_skips_unresolvable_posts() {
    let store = Arc::new(PostStore::connect("sqlite::memory:").await.unwrap());
    let pipeline = Pipeline::new(config(), Arc::new(StaticFetcher(page())), store.clone());

    let report = pipeline.run_at(now()).await.unwrap();
    assert_eq!(report.fetched, 4);
    assert_eq!(report.normalized, 3);
    assert_eq!(report.persist.persisted, 2);
    assert_eq!(report.persist.skipped, 1);

    assert_eq!(store.count_rows(Table::Posts).await.unwrap(), 2);
    assert_eq!(store.count_rows(Table::EngagementMetrics).await.unwrap(), 2);

    // second run: same posts, one more metrics row each
    pipeline.run_at(now()).await.unwrap();
    assert_eq!(store.count_rows(Table::Posts).await.unwrap(), 2);
    assert_eq!(store.count_rows(Table::Authors).await.unwrap(), 2);
    assert_eq!(store.count_rows(Table::EngagementMetrics).await.unwrap(), 4);
}

#[tokio::test]
async fn snapshot_run_writes_sorted_day_file() {
    let dir = tempfile::tempdir().unwrap();
    let sink = SnapshotStore::new(dir.path()).for_day(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
    let pipeline = Pipeline::new(config(), Arc::new(StaticFetcher(page())), Arc::new(sink));

    let report = pipeline.run_at(now()).await.unwrap();
    assert_eq!(report.persist.total, Some(3));

    let text = std::fs::read_to_string(dir.path().join("2026-10-17.json")).unwrap();
    let posts: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
    let urls: Vec<&str> = posts.iter().map(|p| p["tweetUrl"].as_str().unwrap()).collect();
    assert_eq!(
        urls,
        vec![
            "https://x.com/alice/status/1846000000000000003",
            "https://x.com/ghost/status/1846000000000000002",
            "https://x.com/carol/status/999999999999999999",
        ]
    );
    assert_eq!(posts[0]["metrics"]["impressionCount"], 99);
}

#[tokio::test]
async fn snapshot_run_skips_items_without_ids() {
    let dir = tempfile::tempdir().unwrap();
    let sink = SnapshotStore::new(dir.path()).for_day(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());

    let mut first = raw("0", Some("1"), "alice", "first");
    let mut second = raw("0", Some("1"), "alice", "second");
    for item in [&mut first, &mut second] {
        item["raw"]["result"]["legacy"]
            .as_object_mut()
            .unwrap()
            .remove("idStr");
    }
    let page = vec![first, second, raw("7", Some("1"), "alice", "third")];
    let pipeline = Pipeline::new(config(), Arc::new(StaticFetcher(page)), Arc::new(sink));

    let report = pipeline.run_at(now()).await.unwrap();
    assert_eq!(report.normalized, 3);
    assert_eq!(report.persist.persisted, 1);
    assert_eq!(report.persist.skipped, 2);
    assert_eq!(report.persist.total, Some(1));

    let text = std::fs::read_to_string(dir.path().join("2026-10-17.json")).unwrap();
    assert!(!text.contains("/status/\""));
    assert!(text.contains("https://x.com/alice/status/7"));
}

#[tokio::test]
async fn fetch_failure_is_reported_and_nothing_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let sink = SnapshotStore::new(dir.path()).for_day(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
    let pipeline = Pipeline::new(config(), Arc::new(FailingFetcher), Arc::new(sink));

    let err = pipeline.run_at(now()).await.unwrap_err();
    assert!(matches!(err, PerchError::Fetch(ref msg) if msg.contains("session expired")));
    assert!(!dir.path().join("2026-10-17.json").exists());
}

#[tokio::test]
async fn fetch_count_is_forwarded() {
    let store = Arc::new(PostStore::connect("sqlite::memory:").await.unwrap());
    let mut cfg = config();
    cfg.fetch_count = 1;
    let pipeline = Pipeline::new(cfg, Arc::new(StaticFetcher(page())), store);

    let report = pipeline.run_at(now()).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.persist.persisted, 1);
}
