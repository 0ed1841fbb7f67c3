//! Day-keyed JSON snapshot sink.
//!
//! Each calendar day has one file, `<dir>/<YYYY-MM-DD>.json`, holding a single
//! array of posts sorted newest first. A run reads the day's file, merges the
//! new batch over it and replaces the file via a sibling temp file + rename,
//! so a reader sees either the old array or the new one.
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use perch_common::PerchError;
use perch_social::twitter::dedup::merge_posts;
use perch_social::twitter::types::{NormalizedItem, NormalizedPost};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::{PersistReport, Persister};

const SNAPSHOT_SINK: &str = "snapshot";

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    day: Option<NaiveDate>,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            day: None,
        }
    }

    /// Pin the calendar day instead of using the local date at write time.
    pub fn for_day(mut self, day: NaiveDate) -> Self {
        self.day = Some(day);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn current_day(&self) -> NaiveDate {
        self.day.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", day.format("%Y-%m-%d")))
    }

    /// Posts stored for `day`; a missing file is an empty day.
    pub async fn load(&self, day: NaiveDate) -> perch_common::Result<Vec<NormalizedPost>> {
        let path = self.path_for(day);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "ingest.snapshot.absent");
                return Ok(Vec::new());
            }
            Err(err) => return Err(snapshot_error(&path, err)),
        };
        serde_json::from_str(&text).map_err(|err| snapshot_error(&path, err))
    }

    /// Merge `incoming` into the current day's file and rewrite it.
    /// Returns the file path and the number of posts it now holds.
    pub async fn merge_and_write(
        &self,
        incoming: Vec<NormalizedPost>,
    ) -> perch_common::Result<(PathBuf, usize)> {
        let day = self.current_day();
        let path = self.path_for(day);
        let previous = self.load(day).await?;
        let merged = merge_posts(previous, incoming);

        let body = serde_json::to_vec_pretty(&merged)?;
        write_atomically(&path, &body)
            .await
            .map_err(|err| snapshot_error(&path, err))?;

        info!(
            path = %path.display(),
            total = merged.len(),
            "ingest.snapshot.written"
        );
        Ok((path, merged.len()))
    }
}

#[async_trait]
impl Persister for SnapshotStore {
    fn name(&self) -> &'static str {
        SNAPSHOT_SINK
    }

    async fn persist(&self, batch: Vec<NormalizedItem>) -> perch_common::Result<PersistReport> {
        let received = batch.len();
        let mut skipped = 0;
        let mut posts: Vec<NormalizedPost> = Vec::with_capacity(received);
        for (index, item) in batch.into_iter().enumerate() {
            // the status id is the merge key; without it posts collapse together
            if item.origin.post_id.is_none() {
                skipped += 1;
                warn!(
                    index,
                    post_url = %item.post.post_url,
                    handle = %item.post.author.handle,
                    reason = "missing_post_id",
                    "ingest.snapshot.post_skipped"
                );
                continue;
            }
            posts.push(item.post);
        }

        let persisted = posts.len();
        let (_, total) = self.merge_and_write(posts).await?;
        Ok(PersistReport {
            sink: SNAPSHOT_SINK,
            received,
            persisted,
            skipped,
            total: Some(total),
            ..Default::default()
        })
    }
}

async fn write_atomically(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    let written = write_and_sync(&tmp, body).await;
    let result = match written {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(err) => Err(err),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

async fn write_and_sync(tmp: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(body).await?;
    file.sync_all().await
}

fn snapshot_error(path: &Path, err: impl std::fmt::Display) -> PerchError {
    PerchError::Snapshot {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perch_social::twitter::types::AuthorInfo;

    fn post(id: &str, text: &str) -> NormalizedPost {
        NormalizedPost {
            author: AuthorInfo {
                handle: "alice".into(),
                ..Default::default()
            },
            images: vec![],
            videos: vec![],
            post_url: format!("https://x.com/alice/status/{id}"),
            full_text: text.into(),
            metrics: None,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    #[test]
    fn path_is_keyed_by_day() {
        let store = SnapshotStore::new("tweets");
        assert_eq!(store.path_for(day()), PathBuf::from("tweets/2026-10-17.json"));
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.load(day()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn creates_directory_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/tweets")).for_day(day());

        let (path, total) = store.merge_and_write(vec![post("1", "a")]).await.unwrap();
        assert_eq!(total, 1);
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn failed_replace_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // a directory in place of the target makes the final rename fail
        let target = dir.path().join("2026-10-17.json");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), "x").unwrap();

        assert!(write_atomically(&target, b"[]").await.is_err());
        assert!(!target.with_extension("json.tmp").exists());
        assert!(target.join("keep").exists());
    }

    #[tokio::test]
    async fn corrupt_snapshot_fails_and_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).for_day(day());
        let path = store.path_for(day());
        std::fs::write(&path, "[{ truncated").unwrap();

        let err = store.merge_and_write(vec![post("1", "a")]).await.unwrap_err();
        assert!(matches!(err, PerchError::Snapshot { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[{ truncated");
    }
}
