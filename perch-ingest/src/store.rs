//! SQLite-backed relational sink for authors, posts, and engagement metrics.
//!
//! A batch is written through one [`UnitOfWork`]: authors are upserted on
//! their external id, posts are inserted once and never rewritten, and every
//! run appends a fresh engagement row per post. A post missing its identity is
//! skipped with a warning; any storage error rolls the whole batch back.
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use perch_common::PerchError;
use perch_social::twitter::types::{AuthorInfo, EngagementSnapshot, NormalizedItem};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};
use tracing::{debug, error, info, warn};

use crate::{PersistReport, Persister};

pub struct PostStore {
    pool: SqlitePool,
}

impl PostStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `database_url` and make sure
    /// the schema exists. Runs are sequential, so one connection is enough;
    /// it also keeps `sqlite::memory:` databases alive for the pool's lifetime.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url: {database_url}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database: {database_url}"))?;

        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<UnitOfWork> {
        let tx = self.pool.begin().await.context("failed to open transaction")?;
        Ok(UnitOfWork {
            tx,
            now: Utc::now(),
        })
    }

    /// Write `items` atomically. Skipped posts are counted, not fatal.
    pub async fn persist_batch(&self, items: &[NormalizedItem]) -> Result<PersistReport> {
        let mut report = PersistReport {
            sink: SQLITE_SINK,
            received: items.len(),
            ..Default::default()
        };

        let mut uow = self.begin().await?;
        for (index, item) in items.iter().enumerate() {
            match uow.apply(item).await {
                Ok(Outcome::Stored { metrics_appended }) => {
                    report.persisted += 1;
                    if metrics_appended {
                        report.metrics_appended += 1;
                    }
                }
                Ok(Outcome::Skipped(reason)) => {
                    report.skipped += 1;
                    warn!(
                        index,
                        post_url = %item.post.post_url,
                        handle = %item.post.author.handle,
                        reason = reason.as_str(),
                        "ingest.store.post_skipped"
                    );
                }
                Err(err) => {
                    error!(
                        index,
                        post_url = %item.post.post_url,
                        error = ?err,
                        "ingest.store.batch_failed"
                    );
                    if let Err(rollback_err) = uow.rollback().await {
                        error!(error = ?rollback_err, "ingest.store.rollback_failed");
                    }
                    return Err(err);
                }
            }
        }
        uow.commit().await?;

        info!(
            received = report.received,
            persisted = report.persisted,
            skipped = report.skipped,
            metrics = report.metrics_appended,
            "ingest.store.batch_committed"
        );
        Ok(report)
    }

    pub async fn count_rows(&self, table: Table) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
        let n = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn author_by_external_id(&self, external_id: i64) -> Result<Option<AuthorRow>> {
        let row = sqlx::query_as::<_, AuthorRow>(
            r#"SELECT id, external_id, username, display_name, avatar_url,
                      created_at, updated_at, is_bot
               FROM authors WHERE external_id = ?"#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn post_by_id(&self, id: i64) -> Result<Option<PostRow>> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"SELECT id, author_ref, content, created_at, created_at_epoch,
                      is_reply, reply_to_post_id, reply_to_author_id
               FROM posts WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn metrics_for_post(&self, post_id: i64) -> Result<Vec<MetricRow>> {
        let rows = sqlx::query_as::<_, MetricRow>(
            r#"SELECT id, post_id, impressions, reposts, likes, replies, quotes, collected_at
               FROM engagement_metrics WHERE post_id = ? ORDER BY id ASC"#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

const SQLITE_SINK: &str = "sqlite";

#[async_trait]
impl Persister for PostStore {
    fn name(&self) -> &'static str {
        SQLITE_SINK
    }

    async fn persist(&self, batch: Vec<NormalizedItem>) -> perch_common::Result<PersistReport> {
        self.persist_batch(&batch).await.map_err(PerchError::Storage)
    }
}

/// One transaction spanning a batch. Dropping it without [`commit`](Self::commit)
/// rolls back.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    now: DateTime<Utc>,
}

enum Outcome {
    Stored { metrics_appended: bool },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingPostId,
    MissingCreatedAt,
    MissingAuthorId,
    IdOutOfRange,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingPostId => "missing_post_id",
            SkipReason::MissingCreatedAt => "missing_created_at",
            SkipReason::MissingAuthorId => "missing_author_id",
            SkipReason::IdOutOfRange => "id_out_of_range",
        }
    }
}

/// Insert payload for the `posts` table.
#[derive(Debug, Clone)]
pub struct NewPost<'a> {
    pub id: i64,
    pub author_ref: i64,
    pub content: &'a str,
    pub created_at: DateTime<Utc>,
    pub reply_to_post_id: Option<i64>,
    pub reply_to_author_id: Option<i64>,
}

impl UnitOfWork {
    /// Timestamp stamped on every row written by this unit of work.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    async fn apply(&mut self, item: &NormalizedItem) -> Result<Outcome> {
        let origin = &item.origin;
        let Some(post_id) = origin.post_id else {
            return Ok(Outcome::Skipped(SkipReason::MissingPostId));
        };
        let Some(created_at) = origin.created_at else {
            return Ok(Outcome::Skipped(SkipReason::MissingCreatedAt));
        };
        let Some(author_id) = origin.author_id else {
            return Ok(Outcome::Skipped(SkipReason::MissingAuthorId));
        };
        let (Ok(post_id), Ok(author_id)) = (i64::try_from(post_id), i64::try_from(author_id)) else {
            return Ok(Outcome::Skipped(SkipReason::IdOutOfRange));
        };

        let author_ref = self.upsert_author(author_id, &item.post.author).await?;
        let inserted = self
            .insert_post(&NewPost {
                id: post_id,
                author_ref,
                content: &item.post.full_text,
                created_at,
                reply_to_post_id: origin.in_reply_to_post_id.and_then(|v| i64::try_from(v).ok()),
                reply_to_author_id: origin
                    .in_reply_to_author_id
                    .and_then(|v| i64::try_from(v).ok()),
            })
            .await?;
        debug!(post_id, author_ref, inserted, "ingest.store.post");

        let metrics_appended = match &item.post.metrics {
            Some(metrics) => {
                self.append_metrics(post_id, metrics).await?;
                true
            }
            None => false,
        };
        Ok(Outcome::Stored { metrics_appended })
    }

    /// Insert or refresh an author; returns the surrogate row id either way.
    pub async fn upsert_author(&mut self, external_id: i64, author: &AuthorInfo) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO authors
               (external_id, username, display_name, avatar_url, created_at, updated_at, is_bot)
               VALUES (?1, ?2, ?3, ?4, ?5, ?5, 0)
               ON CONFLICT(external_id) DO UPDATE SET
                 username=excluded.username,
                 display_name=excluded.display_name,
                 avatar_url=excluded.avatar_url,
                 updated_at=excluded.updated_at
               RETURNING id"#,
        )
        .bind(external_id)
        .bind(author.handle.as_str())
        .bind(author.display_name.as_str())
        .bind(author.avatar_url.as_str())
        .bind(self.now)
        .fetch_one(&mut *self.tx)
        .await
        .with_context(|| format!("upsert author {external_id}"))?;
        Ok(id)
    }

    /// Returns `false` when the post already exists; its content is left as is.
    pub async fn insert_post(&mut self, post: &NewPost<'_>) -> Result<bool> {
        let res = sqlx::query(
            r#"INSERT INTO posts
               (id, author_ref, content, created_at, created_at_epoch,
                is_reply, reply_to_post_id, reply_to_author_id)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(post.id)
        .bind(post.author_ref)
        .bind(post.content)
        .bind(post.created_at)
        .bind(post.created_at.timestamp_millis())
        .bind(post.reply_to_post_id.is_some())
        .bind(post.reply_to_post_id)
        .bind(post.reply_to_author_id)
        .execute(&mut *self.tx)
        .await
        .with_context(|| format!("insert post {}", post.id))?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn append_metrics(&mut self, post_id: i64, m: &EngagementSnapshot) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO engagement_metrics
               (post_id, impressions, reposts, likes, replies, quotes, collected_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        )
        .bind(post_id)
        .bind(saturating_i64(m.impressions))
        .bind(saturating_i64(m.reposts))
        .bind(saturating_i64(m.likes))
        .bind(saturating_i64(m.replies))
        .bind(saturating_i64(m.quotes))
        .bind(self.now)
        .execute(&mut *self.tx)
        .await
        .with_context(|| format!("append metrics for post {post_id}"))?;
        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("commit failed")
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.context("rollback failed")
    }
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone, Copy)]
pub enum Table {
    Authors,
    Posts,
    EngagementMetrics,
}

impl Table {
    fn as_str(&self) -> &'static str {
        match self {
            Table::Authors => "authors",
            Table::Posts => "posts",
            Table::EngagementMetrics => "engagement_metrics",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AuthorRow {
    pub id: i64,
    pub external_id: i64,
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_bot: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: i64,
    pub author_ref: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub created_at_epoch: i64,
    pub is_reply: bool,
    pub reply_to_post_id: Option<i64>,
    pub reply_to_author_id: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MetricRow {
    pub id: i64,
    pub post_id: i64,
    pub impressions: i64,
    pub reposts: i64,
    pub likes: i64,
    pub replies: i64,
    pub quotes: i64,
    pub collected_at: DateTime<Utc>,
}

/// Create the three tables if they do not exist yet.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id INTEGER NOT NULL UNIQUE,
            username TEXT NOT NULL,
            display_name TEXT NOT NULL,
            avatar_url TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            is_bot INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY,
            author_ref INTEGER NOT NULL REFERENCES authors(id),
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            created_at_epoch INTEGER NOT NULL,
            is_reply INTEGER NOT NULL DEFAULT 0,
            reply_to_post_id INTEGER,
            reply_to_author_id INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS engagement_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL REFERENCES posts(id),
            impressions INTEGER NOT NULL DEFAULT 0,
            reposts INTEGER NOT NULL DEFAULT 0,
            likes INTEGER NOT NULL DEFAULT 0,
            replies INTEGER NOT NULL DEFAULT 0,
            quotes INTEGER NOT NULL DEFAULT 0,
            collected_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_engagement_metrics_post ON engagement_metrics(post_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
