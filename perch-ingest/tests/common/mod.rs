#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use perch_ingest::store::PostStore;
use perch_social::twitter::types::{
    AuthorInfo, EngagementSnapshot, NormalizedItem, NormalizedPost, PostOrigin,
};

pub async fn memory_store() -> PostStore {
    PostStore::connect("sqlite::memory:")
        .await
        .expect("in-memory store")
}

pub fn item(post_id: u64, author_id: Option<u64>, handle: &str, text: &str) -> NormalizedItem {
    NormalizedItem {
        post: NormalizedPost {
            author: AuthorInfo {
                handle: handle.into(),
                display_name: handle.to_uppercase(),
                avatar_url: format!("https://pbs.twimg.com/{handle}.jpg"),
                ..Default::default()
            },
            images: vec![],
            videos: vec![],
            post_url: format!("https://x.com/{handle}/status/{post_id}"),
            full_text: text.into(),
            metrics: Some(EngagementSnapshot {
                impressions: 100,
                reposts: 2,
                likes: 10,
                quotes: 0,
                replies: 1,
            }),
        },
        origin: PostOrigin {
            post_id: Some(post_id),
            author_id,
            created_at: Some(Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap()),
            in_reply_to_post_id: None,
            in_reply_to_author_id: None,
        },
    }
}
