use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Flattened post as written to day snapshots.
///
/// Field names on the wire follow the existing snapshot files
/// (`user`, `tweetUrl`, `fullText`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPost {
    #[serde(rename = "user")]
    pub author: AuthorInfo,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(rename = "tweetUrl")]
    pub post_url: String,
    #[serde(rename = "fullText", default)]
    pub full_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<EngagementSnapshot>,
}

impl NormalizedPost {
    /// Last path segment of `post_url`, i.e. the status id as text.
    pub fn status_id(&self) -> String {
        match Url::parse(&self.post_url) {
            Ok(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_owned))
                .unwrap_or_default(),
            Err(_) => self
                .post_url
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_owned(),
        }
    }
}

/// Author state as observed at fetch time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorInfo {
    #[serde(rename = "screenName")]
    pub handle: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "profileImageUrl")]
    pub avatar_url: String,
    #[serde(rename = "description")]
    pub bio: String,
    #[serde(rename = "followersCount")]
    pub follower_count: u64,
    #[serde(rename = "friendsCount")]
    pub following_count: u64,
    pub location: String,
}

/// Point-in-time engagement counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementSnapshot {
    #[serde(rename = "impressionCount")]
    pub impressions: u64,
    #[serde(rename = "retweetCount")]
    pub reposts: u64,
    #[serde(rename = "likeCount")]
    pub likes: u64,
    #[serde(rename = "quoteCount")]
    pub quotes: u64,
    #[serde(rename = "replyCount")]
    pub replies: u64,
}

/// Identity facts read from the raw item that only the relational sink needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostOrigin {
    pub post_id: Option<u64>,
    pub author_id: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub in_reply_to_post_id: Option<u64>,
    pub in_reply_to_author_id: Option<u64>,
}

impl PostOrigin {
    pub fn is_reply(&self) -> bool {
        self.in_reply_to_post_id.is_some()
    }
}

/// Normalizer output: the snapshot record plus its raw identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedItem {
    pub post: NormalizedPost,
    pub origin: PostOrigin,
}
