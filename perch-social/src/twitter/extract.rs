//! Normalizer: raw home-timeline item -> [`NormalizedItem`].
//!
//! Inclusion filters run first (referenced/quote posts, retweet text, age),
//! then author, media, engagement counters and identity are read through the
//! [`raw`](super::raw) accessor so a missing field always yields its default.
//! Nothing here performs I/O; the current instant is passed in.
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::twitter::raw::{self, RawItem};
use crate::twitter::types::{
    AuthorInfo, EngagementSnapshot, NormalizedItem, NormalizedPost, PostOrigin,
};

pub const RETWEET_MARKER: &str = "RT @";
pub const STATUS_HOST: &str = "x.com";
const MP4_CONTENT_TYPE: &str = "video/mp4";
/// `createdAt` as emitted by the legacy tweet object, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
const LEGACY_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

mod paths {
    pub const REFERENCED: &str = "tweet.referenced_tweets";
    pub const IS_QUOTE: &str = "raw.result.legacy.isQuoteStatus";
    pub const FULL_TEXT: &str = "raw.result.legacy.fullText";
    pub const CREATED_AT: &str = "raw.result.legacy.createdAt";
    pub const ID_STR: &str = "raw.result.legacy.idStr";
    pub const REST_ID: &str = "raw.result.restId";
    pub const LEGACY_USER_ID: &str = "raw.result.legacy.userIdStr";
    pub const USER_REST_ID: &str = "user.restId";
    pub const REPLY_TO_STATUS: &str = "raw.result.legacy.inReplyToStatusIdStr";
    pub const REPLY_TO_USER: &str = "raw.result.legacy.inReplyToUserIdStr";
    pub const MEDIA: &str = "raw.result.legacy.extendedEntities.media";

    pub const SCREEN_NAME: &str = "user.legacy.screenName";
    pub const NAME: &str = "user.legacy.name";
    pub const AVATAR: &str = "user.legacy.profileImageUrlHttps";
    pub const DESCRIPTION: &str = "user.legacy.description";
    pub const FOLLOWERS: &str = "user.legacy.followersCount";
    pub const FRIENDS: &str = "user.legacy.friendsCount";
    pub const LOCATION: &str = "user.legacy.location";

    pub const VIEWS: &str = "raw.result.views.count";
    pub const RETWEETS: &str = "raw.result.legacy.retweetCount";
    pub const FAVORITES: &str = "raw.result.legacy.favoriteCount";
    pub const QUOTES: &str = "raw.result.legacy.quoteCount";
    pub const REPLIES: &str = "raw.result.legacy.replyCount";
}

/// Caller-chosen inclusion filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Keep quote posts and posts that reference other posts.
    pub include_referenced: bool,
    /// Keep posts whose text starts with [`RETWEET_MARKER`].
    pub include_retweet_text: bool,
    /// Drop posts older than this many whole days.
    pub max_age_days: Option<i64>,
}

/// Why an item was filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    Referenced,
    Retweet,
    TooOld,
}

/// Inclusion predicate, evaluated in a fixed order.
pub fn exclusion(item: &RawItem, opts: &NormalizeOptions, now: DateTime<Utc>) -> Option<Exclusion> {
    if !opts.include_referenced
        && (item.get_bool(paths::IS_QUOTE, false) || !item.get_array(paths::REFERENCED).is_empty())
    {
        return Some(Exclusion::Referenced);
    }
    if !opts.include_retweet_text && item.get_str(paths::FULL_TEXT, "").starts_with(RETWEET_MARKER) {
        return Some(Exclusion::Retweet);
    }
    if let Some(max_days) = opts.max_age_days {
        // unknown age never excludes
        let created = parse_created_at(&item.get_str(paths::CREATED_AT, ""));
        if created.is_some_and(|at| (now - at).num_days() > max_days) {
            return Some(Exclusion::TooOld);
        }
    }
    None
}

pub fn normalize_item(
    item: &RawItem,
    opts: &NormalizeOptions,
    now: DateTime<Utc>,
) -> Option<NormalizedItem> {
    if let Some(reason) = exclusion(item, opts, now) {
        debug!(
            reason = ?reason,
            id = %item.get_str(paths::ID_STR, ""),
            "social.extract.filtered"
        );
        return None;
    }

    let author = extract_author(item);
    let post_id = item
        .get_id(paths::ID_STR)
        .or_else(|| item.get_id(paths::REST_ID));
    let id_text = post_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| item.get_str(paths::ID_STR, ""));
    let post_url = status_url(&author.handle, &id_text);
    let (images, videos) = extract_media(item.get_array(paths::MEDIA), &post_url);

    let origin = PostOrigin {
        post_id,
        author_id: item
            .get_id(paths::LEGACY_USER_ID)
            .or_else(|| item.get_id(paths::USER_REST_ID)),
        created_at: parse_created_at(&item.get_str(paths::CREATED_AT, "")),
        in_reply_to_post_id: item.get_id(paths::REPLY_TO_STATUS),
        in_reply_to_author_id: item.get_id(paths::REPLY_TO_USER),
    };

    Some(NormalizedItem {
        post: NormalizedPost {
            author,
            images,
            videos,
            post_url,
            full_text: item.get_str(paths::FULL_TEXT, ""),
            metrics: Some(extract_metrics(item)),
        },
        origin,
    })
}

/// Normalize a page in input order, dropping filtered items.
pub fn normalize_batch(
    items: &[RawItem],
    opts: &NormalizeOptions,
    now: DateTime<Utc>,
) -> Vec<NormalizedItem> {
    let normalized: Vec<NormalizedItem> = items
        .iter()
        .filter_map(|item| normalize_item(item, opts, now))
        .collect();
    info!(
        received = items.len(),
        kept = normalized.len(),
        filtered = items.len() - normalized.len(),
        "social.extract.batch"
    );
    normalized
}

pub fn status_url(handle: &str, id: &str) -> String {
    format!("https://{STATUS_HOST}/{handle}/status/{id}")
}

/// Parse the legacy timestamp format, falling back to RFC 3339.
pub fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_str(raw, LEGACY_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn extract_author(item: &RawItem) -> AuthorInfo {
    AuthorInfo {
        handle: item.get_str(paths::SCREEN_NAME, ""),
        display_name: item.get_str(paths::NAME, ""),
        avatar_url: item.get_str(paths::AVATAR, ""),
        bio: item.get_str(paths::DESCRIPTION, ""),
        follower_count: item.get_u64(paths::FOLLOWERS, 0),
        following_count: item.get_u64(paths::FRIENDS, 0),
        location: item.get_str(paths::LOCATION, ""),
    }
}

fn extract_metrics(item: &RawItem) -> EngagementSnapshot {
    EngagementSnapshot {
        impressions: item.get_u64(paths::VIEWS, 0),
        reposts: item.get_u64(paths::RETWEETS, 0),
        likes: item.get_u64(paths::FAVORITES, 0),
        quotes: item.get_u64(paths::QUOTES, 0),
        replies: item.get_u64(paths::REPLIES, 0),
    }
}

fn extract_media(media: &[Value], post_url: &str) -> (Vec<String>, Vec<String>) {
    let mut images = Vec::new();
    let mut videos = Vec::new();
    for entry in media {
        match raw::get(entry, "type", String::new()).as_str() {
            "photo" => {
                let url: String = raw::get(entry, "mediaUrlHttps", String::new());
                if !url.is_empty() {
                    images.push(url);
                }
            }
            "video" | "animated_gif" => {
                match best_mp4_variant(raw::get_array(entry, "videoInfo.variants")) {
                    Some(url) => videos.push(url),
                    None => debug!(post_url, "social.extract.no_mp4_variant"),
                }
            }
            _ => {}
        }
    }
    (images, videos)
}

/// Highest-bitrate `video/mp4` variant URL. Missing bitrate counts as 0.
pub fn best_mp4_variant(variants: &[Value]) -> Option<String> {
    variants
        .iter()
        .filter(|v| raw::get(v, "contentType", String::new()) == MP4_CONTENT_TYPE)
        .filter_map(|v| {
            let url: String = raw::get(v, "url", String::new());
            (!url.is_empty()).then(|| (raw::get(v, "bitrate", 0u64), url))
        })
        .max_by_key(|(bitrate, _)| *bitrate)
        .map(|(_, url)| url)
}
