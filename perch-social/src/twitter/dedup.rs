//! Merge previously stored posts with a fresh batch, newest first.
//!
//! Status ids grow with creation time, so ordering by the id in `postUrl`
//! orders by recency. Ids are compared by magnitude: `100 > 10 > 9`.
use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use crate::twitter::types::NormalizedPost;

/// Union keyed by `post_url`; `incoming` replaces `previous` wholesale on
/// collision. Output is sorted newest first.
pub fn merge_posts(
    previous: Vec<NormalizedPost>,
    incoming: Vec<NormalizedPost>,
) -> Vec<NormalizedPost> {
    let previous_len = previous.len();
    let incoming_len = incoming.len();

    let mut by_url: HashMap<String, NormalizedPost> =
        HashMap::with_capacity(previous_len + incoming_len);
    for post in previous.into_iter().chain(incoming) {
        by_url.insert(post.post_url.clone(), post);
    }

    let mut merged: Vec<NormalizedPost> = by_url.into_values().collect();
    merged.sort_by(newest_first);

    debug!(
        previous = previous_len,
        incoming = incoming_len,
        merged = merged.len(),
        "social.dedup.merged"
    );
    merged
}

/// Descending by status id, then ascending by URL so the order is total.
pub fn newest_first(a: &NormalizedPost, b: &NormalizedPost) -> Ordering {
    compare_status_ids(&b.status_id(), &a.status_id()).then_with(|| a.post_url.cmp(&b.post_url))
}

/// Magnitude-aware comparison of decimal id strings of any length.
///
/// Non-numeric ids rank below every numeric id.
pub fn compare_status_ids(a: &str, b: &str) -> Ordering {
    match (digits(a), digits(b)) {
        (Some(x), Some(y)) => x.len().cmp(&y.len()).then_with(|| x.cmp(y)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

fn digits(id: &str) -> Option<&str> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(id.trim_start_matches('0'))
}
