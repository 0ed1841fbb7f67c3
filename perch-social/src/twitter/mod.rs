//! Twitter/X timeline surface consumed by the ingest pipeline.
//!
//! - [`raw`]: path-addressed, never-failing access to raw timeline items
//! - [`extract`]: the normalizer turning a raw item into a [`types::NormalizedItem`]
//! - [`dedup`]: merge + newest-first ordering keyed by status URL
//! - [`client`]: the [`Fetcher`] seam plus HTTP and file-backed implementations
pub mod client;
pub mod dedup;
pub mod extract;
pub mod raw;
pub mod types;

pub use client::{Fetcher, JsonFileFetcher, TimelineApi};
pub use raw::RawItem;
