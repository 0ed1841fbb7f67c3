//! Social timeline clients and extractors used by Perch.
//!
//! Only the Twitter/X home timeline is implemented. Raw page elements enter
//! through a [`twitter::Fetcher`], are flattened by [`twitter::extract`] and
//! merged by [`twitter::dedup`] before a sink in `perch-ingest` stores them.
pub mod twitter;
