//! Shared types and utilities for the Perch workspace.
//!
//! This crate carries the pieces every other Perch crate needs: the shared
//! error type and the tracing initialisation used by the binary and by
//! integration tests. It stays dependency-light so the domain crates can pull
//! it in without dragging along storage or HTTP stacks.
//!
//! # Overview
//!
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`PerchError`] and [`Result`]: Shared error handling
//!
//! # Examples
//!
//! ```rust
//! use perch_common::PerchError;
//!
//! let err = PerchError::Config("sink.kind is missing".into());
//! assert_eq!(err.to_string(), "Configuration error: sink.kind is missing");
//! ```

pub mod observability;

/// Error types used across the Perch pipeline.
///
/// Data-quality problems on a single post never surface here; they are logged
/// and the post is skipped. Anything that reaches this enum ends the run.
#[derive(thiserror::Error, Debug)]
pub enum PerchError {
    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The timeline fetcher failed to produce raw items.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The relational store rejected a statement or the transaction failed.
    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),

    /// Reading, decoding or replacing a snapshot file failed.
    #[error("Snapshot error at {path}: {message}")]
    Snapshot { path: String, message: String },

    /// JSON could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenient alias for results that use [`PerchError`].
pub type Result<T> = std::result::Result<T, PerchError>;
