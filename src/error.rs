//! Error types for the mirrorkit library.
//!
//! All fallible operations return `Result<T, MirrorError>` where `MirrorError`
//! is an enum covering the failure modes of the mirror core: malformed dates,
//! period arithmetic, repository I/O, HTTP transport, and the ledger store.
//!
//! The error types use `thiserror` for clean `Display` implementations and
//! proper `Error` trait support. The sync pipe renders a failed step's error
//! into a single ledger `error` row, so `Display` strings are kept short and
//! lead with the failure kind.

use thiserror::Error;

/// Comprehensive error type for all mirrorkit operations.
///
/// Errors are categorized by their source: calendar parsing and arithmetic,
/// local repository I/O, HTTP transport, template handling, or the ledger
/// backend. Each variant includes the context needed to diagnose the failure,
/// typically the offending string or object URI.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// A date string did not have the `YYYY-MM-DD` shape or named an
    /// impossible or pre-1900 date.
    #[error("bad date: {0}")]
    BadDate(String),

    /// `expand_to_quarter` was asked to widen a period whose end date lies
    /// beyond the quarter enclosing its start date.
    #[error("period too wide: {end} is past the quarter ending {quarter_end}")]
    PeriodTooWide { end: String, quarter_end: String },

    /// A period triple violated `start <= end`.
    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    /// A repository object was expected on disk but is not there.
    #[error("object not found: {0}")]
    NotFound(String),

    /// An exclusive-create write collided with an existing file.
    #[error("object already exists: {0}")]
    AlreadyExists(String),

    /// The operation is not available on this repository flavor, e.g. writing
    /// through a remote (HTTP) tree.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A path/name template referenced a macro nobody can resolve, or cannot
    /// be unambiguously matched back against a stored component.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// An object path could not be interpreted under the repository format.
    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MirrorError>;
