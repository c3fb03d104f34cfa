//! Error types for the sealdrive-store crate

use thiserror::Error;

/// Result type alias using `ApiError`
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors returned by a remote drive API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Link, revision or block not found
    #[error("not found: {0}")]
    NotFound(String),

    /// A sibling with the same lookup hash already exists
    #[error("a file or folder with that name already exists in {parent_id}")]
    NameExists { parent_id: String },

    /// A file-only operation targeted something that is not a file
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The caller's etag no longer matches the stored link
    #[error("precondition failed on {link_id}: expected etag {expected}, found {actual}")]
    PreconditionFailed {
        link_id: String,
        expected: String,
        actual: String,
    },

    /// The request violates a store rule
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// Create a not found error
    pub fn not_found(what: &str, id: &str) -> Self {
        ApiError::NotFound(format!("{} {}", what, id))
    }

    /// Create an invalid request error
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::InvalidRequest(message.into())
    }
}
