//! Drive engine error types

use sealdrive_crypto::CryptoError;
use sealdrive_store::ApiError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, DriveError>;

/// Broad category of a [`DriveError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Remote API or transport failure, passed through without retry
    Api,
    /// Decryption, signature or hash failure
    Crypto,
    /// Name or draft conflicts and stale etags
    Conflict,
    /// The remote tree is not in the shape the engine expects
    Consistency,
    /// The caller asked for something the node cannot do
    Precondition,
    /// The operation was cancelled
    Cancelled,
    /// Local I/O failure
    Io,
}

/// Drive engine errors
#[derive(Error, Debug)]
pub enum DriveError {
    /// Remote API error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Cryptographic failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A sibling with the same name already exists
    #[error("a file or folder named {name:?} already exists")]
    NameExists { name: String },

    /// The file has a pending draft and replacing drafts is disabled
    #[error("file {name:?} already has a draft revision")]
    DraftExists { name: String },

    /// The node changed remotely since it was read
    #[error("node {link_id} changed since it was read")]
    StaleNode { link_id: String },

    /// A file must have exactly one active revision
    #[error("expected exactly one active revision for {link_id}, found {found}")]
    ActiveRevisionCount { link_id: String, found: usize },

    /// A name collision was reported but no matching node could be found
    #[error("cannot locate an active or draft revision for {name:?}")]
    CantLocateRevision { name: String },

    /// A node the engine relies on is missing
    #[error("missing node: {0}")]
    MissingNode(String),

    /// The parent chain is deeper than allowed or cyclic
    #[error("parent chain of {link_id} exceeds {max} levels or loops")]
    TreeTooDeep { link_id: String, max: usize },

    /// The remote block list does not match what was sent or signed
    #[error("block count mismatch: expected {expected}, got {actual}")]
    BlockCountMismatch { expected: usize, actual: usize },

    /// The node is not a file
    #[error("{0} is not a file")]
    NotAFile(String),

    /// The node is not a folder
    #[error("{0} is not a folder")]
    NotAFolder(String),

    /// The node is not active
    #[error("{0} must be active")]
    MustBeActive(String),

    /// The share root cannot be moved or trashed
    #[error("the share root cannot be modified this way")]
    RootImmutable,

    /// Folder still has children
    #[error("folder {0} is not empty")]
    FolderNotEmpty(String),

    /// Materializing a listing needs a data folder
    #[error("no data folder configured")]
    MissingDataFolder,

    /// The name cannot be used for a node
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// The operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriveError {
    /// The category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api(_) => ErrorKind::Api,
            Self::Crypto(_) => ErrorKind::Crypto,
            Self::NameExists { .. } | Self::DraftExists { .. } | Self::StaleNode { .. } => {
                ErrorKind::Conflict
            }
            Self::ActiveRevisionCount { .. }
            | Self::CantLocateRevision { .. }
            | Self::MissingNode(_)
            | Self::TreeTooDeep { .. }
            | Self::BlockCountMismatch { .. } => ErrorKind::Consistency,
            Self::NotAFile(_)
            | Self::NotAFolder(_)
            | Self::MustBeActive(_)
            | Self::RootImmutable
            | Self::FolderNotEmpty(_)
            | Self::MissingDataFolder
            | Self::InvalidName(_)
            | Self::Config(_) => ErrorKind::Precondition,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Check if this is a "not found" error from the remote store
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Api(ApiError::NotFound(_)) | Self::Api(ApiError::FileNotFound(_))
        ) || matches!(self, Self::MissingNode(_))
    }
}

impl From<config::ConfigError> for DriveError {
    fn from(err: config::ConfigError) -> Self {
        DriveError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for DriveError {
    fn from(err: serde_json::Error) -> Self {
        DriveError::Crypto(CryptoError::from(err))
    }
}
