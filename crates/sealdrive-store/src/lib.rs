//! # SealDrive Store
//!
//! The remote side of the encrypted drive as seen by the engine.
//!
//! This crate provides:
//! - **Data model**: links, revisions, blocks and request payloads
//! - **DriveApi**: the async trait every remote backend implements
//! - **MemoryDriveApi**: an in-memory backend that enforces the store's rules
//!
//! The store never sees plaintext. Names travel encrypted, collisions are
//! detected through keyed lookup hashes, and blocks are opaque ciphertexts.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sealdrive_store::{DriveApi, MemoryDriveApi};
//!
//! let api = MemoryDriveApi::new();
//! let share = api.init_root(root_request)?;
//! let children = api.list_children(&share.root_link_id, false).await?;
//! ```

pub mod error;
pub mod memory;
pub mod types;

pub use error::{ApiError, Result};
pub use memory::{CallCounts, MemoryDriveApi};
pub use types::{
    Block, BlockUploadInfo, BlockUploadLink, BlockUploadRequest, CommitRevisionRequest,
    CreateFileRequest, CreateFileResponse, CreateFolderRequest, FileProperties,
    FolderProperties, Link, LinkState, LinkType, MoveLinkRequest, Revision, RevisionMetadata,
    RevisionState, Share,
};

use async_trait::async_trait;
use bytes::Bytes;

/// Remote drive operations
///
/// Implementations own transport, pagination and retries. Every method maps
/// to one logical remote call.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Get the share the account works in
    async fn get_share_root(&self) -> Result<Share>;

    /// Fetch a link by ID
    async fn get_link(&self, link_id: &str) -> Result<Link>;

    /// List the children of a folder. Draft and active children are always
    /// returned; trashed children only when `show_all` is set.
    async fn list_children(&self, folder_id: &str, show_all: bool) -> Result<Vec<Link>>;

    /// Create a file link in draft state together with its first draft revision
    async fn create_file(&self, request: CreateFileRequest) -> Result<CreateFileResponse>;

    /// Create a folder link, returning its ID
    async fn create_folder(&self, request: CreateFolderRequest) -> Result<String>;

    /// Create a new draft revision on an existing file
    async fn create_revision(&self, link_id: &str) -> Result<String>;

    /// Delete a draft revision
    async fn delete_revision(&self, link_id: &str, revision_id: &str) -> Result<()>;

    /// List revision metadata of a file
    async fn list_revisions(&self, link_id: &str) -> Result<Vec<RevisionMetadata>>;

    /// Fetch a revision with all of its blocks
    async fn get_revision(&self, link_id: &str, revision_id: &str) -> Result<Revision>;

    /// Register a batch of blocks and obtain one upload token per block
    async fn request_block_upload(
        &self,
        request: BlockUploadRequest,
    ) -> Result<Vec<BlockUploadLink>>;

    /// Upload block ciphertext against a token
    async fn upload_block(&self, token: &str, data: Bytes) -> Result<()>;

    /// Download block ciphertext
    async fn get_block(&self, token: &str) -> Result<Bytes>;

    /// Commit a draft revision, making it the active one
    async fn commit_revision(
        &self,
        link_id: &str,
        revision_id: &str,
        request: CommitRevisionRequest,
    ) -> Result<()>;

    /// Move and/or rename a link
    async fn move_link(&self, link_id: &str, request: MoveLinkRequest) -> Result<()>;

    /// Move children of a folder to the trash
    async fn trash_children(&self, parent_id: &str, link_ids: &[String]) -> Result<()>;

    /// Permanently delete children of a folder
    async fn delete_children(&self, parent_id: &str, link_ids: &[String]) -> Result<()>;

    /// Permanently delete everything in the trash
    async fn empty_trash(&self) -> Result<()>;
}
