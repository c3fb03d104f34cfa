//! # SealDrive Client
//!
//! The engine of an end-to-end encrypted drive. Every name, key and block is
//! encrypted and signed on this side; the remote store only ever sees
//! ciphertext, lookup hashes and etags.
//!
//! ## Features
//!
//! - **Key resolution**: node keys unlocked along the parent chain and cached per etag
//! - **Chunked transfer**: bounded-concurrency block encryption with an ordered, signed manifest
//! - **Streaming download**: pull-based block stream with per-block hash and signature checks
//! - **Tree operations**: move/rename with passphrase re-wrapping, listings, search, trash
//!
//! ## Example
//!
//! ```rust,ignore
//! use sealdrive_client::{Config, Drive, Identity};
//! use sealdrive_crypto::DefaultCryptoProvider;
//! use sealdrive_store::MemoryDriveApi;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let crypto = Arc::new(DefaultCryptoProvider::new());
//!     let identity = Identity::generate("me@example.com");
//!     let api = MemoryDriveApi::new();
//!     api.init_root(identity.root_folder_request(crypto.as_ref(), "root")?)?;
//!
//!     let drive = Drive::connect(Arc::new(api), crypto, identity, Config::default()).await?;
//!     let cancel = CancellationToken::new();
//!
//!     let root = drive.root_link(&cancel).await?;
//!     let file = drive.upload_bytes(&root, "hello.txt", &b"Hello, World!"[..], &cancel).await?;
//!     let data = drive.download_bytes(&file, &cancel).await?;
//!     println!("Content: {}", String::from_utf8_lossy(&data));
//!     Ok(())
//! }
//! ```

mod cache;
mod cancel;
mod chunks;
mod codec;
mod config;
mod download;
mod drive;
mod error;
mod folder;
mod identity;
mod keyring;
mod moves;
mod upload;
mod walker;

pub use cache::{CacheEntry, KeyBundle, KeyedCache};
pub use cancel::deadline_token;
pub use chunks::DownloadStream;
pub use codec::validate_name;
pub use config::{Config, DEFAULT_CHUNK_SIZE, ENV_PREFIX};
pub use download::{DownloadedFile, FileAttributes};
pub use drive::Drive;
pub use error::{DriveError, ErrorKind, Result};
pub use identity::Identity;
pub use keyring::MAX_TREE_DEPTH;
pub use upload::{
    DEFAULT_MIME_TYPE, UploadOutcome, UploadStage, UploadStopPoint, detect_mime_type,
};
pub use walker::{DirectoryEntry, ListOptions};

pub use tokio_util::sync::CancellationToken;
