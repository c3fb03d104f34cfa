//! Drive engine configuration

use crate::{DriveError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default plaintext chunk size (4 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Environment variable prefix for [`Config::load`]
pub const ENV_PREFIX: &str = "SEALDRIVE";

/// Drive engine configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Plaintext bytes per block
    pub chunk_size: usize,
    /// Blocks encrypted before one upload-token request
    pub upload_batch_size: usize,
    /// Concurrent block encryptions across the whole drive
    pub encryption_concurrency: usize,
    /// Blocks fetched per refill of a download stream
    pub download_batch_size: usize,
    /// Delete a pending draft instead of failing with `DraftExists`
    pub replace_existing_draft: bool,
    /// Skip the key cache entirely
    pub disable_caching: bool,
    /// Local folder that recursive listings materialize into
    pub data_folder: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            upload_batch_size: 10,
            encryption_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            download_batch_size: 4,
            replace_existing_draft: false,
            disable_caching: false,
            data_folder: None,
        }
    }
}

impl Config {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from an optional TOML file, overridden by `SEALDRIVE_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let config: Config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DriveError::Config("chunk_size must be positive".into()));
        }
        if self.upload_batch_size == 0 {
            return Err(DriveError::Config("upload_batch_size must be positive".into()));
        }
        if self.encryption_concurrency == 0 {
            return Err(DriveError::Config(
                "encryption_concurrency must be positive".into(),
            ));
        }
        if self.download_batch_size == 0 {
            return Err(DriveError::Config("download_batch_size must be positive".into()));
        }
        Ok(())
    }

    /// Set the chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the upload batch size
    pub fn with_upload_batch_size(mut self, batch: usize) -> Self {
        self.upload_batch_size = batch;
        self
    }

    /// Set the number of concurrent block encryptions
    pub fn with_encryption_concurrency(mut self, permits: usize) -> Self {
        self.encryption_concurrency = permits;
        self
    }

    /// Set the download batch size
    pub fn with_download_batch_size(mut self, batch: usize) -> Self {
        self.download_batch_size = batch;
        self
    }

    /// Replace pending drafts on upload
    pub fn with_replace_existing_draft(mut self, replace: bool) -> Self {
        self.replace_existing_draft = replace;
        self
    }

    /// Disable the key cache
    pub fn without_caching(mut self) -> Self {
        self.disable_caching = true;
        self
    }

    /// Set the data folder
    pub fn with_data_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.data_folder = Some(folder.into());
        self
    }
}
