//! File download

use crate::{
    Drive, DriveError, Result,
    cache::KeyBundle,
    cancel::guarded,
    chunks::{DownloadState, DownloadStream},
};
use chrono::{DateTime, Utc};
use sealdrive_store::{Link, Revision, RevisionMetadata, RevisionState};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Extended attributes stored encrypted with every revision
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    /// Plaintext size in bytes
    pub size: u64,
    /// Modification time of the uploaded content
    pub modification_time: DateTime<Utc>,
}

/// A file ready to be read
#[derive(Debug)]
pub struct DownloadedFile {
    /// Verified extended attributes of the active revision
    pub attrs: FileAttributes,
    /// Plaintext content
    pub stream: DownloadStream,
}

impl Drive {
    /// Open the active revision of a file for reading
    ///
    /// The manifest and extended attributes are verified up front; blocks
    /// are fetched and verified as the returned stream is polled.
    #[instrument(skip(self, link, cancel), fields(link_id = %link.id))]
    pub async fn download(
        &self,
        link: &Link,
        cancel: &CancellationToken,
    ) -> Result<DownloadedFile> {
        if !link.is_file() {
            return Err(DriveError::NotAFile(link.id.clone()));
        }
        let keys = self.resolve_keys(link, cancel).await?;
        let content_key = self.content_key(link, &keys)?;

        let revision = self.active_revision(link, cancel).await?;
        let crypto = &self.inner.crypto;
        let verifier = self.inner.identity.verifying_key();

        for (expected, block) in (1u32..).zip(&revision.blocks) {
            if block.index != expected {
                return Err(DriveError::BlockCountMismatch {
                    expected: expected as usize,
                    actual: block.index as usize,
                });
            }
        }
        let manifest: Vec<u8> = revision
            .blocks
            .iter()
            .flat_map(|b| b.hash.iter().copied())
            .collect();
        let manifest_signature = revision
            .metadata
            .manifest_signature
            .as_ref()
            .ok_or_else(|| DriveError::MissingNode(format!("manifest signature of {}", link.id)))?;
        crypto.verify(&verifier, &manifest, manifest_signature)?;

        let attrs = self.read_attributes(&revision.metadata, &keys, &link.id)?;
        debug!(
            revision_id = %revision.metadata.id,
            blocks = revision.blocks.len(),
            size = attrs.size,
            "Opened file"
        );

        let stream = DownloadStream::new(DownloadState {
            api: self.inner.api.clone(),
            crypto: crypto.clone(),
            verifier,
            content_key: Arc::new(content_key),
            node: keys,
            pending: VecDeque::from(revision.blocks),
            batch_size: self.inner.config.download_batch_size,
            cancel: cancel.clone(),
            ready: VecDeque::new(),
        });
        Ok(DownloadedFile { attrs, stream })
    }

    /// Download the whole file into memory
    pub async fn download_bytes(&self, link: &Link, cancel: &CancellationToken) -> Result<Vec<u8>> {
        self.download(link, cancel).await?.stream.collect_bytes().await
    }

    /// Fetch a file by ID, then download it
    pub async fn download_by_id(
        &self,
        link_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadedFile> {
        let link = self.get_link(link_id, cancel).await?;
        self.download(&link, cancel).await
    }

    /// Revision metadata of a file in the order the store returns it
    pub async fn revisions(
        &self,
        link: &Link,
        cancel: &CancellationToken,
    ) -> Result<Vec<RevisionMetadata>> {
        if !link.is_file() {
            return Err(DriveError::NotAFile(link.id.clone()));
        }
        guarded(cancel, self.inner.api.list_revisions(&link.id)).await
    }

    /// The single active revision of a file, with its blocks
    pub async fn active_revision(
        &self,
        link: &Link,
        cancel: &CancellationToken,
    ) -> Result<Revision> {
        let revisions = self.revisions(link, cancel).await?;
        let active: Vec<&RevisionMetadata> = revisions
            .iter()
            .filter(|r| r.state == RevisionState::Active)
            .collect();
        let [revision] = active.as_slice() else {
            return Err(DriveError::ActiveRevisionCount {
                link_id: link.id.clone(),
                found: active.len(),
            });
        };
        guarded(cancel, self.inner.api.get_revision(&link.id, &revision.id)).await
    }

    fn read_attributes(
        &self,
        metadata: &RevisionMetadata,
        keys: &KeyBundle,
        link_id: &str,
    ) -> Result<FileAttributes> {
        let missing = || DriveError::MissingNode(format!("extended attributes of {link_id}"));
        let sealed = metadata.xattr.as_ref().ok_or_else(missing)?;
        let signature = metadata.xattr_signature.as_ref().ok_or_else(missing)?;

        let crypto = &self.inner.crypto;
        let plain = crypto.open(sealed, keys.keypair())?;
        crypto.verify(&self.inner.identity.verifying_key(), &plain, signature)?;
        Ok(serde_json::from_slice(&plain)?)
    }
}
