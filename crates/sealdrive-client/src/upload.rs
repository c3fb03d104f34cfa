//! File upload
//!
//! An upload moves through [`UploadStage`]s: a draft is created (or an
//! existing node is reused after a name collision), its blocks are uploaded
//! and the revision is committed. Interrupted uploads are never resumed; a
//! retry starts over and deals with the leftover draft through the
//! collision branch.

use crate::{
    Drive, DriveError, Result,
    cache::KeyBundle,
    cancel::{ensure_active, guarded},
    chunks::BlockTarget,
    download::FileAttributes,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sealdrive_crypto::DekKey;
use sealdrive_store::{
    ApiError, CommitRevisionRequest, CreateFileRequest, Link, LinkState, RevisionState,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// MIME type used when the name has no recognizable extension
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// How far an upload got
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum UploadStage {
    NoDraft,
    DraftCreated,
    BlocksUploaded,
    Committed,
}

/// Where [`Drive::upload_until`] stops
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStopPoint {
    /// After the draft exists, before any block is sent
    DraftCreated,
    /// After every block is uploaded, before the commit
    BlocksUploaded,
    /// Run to completion
    Committed,
}

/// Result of an upload
#[derive(Clone, Debug)]
pub struct UploadOutcome {
    /// Latest known snapshot of the file node
    pub link: Link,
    /// Revision the content went into
    pub revision_id: String,
    /// Stage reached
    pub stage: UploadStage,
    /// Plaintext bytes uploaded
    pub size: u64,
    /// Number of blocks uploaded
    pub blocks: usize,
}

/// The draft revision an upload writes into
struct Draft {
    link_id: String,
    revision_id: String,
    keys: Arc<KeyBundle>,
    content_key: Arc<DekKey>,
}

/// Node material generated for a brand new file
struct FreshFile {
    request: CreateFileRequest,
    keys: Arc<KeyBundle>,
    content_key: DekKey,
}

/// MIME type guessed from the name's extension
pub fn detect_mime_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string()
}

impl Drive {
    /// Upload everything `reader` yields as file `name` in `parent`
    pub async fn upload_reader<R>(
        &self,
        parent: &Link,
        name: &str,
        reader: &mut R,
        cancel: &CancellationToken,
    ) -> Result<Link>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let outcome = self
            .upload_inner(parent, name, reader, Utc::now(), UploadStopPoint::Committed, cancel)
            .await?;
        Ok(outcome.link)
    }

    /// Upload an in-memory buffer as file `name` in `parent`
    pub async fn upload_bytes(
        &self,
        parent: &Link,
        name: &str,
        data: impl Into<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<Link> {
        let data: Bytes = data.into();
        let mut reader: &[u8] = &data[..];
        self.upload_reader(parent, name, &mut reader, cancel).await
    }

    /// Upload a local file into `parent` under its own file name
    ///
    /// The modification time is taken from the file's metadata.
    pub async fn upload_path(
        &self,
        parent: &Link,
        path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<Link> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DriveError::InvalidName(path.display().to_string()))?;

        let metadata = tokio::fs::metadata(path).await?;
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let mut file = tokio::fs::File::open(path).await?;

        let outcome = self
            .upload_inner(parent, name, &mut file, modified, UploadStopPoint::Committed, cancel)
            .await?;
        Ok(outcome.link)
    }

    /// Upload, stopping at `stop`
    ///
    /// Stopping early leaves an uncommitted draft behind, exactly like an
    /// upload that was interrupted at that point.
    pub async fn upload_until<R>(
        &self,
        parent: &Link,
        name: &str,
        reader: &mut R,
        stop: UploadStopPoint,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        self.upload_inner(parent, name, reader, Utc::now(), stop, cancel)
            .await
    }

    #[instrument(skip(self, parent, reader, cancel), fields(parent_id = %parent.id))]
    async fn upload_inner<R>(
        &self,
        parent: &Link,
        name: &str,
        reader: &mut R,
        modification_time: DateTime<Utc>,
        stop: UploadStopPoint,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        ensure_active(cancel)?;
        if !parent.is_folder() {
            return Err(DriveError::NotAFolder(parent.id.clone()));
        }

        let draft = self.create_draft(parent, name, cancel).await?;
        if stop == UploadStopPoint::DraftCreated {
            return self
                .outcome(&draft, UploadStage::DraftCreated, 0, 0, cancel)
                .await;
        }

        let target = BlockTarget {
            link_id: draft.link_id.clone(),
            revision_id: draft.revision_id.clone(),
            content_key: draft.content_key.clone(),
            node_public: draft.keys.public_key().clone(),
        };
        let uploaded = self.upload_blocks(reader, &target, cancel).await?;
        if stop == UploadStopPoint::BlocksUploaded {
            return self
                .outcome(
                    &draft,
                    UploadStage::BlocksUploaded,
                    uploaded.size,
                    uploaded.block_count,
                    cancel,
                )
                .await;
        }

        let crypto = &self.inner.crypto;
        let identity = &self.inner.identity;
        let attrs = serde_json::to_vec(&FileAttributes {
            size: uploaded.size,
            modification_time,
        })?;
        let request = CommitRevisionRequest {
            manifest_signature: crypto.sign(identity.signer(), &uploaded.manifest),
            signature_address: identity.address().to_string(),
            xattr: crypto.seal(&attrs, draft.keys.public_key())?,
            xattr_signature: crypto.sign(identity.signer(), &attrs),
        };
        ensure_active(cancel)?;
        guarded(
            cancel,
            self.inner
                .api
                .commit_revision(&draft.link_id, &draft.revision_id, request),
        )
        .await?;

        self.inner.cache.invalidate(&draft.link_id);
        let link = guarded(cancel, self.inner.api.get_link(&draft.link_id)).await?;
        self.inner.cache.put(link.clone(), Some(draft.keys.clone()));

        info!(
            link_id = %link.id,
            revision_id = %draft.revision_id,
            size = uploaded.size,
            blocks = uploaded.block_count,
            "Uploaded file"
        );
        Ok(UploadOutcome {
            link,
            revision_id: draft.revision_id,
            stage: UploadStage::Committed,
            size: uploaded.size,
            blocks: uploaded.block_count,
        })
    }

    async fn outcome(
        &self,
        draft: &Draft,
        stage: UploadStage,
        size: u64,
        blocks: usize,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome> {
        let link = self.refresh_link(&draft.link_id, cancel).await?;
        debug!(link_id = %link.id, ?stage, "Upload stopped early");
        Ok(UploadOutcome {
            link,
            revision_id: draft.revision_id.clone(),
            stage,
            size,
            blocks,
        })
    }

    /// Create the draft for a new file, falling back to the collision branch
    async fn create_draft(
        &self,
        parent: &Link,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Draft> {
        let parent_keys = self.resolve_keys(parent, cancel).await?;
        let encoded = self.encode_name(name, parent, &parent_keys)?;

        let crypto = &self.inner.crypto;
        let identity = &self.inner.identity;
        let generated = crypto.generate_node_keys(parent_keys.public_key(), identity.signer())?;
        let content =
            crypto.generate_content_key(generated.keypair.public_key(), identity.signer())?;

        let fresh = FreshFile {
            request: CreateFileRequest {
                parent_id: parent.id.clone(),
                name: encoded.name,
                name_signature: encoded.signature,
                hash: encoded.hash,
                mime_type: detect_mime_type(name),
                node_key: generated.locked_key,
                node_passphrase: generated.encrypted_passphrase,
                node_passphrase_signature: generated.passphrase_signature,
                signature_address: identity.address().to_string(),
                content_key_packet: content.packet,
                content_key_signature: content.signature,
            },
            keys: Arc::new(KeyBundle::new(generated.keypair, None)),
            content_key: content.key,
        };

        let created = self.create_fresh(&fresh, cancel).await;
        match created {
            Err(DriveError::Api(ApiError::NameExists { .. })) => {
                debug!(name, "Name collision, looking for the existing node");
                self.reuse_existing(parent, name, fresh, cancel).await
            }
            other => other,
        }
    }

    async fn create_fresh(&self, fresh: &FreshFile, cancel: &CancellationToken) -> Result<Draft> {
        let created = guarded(cancel, self.inner.api.create_file(fresh.request.clone())).await?;
        debug!(link_id = %created.link_id, "Created draft file");
        Ok(Draft {
            link_id: created.link_id,
            revision_id: created.revision_id,
            keys: fresh.keys.clone(),
            content_key: Arc::new(fresh.content_key.clone()),
        })
    }

    /// Resolve a name collision on upload
    async fn reuse_existing(
        &self,
        parent: &Link,
        name: &str,
        fresh: FreshFile,
        cancel: &CancellationToken,
    ) -> Result<Draft> {
        let existing = match self.search_in_folder(parent, name, None, false, cancel).await? {
            Some(entry) => Some(entry),
            None => self.search_in_folder(parent, name, None, true, cancel).await?,
        };
        let Some(entry) = existing else {
            return Err(DriveError::CantLocateRevision {
                name: name.to_string(),
            });
        };
        if entry.is_folder {
            return Err(DriveError::NameExists {
                name: name.to_string(),
            });
        }

        let replace = self.inner.config.replace_existing_draft;
        let link = entry.link;
        if link.state == LinkState::Draft {
            if !replace {
                return Err(DriveError::DraftExists {
                    name: name.to_string(),
                });
            }
            warn!(link_id = %link.id, "Deleting draft-only file before retrying");
            self.inner.cache.invalidate(&link.id);
            guarded(
                cancel,
                self.inner
                    .api
                    .delete_children(&parent.id, std::slice::from_ref(&link.id)),
            )
            .await?;
            return self.create_fresh(&fresh, cancel).await.map_err(|e| match e {
                DriveError::Api(ApiError::NameExists { .. }) => DriveError::NameExists {
                    name: name.to_string(),
                },
                other => other,
            });
        }

        let revisions = guarded(cancel, self.inner.api.list_revisions(&link.id)).await?;
        if let Some(pending) = revisions.iter().find(|r| r.state == RevisionState::Draft) {
            if !replace {
                return Err(DriveError::DraftExists {
                    name: name.to_string(),
                });
            }
            warn!(
                link_id = %link.id,
                revision_id = %pending.id,
                "Replacing pending draft revision"
            );
            guarded(cancel, self.inner.api.delete_revision(&link.id, &pending.id)).await?;
        }
        let revision_id = guarded(cancel, self.inner.api.create_revision(&link.id)).await?;

        // The existing node's own keys, never the freshly generated ones
        let keys = self.resolve_keys(&link, cancel).await?;
        let content_key = self.content_key(&link, &keys)?;
        debug!(link_id = %link.id, %revision_id, "Reusing existing file");
        Ok(Draft {
            link_id: link.id,
            revision_id,
            keys,
            content_key: Arc::new(content_key),
        })
    }
}
