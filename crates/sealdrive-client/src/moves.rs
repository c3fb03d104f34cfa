//! Move and rename
//!
//! A node keeps its key pair and passphrase across a move; only the
//! passphrase wrapping, the encrypted name and the lookup hash change.

use crate::{Drive, DriveError, Result, cancel::guarded};
use sealdrive_store::{ApiError, Link, LinkState, MoveLinkRequest};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

impl Drive {
    /// Move `source` into `destination` under `new_name`
    ///
    /// The request is conditional on the etag of `source`; if the node
    /// changed remotely since it was read this fails with
    /// [`DriveError::StaleNode`] and the caller should re-read and retry.
    #[instrument(
        skip(self, source, destination, cancel),
        fields(link_id = %source.id, destination_id = %destination.id)
    )]
    pub async fn move_link(
        &self,
        source: &Link,
        destination: &Link,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Link> {
        if source.is_root() {
            return Err(DriveError::RootImmutable);
        }
        for link in [source, destination] {
            if link.state != LinkState::Active {
                return Err(DriveError::MustBeActive(link.id.clone()));
            }
        }
        if !destination.is_folder() {
            return Err(DriveError::NotAFolder(destination.id.clone()));
        }

        let destination_keys = self.resolve_keys(destination, cancel).await?;
        let encoded = self.encode_name(new_name, destination, &destination_keys)?;

        let old_parent_keys = self.resolve_parent_keys(source, cancel).await?;
        let node_passphrase = self.inner.crypto.rewrap_passphrase(
            &source.node_passphrase,
            old_parent_keys.keypair(),
            destination_keys.public_key(),
        )?;

        let request = MoveLinkRequest {
            parent_id: destination.id.clone(),
            name: encoded.name,
            name_signature: encoded.signature,
            hash: encoded.hash,
            original_hash: source.hash.clone(),
            node_passphrase,
            node_passphrase_signature: source.node_passphrase_signature.clone(),
            signature_address: self.inner.identity.address().to_string(),
            etag: source.etag.clone(),
        };

        // Never serve the pre-move bundle again
        self.inner.cache.invalidate(&source.id);
        guarded(cancel, self.inner.api.move_link(&source.id, request))
            .await
            .map_err(|e| match e {
                DriveError::Api(ApiError::PreconditionFailed { link_id, .. }) => {
                    DriveError::StaleNode { link_id }
                }
                DriveError::Api(ApiError::NameExists { .. }) => DriveError::NameExists {
                    name: new_name.to_string(),
                },
                other => other,
            })?;

        let moved = self.refresh_link(&source.id, cancel).await?;
        info!(new_parent = %destination.id, "Moved node");
        Ok(moved)
    }

    /// Re-read both nodes, then move
    pub async fn move_by_id(
        &self,
        source_id: &str,
        destination_id: &str,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Link> {
        let source = self.refresh_link(source_id, cancel).await?;
        let destination = self.get_link(destination_id, cancel).await?;
        self.move_link(&source, &destination, new_name, cancel).await
    }
}
