//! Folder creation and trash management

use crate::{Drive, DriveError, Result, cancel::guarded};
use sealdrive_store::{ApiError, CreateFolderRequest, Link, LinkState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

impl Drive {
    /// Create folder `name` in `parent`, returning the new link ID
    #[instrument(skip(self, parent, cancel), fields(parent_id = %parent.id))]
    pub async fn create_folder(
        &self,
        parent: &Link,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if !parent.is_folder() {
            return Err(DriveError::NotAFolder(parent.id.clone()));
        }
        let parent_keys = self.resolve_keys(parent, cancel).await?;
        let encoded = self.encode_name(name, parent, &parent_keys)?;

        let crypto = &self.inner.crypto;
        let identity = &self.inner.identity;
        let generated = crypto.generate_node_keys(parent_keys.public_key(), identity.signer())?;
        let (_, node_hash_key) = crypto.generate_hash_key(generated.keypair.public_key())?;

        let request = CreateFolderRequest {
            parent_id: parent.id.clone(),
            name: encoded.name,
            name_signature: encoded.signature,
            hash: encoded.hash,
            node_key: generated.locked_key,
            node_passphrase: generated.encrypted_passphrase,
            node_passphrase_signature: generated.passphrase_signature,
            signature_address: identity.address().to_string(),
            node_hash_key,
        };
        let link_id = guarded(cancel, self.inner.api.create_folder(request))
            .await
            .map_err(|e| match e {
                DriveError::Api(ApiError::NameExists { .. }) => DriveError::NameExists {
                    name: name.to_string(),
                },
                other => other,
            })?;

        info!(%link_id, "Created folder");
        Ok(link_id)
    }

    /// Re-read the parent, then create the folder
    pub async fn create_folder_by_id(
        &self,
        parent_id: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let parent = self.refresh_link(parent_id, cancel).await?;
        self.create_folder(&parent, name, cancel).await
    }

    /// Move a file to the trash
    #[instrument(skip(self, cancel))]
    pub async fn trash_file(&self, link_id: &str, cancel: &CancellationToken) -> Result<()> {
        let link = self.refresh_link(link_id, cancel).await?;
        if !link.is_file() {
            return Err(DriveError::NotAFile(link.id));
        }
        self.trash(&link, cancel).await
    }

    /// Move a folder and everything below it to the trash
    ///
    /// With `only_if_empty`, a folder with draft or active children is left
    /// alone and [`DriveError::FolderNotEmpty`] is returned.
    #[instrument(skip(self, cancel))]
    pub async fn trash_folder(
        &self,
        link_id: &str,
        only_if_empty: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let link = self.refresh_link(link_id, cancel).await?;
        if !link.is_folder() {
            return Err(DriveError::NotAFolder(link.id));
        }
        if only_if_empty {
            let children = guarded(cancel, self.inner.api.list_children(&link.id, false)).await?;
            if !children.is_empty() {
                return Err(DriveError::FolderNotEmpty(link.id));
            }
        }
        self.trash(&link, cancel).await
    }

    /// Trash every active child of the share root and delete everything else in it
    #[instrument(skip(self, cancel))]
    pub async fn empty_root_folder(&self, cancel: &CancellationToken) -> Result<()> {
        let root_id = self.inner.share.root_link_id.clone();
        let children = guarded(cancel, self.inner.api.list_children(&root_id, true)).await?;

        let (active, rest): (Vec<Link>, Vec<Link>) = children
            .into_iter()
            .partition(|child| child.state == LinkState::Active);
        let active: Vec<String> = active.into_iter().map(|l| l.id).collect();
        let rest: Vec<String> = rest.into_iter().map(|l| l.id).collect();

        for id in active.iter().chain(&rest) {
            self.inner.cache.invalidate(id);
        }
        if !active.is_empty() {
            guarded(cancel, self.inner.api.trash_children(&root_id, &active)).await?;
        }
        if !rest.is_empty() {
            guarded(cancel, self.inner.api.delete_children(&root_id, &rest)).await?;
        }

        info!(trashed = active.len(), deleted = rest.len(), "Emptied root folder");
        Ok(())
    }

    /// Permanently delete everything in the trash
    #[instrument(skip(self, cancel))]
    pub async fn empty_trash(&self, cancel: &CancellationToken) -> Result<()> {
        guarded(cancel, self.inner.api.empty_trash()).await?;
        // Purged ids are unknown here
        self.inner.cache.clear();
        info!("Emptied trash");
        Ok(())
    }

    async fn trash(&self, link: &Link, cancel: &CancellationToken) -> Result<()> {
        let parent_id = link.parent_id.as_deref().ok_or(DriveError::RootImmutable)?;
        self.inner.cache.invalidate(&link.id);
        guarded(
            cancel,
            self.inner
                .api
                .trash_children(parent_id, std::slice::from_ref(&link.id)),
        )
        .await?;
        debug!(link_id = %link.id, "Trashed node");
        Ok(())
    }
}
