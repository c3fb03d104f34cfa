//! Key resolution along the parent chain
//!
//! A node's keys can only be unlocked with its parent's keys, so resolving a
//! node means walking up to the first ancestor whose bundle is already
//! cached (or to the share root), then unlocking top-down and caching each
//! level on the way. Cold resolution costs one fetch per uncached ancestor;
//! warm resolution costs nothing.

use crate::{Drive, DriveError, Result, cache::KeyBundle, cancel::ensure_active};
use sealdrive_crypto::{DekKey, KekKeyPair};
use sealdrive_store::Link;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Deepest parent chain the resolver will follow
pub const MAX_TREE_DEPTH: usize = 512;

impl Drive {
    /// Resolve the decrypted key bundle of `link`
    #[instrument(skip_all, fields(link_id = %link.id))]
    pub async fn resolve_keys(
        &self,
        link: &Link,
        cancel: &CancellationToken,
    ) -> Result<Arc<KeyBundle>> {
        let cache = &self.inner.cache;
        if let Some(keys) = cache.keys_for(link) {
            return Ok(keys);
        }

        // Walk up until a cached bundle or the root
        let mut chain = vec![link.clone()];
        let mut seen = HashSet::from([link.id.clone()]);
        let mut base: Option<Arc<KeyBundle>> = None;
        while let Some(parent_id) = chain.last().and_then(|l| l.parent_id.clone()) {
            if chain.len() > MAX_TREE_DEPTH || !seen.insert(parent_id.clone()) {
                return Err(DriveError::TreeTooDeep {
                    link_id: link.id.clone(),
                    max: MAX_TREE_DEPTH,
                });
            }
            let parent = self.get_link(&parent_id, cancel).await.map_err(|e| {
                if e.is_not_found() {
                    DriveError::MissingNode(parent_id.clone())
                } else {
                    e
                }
            })?;
            if let Some(keys) = cache.keys_for(&parent) {
                base = Some(keys);
                break;
            }
            chain.push(parent);
        }
        debug!(uncached = chain.len(), "Deriving node keys");

        // Unlock top-down, memoizing every level whose snapshot is current
        let mut parent_keys = base.unwrap_or_else(|| self.inner.share_keys.clone());
        while let Some(node) = chain.pop() {
            ensure_active(cancel)?;
            let keys = Arc::new(self.unlock_bundle(&node, parent_keys.keypair())?);
            cache.memoize(&node, keys.clone());
            parent_keys = keys;
        }
        Ok(parent_keys)
    }

    /// Resolve the key bundle of `link`'s parent; the share keys for the root
    pub async fn resolve_parent_keys(
        &self,
        link: &Link,
        cancel: &CancellationToken,
    ) -> Result<Arc<KeyBundle>> {
        match &link.parent_id {
            None => Ok(self.inner.share_keys.clone()),
            Some(parent_id) => {
                let parent = self.get_link(parent_id, cancel).await?;
                self.resolve_keys(&parent, cancel).await
            }
        }
    }

    /// Bundle of `child` given its parent's already resolved bundle
    pub(crate) fn child_keys(
        &self,
        child: &Link,
        parent_keys: &KeyBundle,
    ) -> Result<Arc<KeyBundle>> {
        if let Some(keys) = self.inner.cache.keys_for(child) {
            return Ok(keys);
        }
        let keys = Arc::new(self.unlock_bundle(child, parent_keys.keypair())?);
        self.inner.cache.memoize(child, keys.clone());
        Ok(keys)
    }

    /// Unwrap and verify the content key of a file
    pub(crate) fn content_key(&self, link: &Link, keys: &KeyBundle) -> Result<DekKey> {
        let props = link
            .file_properties
            .as_ref()
            .ok_or_else(|| DriveError::NotAFile(link.id.clone()))?;
        Ok(self.inner.crypto.unwrap_content_key(
            &props.content_key_packet,
            &props.content_key_signature,
            keys.keypair(),
            &self.inner.identity.verifying_key(),
        )?)
    }

    fn unlock_bundle(&self, link: &Link, parent: &KekKeyPair) -> Result<KeyBundle> {
        let crypto = &self.inner.crypto;
        let node = crypto.unlock_node_key(
            &link.node_key,
            &link.node_passphrase,
            &link.node_passphrase_signature,
            parent,
            &self.inner.identity.verifying_key(),
        )?;
        let hash_key = match &link.folder_properties {
            Some(folder) => Some(crypto.decrypt_hash_key(&folder.node_hash_key, &node)?),
            None => None,
        };
        Ok(KeyBundle::new(node, hash_key))
    }
}
