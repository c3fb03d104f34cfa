//! The drive facade
//!
//! [`Drive`] owns the collaborators (remote API, crypto provider, identity),
//! the key cache and the drive-wide encryption semaphore. It is cheap to
//! clone; clones share all state. The operations live in the sibling
//! modules as further `impl Drive` blocks.

use crate::{
    Config, Result,
    cache::{KeyBundle, KeyedCache},
    cancel::guarded,
    identity::Identity,
};
use sealdrive_crypto::CryptoProvider;
use sealdrive_store::{DriveApi, Link, Share};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

pub(crate) struct DriveInner {
    pub(crate) api: Arc<dyn DriveApi>,
    pub(crate) crypto: Arc<dyn CryptoProvider>,
    pub(crate) identity: Arc<Identity>,
    pub(crate) share: Share,
    pub(crate) share_keys: Arc<KeyBundle>,
    pub(crate) config: Config,
    pub(crate) cache: KeyedCache,
    pub(crate) encryption_permits: Arc<Semaphore>,
}

/// Client for an end-to-end encrypted drive
#[derive(Clone)]
pub struct Drive {
    pub(crate) inner: Arc<DriveInner>,
}

impl Drive {
    /// Connect to the drive behind `api` as `identity`
    #[instrument(skip_all, fields(address = %identity.address()))]
    pub async fn connect(
        api: Arc<dyn DriveApi>,
        crypto: Arc<dyn CryptoProvider>,
        identity: Identity,
        config: Config,
    ) -> Result<Self> {
        config.validate()?;
        let share = api.get_share_root().await?;
        info!(share_id = %share.share_id, root = %share.root_link_id, "Connected to drive");

        let share_keys = Arc::new(KeyBundle::new(identity.share_keys().clone(), None));
        let encryption_permits = Arc::new(Semaphore::new(config.encryption_concurrency));
        let cache = KeyedCache::new(!config.disable_caching);

        Ok(Self {
            inner: Arc::new(DriveInner {
                api,
                crypto,
                identity: Arc::new(identity),
                share,
                share_keys,
                config,
                cache,
                encryption_permits,
            }),
        })
    }

    /// The engine configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The identity this drive acts as
    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    /// The share this drive works in
    pub fn share(&self) -> &Share {
        &self.inner.share
    }

    /// The key cache
    pub fn cache(&self) -> &KeyedCache {
        &self.inner.cache
    }

    /// Drop every cached snapshot and key bundle
    pub fn clear_cache(&self) {
        debug!("Clearing key cache");
        self.inner.cache.clear();
    }

    /// Fetch a link, serving it from the cache when present
    pub async fn get_link(&self, link_id: &str, cancel: &CancellationToken) -> Result<Link> {
        if let Some(entry) = self.inner.cache.get(link_id) {
            return Ok((*entry.link).clone());
        }
        let link = guarded(cancel, self.inner.api.get_link(link_id)).await?;
        self.inner.cache.put(link.clone(), None);
        Ok(link)
    }

    /// Invalidate and re-read a link from the remote store
    pub async fn refresh_link(&self, link_id: &str, cancel: &CancellationToken) -> Result<Link> {
        self.inner.cache.invalidate(link_id);
        self.get_link(link_id, cancel).await
    }

    /// The share root folder
    pub async fn root_link(&self, cancel: &CancellationToken) -> Result<Link> {
        self.get_link(&self.inner.share.root_link_id, cancel).await
    }
}

impl std::fmt::Debug for Drive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drive")
            .field("share", &self.inner.share)
            .field("config", &self.inner.config)
            .field("cached_entries", &self.inner.cache.len())
            .finish()
    }
}
