//! Node snapshot and key bundle cache
//!
//! Maps link IDs to the last observed [`Link`] plus, once resolved, the
//! decrypted [`KeyBundle`] for that link. Entries are replaced wholesale and
//! a bundle is only handed out for a snapshot with the same etag as the one
//! it was derived from. The lock is held only around map access, never
//! across an await point.

use parking_lot::RwLock;
use sealdrive_crypto::{HashKey, KekKeyPair, PublicKey};
use sealdrive_store::Link;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Decrypted keys of one node
///
/// Secret material is scrubbed when the last reference is dropped.
pub struct KeyBundle {
    node: KekKeyPair,
    hash_key: Option<HashKey>,
}

impl KeyBundle {
    /// Create a bundle from a node key pair and, for folders, its hash key
    pub fn new(node: KekKeyPair, hash_key: Option<HashKey>) -> Self {
        Self { node, hash_key }
    }

    /// The node key pair
    pub fn keypair(&self) -> &KekKeyPair {
        &self.node
    }

    /// The node public key
    pub fn public_key(&self) -> &PublicKey {
        self.node.public_key()
    }

    /// The folder hash key, `None` for files and the share bundle
    pub fn hash_key(&self) -> Option<&HashKey> {
        self.hash_key.as_ref()
    }
}

impl std::fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBundle")
            .field("public", self.node.public_key())
            .field("has_hash_key", &self.hash_key.is_some())
            .finish()
    }
}

/// A cached node snapshot with its optional key bundle
#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// Last observed snapshot
    pub link: Arc<Link>,
    /// Keys derived from that snapshot
    pub keys: Option<Arc<KeyBundle>>,
}

/// Thread-safe cache of node snapshots and key bundles
#[derive(Debug)]
pub struct KeyedCache {
    enabled: bool,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Default for KeyedCache {
    fn default() -> Self {
        Self::new(true)
    }
}

impl KeyedCache {
    /// Create a cache; a disabled cache stores nothing
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the cache stores anything
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up an entry
    pub fn get(&self, link_id: &str) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }
        self.entries.read().get(link_id).cloned()
    }

    /// Cached bundle for `link`, only if it was derived from the same etag
    pub fn keys_for(&self, link: &Link) -> Option<Arc<KeyBundle>> {
        let entry = self.get(&link.id)?;
        if entry.link.etag != link.etag {
            return None;
        }
        entry.keys
    }

    /// Replace the entry for `link.id`
    pub fn put(&self, link: Link, keys: Option<Arc<KeyBundle>>) {
        if !self.enabled {
            return;
        }
        trace!(link_id = %link.id, with_keys = keys.is_some(), "Caching link");
        self.entries.write().insert(
            link.id.clone(),
            CacheEntry {
                link: Arc::new(link),
                keys,
            },
        );
    }

    /// Attach `keys` to `link` unless a different snapshot of it is cached
    ///
    /// Returns whether the bundle was stored. A cached entry with another
    /// etag was read after `link` and stays authoritative.
    pub fn memoize(&self, link: &Link, keys: Arc<KeyBundle>) -> bool {
        if !self.enabled {
            return false;
        }
        let mut entries = self.entries.write();
        if entries
            .get(&link.id)
            .is_some_and(|entry| entry.link.etag != link.etag)
        {
            trace!(link_id = %link.id, "Not memoizing keys of an outdated snapshot");
            return false;
        }
        entries.insert(
            link.id.clone(),
            CacheEntry {
                link: Arc::new(link.clone()),
                keys: Some(keys),
            },
        );
        true
    }

    /// Drop the entry for `link_id`
    pub fn invalidate(&self, link_id: &str) {
        if !self.enabled {
            return;
        }
        if self.entries.write().remove(link_id).is_some() {
            trace!(link_id = %link_id, "Invalidated cache entry");
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sealdrive_crypto::{
        CryptoProvider, DefaultCryptoProvider, LockedKey, Passphrase, SigningKeyPair,
    };
    use sealdrive_store::{LinkState, LinkType};

    fn link(id: &str, etag: &str) -> Link {
        let provider = DefaultCryptoProvider::new();
        let signer = SigningKeyPair::generate();
        let kp = KekKeyPair::generate();
        let (name, name_signature) = provider.encrypt_name("n", kp.public_key(), &signer).unwrap();
        Link {
            id: id.to_string(),
            parent_id: None,
            link_type: LinkType::Folder,
            state: LinkState::Active,
            name: name.clone(),
            name_signature: name_signature.clone(),
            hash: String::new(),
            node_key: LockedKey::lock(&kp, &Passphrase::generate()).unwrap(),
            node_passphrase: name,
            node_passphrase_signature: name_signature,
            signature_address: "a@b.c".to_string(),
            etag: etag.to_string(),
            create_time: Utc::now(),
            modify_time: Utc::now(),
            file_properties: None,
            folder_properties: None,
        }
    }

    fn bundle() -> Arc<KeyBundle> {
        Arc::new(KeyBundle::new(KekKeyPair::generate(), None))
    }

    #[test]
    fn test_put_get_invalidate() {
        let cache = KeyedCache::default();
        cache.put(link("a", "e1"), Some(bundle()));
        assert!(cache.get("a").is_some());
        assert_eq!(cache.len(), 1);

        cache.invalidate("a");
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_require_matching_etag() {
        let cache = KeyedCache::default();
        let keys = bundle();
        cache.put(link("a", "e1"), Some(keys.clone()));

        let served = cache.keys_for(&link("a", "e1")).unwrap();
        assert!(Arc::ptr_eq(&served, &keys));
        assert!(cache.keys_for(&link("a", "e2")).is_none());
    }

    #[test]
    fn test_put_replaces_wholesale() {
        let cache = KeyedCache::default();
        cache.put(link("a", "e1"), Some(bundle()));
        cache.put(link("a", "e1"), None);
        assert!(cache.get("a").unwrap().keys.is_none());
    }

    #[test]
    fn test_memoize_keeps_newer_snapshot() {
        let cache = KeyedCache::default();
        cache.put(link("a", "e2"), None);

        assert!(!cache.memoize(&link("a", "e1"), bundle()));
        let entry = cache.get("a").unwrap();
        assert_eq!(entry.link.etag, "e2");
        assert!(entry.keys.is_none());

        let keys = bundle();
        assert!(cache.memoize(&link("a", "e2"), keys.clone()));
        assert!(Arc::ptr_eq(&cache.keys_for(&link("a", "e2")).unwrap(), &keys));
        assert!(cache.memoize(&link("b", "e1"), bundle()));
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = KeyedCache::new(false);
        cache.put(link("a", "e1"), Some(bundle()));
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = KeyedCache::default();
        cache.put(link("a", "e1"), None);
        cache.put(link("b", "e1"), None);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(KeyedCache::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let id = format!("n{}", i);
                    cache.put(link(&id, "e"), None);
                    assert!(cache.get(&id).is_some());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 8);
    }
}
