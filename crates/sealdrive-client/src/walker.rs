//! Directory listing and name search
//!
//! All traversals are depth-first pre-order over an explicit stack and only
//! ever surface active nodes (plus drafts where a search asks for them).
//! Trashed and deleted nodes are never returned.

use crate::{
    Drive, DriveError, Result,
    cache::KeyBundle,
    cancel::{ensure_active, guarded},
};
use sealdrive_store::{Link, LinkState, LinkType};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// A decrypted node as seen by a listing or search
#[derive(Clone, Debug)]
pub struct DirectoryEntry {
    /// The node snapshot
    pub link: Link,
    /// Decrypted name
    pub name: String,
    /// Slash-separated path from where the walk started. Subtree walks
    /// start with the starting node's own name (unless a listing excludes
    /// it); single-folder listings and lookups give `/name`.
    pub path: String,
    /// Whether the node is a folder
    pub is_folder: bool,
}

/// Options for [`Drive::list_recursive`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Deepest level to descend to, the starting folder being level 0
    pub max_depth: Option<usize>,
    /// Leave the starting folder's own name out of every path
    pub exclude_root: bool,
    /// Recreate visited folders and files under `Config::data_folder`
    pub materialize: bool,
}

impl ListOptions {
    /// Unbounded listing that includes the starting folder
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the starting folder and its immediate children
    pub fn shallow() -> Self {
        Self::new().with_max_depth(1)
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn excluding_root(mut self) -> Self {
        self.exclude_root = true;
        self
    }

    pub fn materializing(mut self) -> Self {
        self.materialize = true;
        self
    }
}

struct Frame {
    link: Link,
    parent_keys: Arc<KeyBundle>,
    parent_path: String,
    depth: usize,
}

fn admits(link: &Link, include_drafts: bool) -> bool {
    match link.state {
        LinkState::Active => true,
        LinkState::Draft => include_drafts,
        LinkState::Trashed | LinkState::Deleted => false,
    }
}

fn type_matches(link: &Link, link_type: Option<LinkType>) -> bool {
    link_type.is_none_or(|t| t == link.link_type)
}

impl Drive {
    /// Decrypted immediate active children of a folder
    #[instrument(skip(self, folder, cancel), fields(folder_id = %folder.id))]
    pub async fn list_directory(
        &self,
        folder: &Link,
        cancel: &CancellationToken,
    ) -> Result<Vec<DirectoryEntry>> {
        if !folder.is_folder() {
            return Err(DriveError::NotAFolder(folder.id.clone()));
        }
        let keys = self.resolve_keys(folder, cancel).await?;
        let children = self.active_children(folder, false, cancel).await?;

        let mut entries = Vec::with_capacity(children.len());
        for child in children {
            let name = self.decode_name(&child, &keys)?;
            entries.push(DirectoryEntry {
                path: format!("/{name}"),
                is_folder: child.is_folder(),
                name,
                link: child,
            });
        }
        Ok(entries)
    }

    /// Walk a subtree, returning one entry per active node in pre-order
    #[instrument(skip(self, start, cancel), fields(start_id = %start.id))]
    pub async fn list_recursive(
        &self,
        start: &Link,
        options: &ListOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<DirectoryEntry>> {
        let data_folder = if options.materialize {
            Some(
                self.inner
                    .config
                    .data_folder
                    .clone()
                    .ok_or(DriveError::MissingDataFolder)?,
            )
        } else {
            None
        };

        let mut entries = Vec::new();
        let mut stack = vec![Frame {
            parent_keys: self.resolve_parent_keys(start, cancel).await?,
            link: start.clone(),
            parent_path: String::new(),
            depth: 0,
        }];

        while let Some(frame) = stack.pop() {
            ensure_active(cancel)?;
            let Frame {
                link,
                parent_keys,
                parent_path,
                depth,
            } = frame;

            let path = if options.exclude_root && depth == 0 {
                parent_path
            } else {
                let name = self.decode_name(&link, &parent_keys)?;
                let path = format!("{parent_path}/{name}");
                if let Some(root) = &data_folder {
                    self.materialize(&link, &path, root, cancel).await?;
                }
                entries.push(DirectoryEntry {
                    link: link.clone(),
                    name,
                    path: path.clone(),
                    is_folder: link.is_folder(),
                });
                path
            };

            let descend = options.max_depth.is_none_or(|max| depth < max);
            if link.is_folder() && descend {
                let keys = self.child_keys(&link, &parent_keys)?;
                let children = self.active_children(&link, false, cancel).await?;
                // Reversed so the first child is visited first
                for child in children.into_iter().rev() {
                    stack.push(Frame {
                        link: child,
                        parent_keys: keys.clone(),
                        parent_path: path.clone(),
                        depth: depth + 1,
                    });
                }
            }
        }

        debug!(entries = entries.len(), "Listed subtree");
        Ok(entries)
    }

    /// First node named `name` anywhere in the subtree, the start included
    #[instrument(skip(self, start, cancel), fields(start_id = %start.id))]
    pub async fn search_recursive(
        &self,
        start: &Link,
        name: &str,
        link_type: Option<LinkType>,
        include_drafts: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryEntry>> {
        let mut stack = vec![(
            start.clone(),
            self.resolve_parent_keys(start, cancel).await?,
            String::new(),
        )];

        while let Some((link, parent_keys, parent_path)) = stack.pop() {
            ensure_active(cancel)?;
            if !admits(&link, include_drafts) {
                continue;
            }
            let decoded = self.decode_name(&link, &parent_keys)?;
            let path = format!("{parent_path}/{decoded}");
            if decoded == name && type_matches(&link, link_type) {
                return Ok(Some(DirectoryEntry {
                    is_folder: link.is_folder(),
                    path,
                    name: decoded,
                    link,
                }));
            }

            if link.is_folder() && link.state == LinkState::Active {
                let keys = self.child_keys(&link, &parent_keys)?;
                let children = self.active_children(&link, include_drafts, cancel).await?;
                for child in children.into_iter().rev() {
                    stack.push((child, keys.clone(), path.clone()));
                }
            }
        }
        Ok(None)
    }

    /// Immediate child of `folder` named `name`
    #[instrument(skip(self, folder, cancel), fields(folder_id = %folder.id))]
    pub async fn search_in_folder(
        &self,
        folder: &Link,
        name: &str,
        link_type: Option<LinkType>,
        include_drafts: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryEntry>> {
        if !folder.is_folder() {
            return Err(DriveError::NotAFolder(folder.id.clone()));
        }
        let keys = self.resolve_keys(folder, cancel).await?;
        let hash = keys
            .hash_key()
            .map(|hash_key| self.inner.crypto.lookup_hash(hash_key, name));

        for child in self.active_children(folder, include_drafts, cancel).await? {
            if !type_matches(&child, link_type) {
                continue;
            }
            if hash.as_ref().is_some_and(|h| *h != child.hash) {
                continue;
            }
            let decoded = self.decode_name(&child, &keys)?;
            if decoded == name {
                return Ok(Some(DirectoryEntry {
                    is_folder: child.is_folder(),
                    path: format!("/{decoded}"),
                    name: decoded,
                    link: child,
                }));
            }
        }
        Ok(None)
    }

    /// Children of `folder` that are active, or draft when asked for
    async fn active_children(
        &self,
        folder: &Link,
        include_drafts: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Link>> {
        let children = guarded(cancel, self.inner.api.list_children(&folder.id, false)).await?;
        Ok(children
            .into_iter()
            .filter(|child| admits(child, include_drafts))
            .collect())
    }

    async fn materialize(
        &self,
        link: &Link,
        path: &str,
        root: &std::path::Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let target: PathBuf = root.join(path.trim_start_matches('/'));
        if link.is_folder() {
            tokio::fs::create_dir_all(&target).await?;
        } else {
            let data = self.download_bytes(link, cancel).await?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, data).await?;
        }
        debug!(path = %target.display(), "Materialized node");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_options_builders() {
        let options = ListOptions::shallow().excluding_root();
        assert_eq!(options.max_depth, Some(1));
        assert!(options.exclude_root);
        assert!(!options.materialize);
        assert!(ListOptions::new().materializing().materialize);
    }
}
