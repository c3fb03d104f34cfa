//! In-memory drive backend for testing and local use
//!
//! Enforces the same rules a real drive server does: lookup hashes are
//! unique among the children of a folder, a file has at most one draft
//! revision, committing makes the previous active revision obsolete, moves
//! are guarded by etags, and uploaded blocks must match their declared hash.

use crate::{
    ApiError, DriveApi, Result,
    types::{
        Block, BlockUploadLink, BlockUploadRequest, CommitRevisionRequest, CreateFileRequest,
        CreateFileResponse, CreateFolderRequest, FileProperties, FolderProperties, Link,
        LinkState, LinkType, MoveLinkRequest, Revision, RevisionMetadata, RevisionState, Share,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Snapshot of how many times each API operation was called
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallCounts(HashMap<&'static str, usize>);

impl CallCounts {
    /// Calls made to `operation`
    pub fn get(&self, operation: &str) -> usize {
        self.0.get(operation).copied().unwrap_or(0)
    }

    /// Calls made across all operations
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }
}

struct StoredRevision {
    metadata: RevisionMetadata,
    blocks: BTreeMap<u32, Block>,
}

struct StoredBlock {
    link_id: String,
    revision_id: String,
    hash: Vec<u8>,
    size: u64,
    data: Option<Bytes>,
}

#[derive(Default)]
struct Inner {
    share: RwLock<Option<Share>>,
    links: DashMap<String, Link>,
    /// (parent ID, lookup hash) -> link ID
    names: DashMap<(String, String), String>,
    revisions: DashMap<String, Vec<StoredRevision>>,
    blocks: DashMap<String, StoredBlock>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, ApiError>>,
}

/// An in-memory drive
#[derive(Clone, Default)]
pub struct MemoryDriveApi {
    inner: Arc<Inner>,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn new_etag() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl MemoryDriveApi {
    /// Create a new drive with no share
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the share root folder. The request's `parent_id` is ignored.
    pub fn init_root(&self, request: CreateFolderRequest) -> Result<Share> {
        let mut share = self.inner.share.write();
        if share.is_some() {
            return Err(ApiError::invalid("share root already exists"));
        }

        let now = Utc::now();
        let link = Link {
            id: new_id(),
            parent_id: None,
            link_type: LinkType::Folder,
            state: LinkState::Active,
            name: request.name,
            name_signature: request.name_signature,
            hash: request.hash,
            node_key: request.node_key,
            node_passphrase: request.node_passphrase,
            node_passphrase_signature: request.node_passphrase_signature,
            signature_address: request.signature_address,
            etag: new_etag(),
            create_time: now,
            modify_time: now,
            file_properties: None,
            folder_properties: Some(FolderProperties {
                node_hash_key: request.node_hash_key,
            }),
        };

        let created = Share {
            share_id: new_id(),
            root_link_id: link.id.clone(),
        };
        self.inner.links.insert(link.id.clone(), link);
        *share = Some(created.clone());
        Ok(created)
    }

    /// Number of calls per operation so far
    pub fn call_counts(&self) -> CallCounts {
        CallCounts(self.inner.calls.lock().clone())
    }

    /// Reset the call counters
    pub fn reset_call_counts(&self) {
        self.inner.calls.lock().clear();
    }

    /// Make the next call to `operation` fail with `error`
    pub fn fail_next(&self, operation: &'static str, error: ApiError) {
        self.inner.failures.lock().insert(operation, error);
    }

    /// Rewrite the stored bytes of a block without touching its recorded hash
    pub fn tamper_block(&self, token: &str, f: impl FnOnce(&mut Vec<u8>)) -> Result<()> {
        let mut block = self
            .inner
            .blocks
            .get_mut(token)
            .ok_or_else(|| ApiError::not_found("block", token))?;
        let mut data = block.data.as_ref().map(|d| d.to_vec()).unwrap_or_default();
        f(&mut data);
        block.data = Some(Bytes::from(data));
        Ok(())
    }

    /// Number of links, including trashed ones
    pub fn link_count(&self) -> usize {
        self.inner.links.len()
    }

    /// Number of block tokens held
    pub fn block_count(&self) -> usize {
        self.inner.blocks.len()
    }

    fn enter(&self, operation: &'static str) -> Result<()> {
        *self.inner.calls.lock().entry(operation).or_insert(0) += 1;
        match self.inner.failures.lock().remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn link(&self, link_id: &str) -> Result<Link> {
        self.inner
            .links
            .get(link_id)
            .map(|l| l.value().clone())
            .ok_or_else(|| ApiError::not_found("link", link_id))
    }

    fn active_folder(&self, folder_id: &str) -> Result<Link> {
        let folder = self.link(folder_id)?;
        if folder.link_type != LinkType::Folder {
            return Err(ApiError::invalid(format!("{} is not a folder", folder_id)));
        }
        if folder.state != LinkState::Active {
            return Err(ApiError::invalid(format!("folder {} is not active", folder_id)));
        }
        Ok(folder)
    }

    fn file(&self, link_id: &str) -> Result<Link> {
        let link = self
            .link(link_id)
            .map_err(|_| ApiError::FileNotFound(link_id.to_string()))?;
        if link.link_type != LinkType::File {
            return Err(ApiError::FileNotFound(link_id.to_string()));
        }
        Ok(link)
    }

    fn reserve_name(&self, parent_id: &str, hash: &str, link_id: &str) -> Result<()> {
        match self
            .inner
            .names
            .entry((parent_id.to_string(), hash.to_string()))
        {
            Entry::Occupied(existing) if existing.get() != link_id => Err(ApiError::NameExists {
                parent_id: parent_id.to_string(),
            }),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(link_id.to_string());
                Ok(())
            }
        }
    }

    fn release_name(&self, parent_id: &str, hash: &str, link_id: &str) {
        self.inner
            .names
            .remove_if(&(parent_id.to_string(), hash.to_string()), |_, v| v == link_id);
    }

    fn new_revision() -> StoredRevision {
        StoredRevision {
            metadata: RevisionMetadata {
                id: new_id(),
                state: RevisionState::Draft,
                size: 0,
                manifest_signature: None,
                xattr: None,
                xattr_signature: None,
                signature_address: None,
                create_time: Utc::now(),
            },
            blocks: BTreeMap::new(),
        }
    }

    fn drop_block_tokens(&self, blocks: &BTreeMap<u32, Block>) {
        for block in blocks.values() {
            self.inner.blocks.remove(&block.token);
        }
    }

    /// Remove a link and everything below it
    fn purge(&self, root_id: &str) {
        let mut stack = vec![root_id.to_string()];
        while let Some(id) = stack.pop() {
            let children: Vec<String> = self
                .inner
                .links
                .iter()
                .filter(|l| l.parent_id.as_deref() == Some(id.as_str()))
                .map(|l| l.id.clone())
                .collect();
            stack.extend(children);

            if let Some((_, link)) = self.inner.links.remove(&id) {
                if let Some(parent) = &link.parent_id {
                    self.release_name(parent, &link.hash, &id);
                }
            }
            if let Some((_, revisions)) = self.inner.revisions.remove(&id) {
                for revision in &revisions {
                    self.drop_block_tokens(&revision.blocks);
                }
            }
            debug!(link_id = %id, "Purged link");
        }
    }

    fn is_descendant_or_self(&self, candidate: &str, ancestor: &str) -> bool {
        let mut current = Some(candidate.to_string());
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self
                .inner
                .links
                .get(&id)
                .and_then(|l| l.parent_id.clone());
        }
        false
    }

    fn check_child(&self, parent_id: &str, link_id: &str) -> Result<Link> {
        let link = self.link(link_id)?;
        if link.parent_id.as_deref() != Some(parent_id) {
            return Err(ApiError::invalid(format!(
                "{} is not a child of {}",
                link_id, parent_id
            )));
        }
        Ok(link)
    }
}

#[async_trait]
impl DriveApi for MemoryDriveApi {
    async fn get_share_root(&self) -> Result<Share> {
        self.enter("get_share_root")?;
        self.inner
            .share
            .read()
            .clone()
            .ok_or_else(|| ApiError::NotFound("share".to_string()))
    }

    async fn get_link(&self, link_id: &str) -> Result<Link> {
        self.enter("get_link")?;
        self.link(link_id)
    }

    async fn list_children(&self, folder_id: &str, show_all: bool) -> Result<Vec<Link>> {
        self.enter("list_children")?;
        let folder = self.link(folder_id)?;
        if folder.link_type != LinkType::Folder {
            return Err(ApiError::invalid(format!("{} is not a folder", folder_id)));
        }

        let mut children: Vec<Link> = self
            .inner
            .links
            .iter()
            .filter(|l| l.parent_id.as_deref() == Some(folder_id))
            .filter(|l| match l.state {
                LinkState::Draft | LinkState::Active => true,
                LinkState::Trashed => show_all,
                LinkState::Deleted => false,
            })
            .map(|l| l.value().clone())
            .collect();
        children.sort_by(|a, b| a.create_time.cmp(&b.create_time).then(a.id.cmp(&b.id)));
        Ok(children)
    }

    async fn create_file(&self, request: CreateFileRequest) -> Result<CreateFileResponse> {
        self.enter("create_file")?;
        self.active_folder(&request.parent_id)?;

        let link_id = new_id();
        self.reserve_name(&request.parent_id, &request.hash, &link_id)?;

        let now = Utc::now();
        let link = Link {
            id: link_id.clone(),
            parent_id: Some(request.parent_id),
            link_type: LinkType::File,
            state: LinkState::Draft,
            name: request.name,
            name_signature: request.name_signature,
            hash: request.hash,
            node_key: request.node_key,
            node_passphrase: request.node_passphrase,
            node_passphrase_signature: request.node_passphrase_signature,
            signature_address: request.signature_address,
            etag: new_etag(),
            create_time: now,
            modify_time: now,
            file_properties: Some(FileProperties {
                content_key_packet: request.content_key_packet,
                content_key_signature: request.content_key_signature,
                mime_type: request.mime_type,
            }),
            folder_properties: None,
        };

        let revision = Self::new_revision();
        let revision_id = revision.metadata.id.clone();
        self.inner.links.insert(link_id.clone(), link);
        self.inner.revisions.insert(link_id.clone(), vec![revision]);

        debug!(link_id = %link_id, revision_id = %revision_id, "Created draft file");
        Ok(CreateFileResponse {
            link_id,
            revision_id,
        })
    }

    async fn create_folder(&self, request: CreateFolderRequest) -> Result<String> {
        self.enter("create_folder")?;
        self.active_folder(&request.parent_id)?;

        let link_id = new_id();
        self.reserve_name(&request.parent_id, &request.hash, &link_id)?;

        let now = Utc::now();
        let link = Link {
            id: link_id.clone(),
            parent_id: Some(request.parent_id),
            link_type: LinkType::Folder,
            state: LinkState::Active,
            name: request.name,
            name_signature: request.name_signature,
            hash: request.hash,
            node_key: request.node_key,
            node_passphrase: request.node_passphrase,
            node_passphrase_signature: request.node_passphrase_signature,
            signature_address: request.signature_address,
            etag: new_etag(),
            create_time: now,
            modify_time: now,
            file_properties: None,
            folder_properties: Some(FolderProperties {
                node_hash_key: request.node_hash_key,
            }),
        };
        self.inner.links.insert(link_id.clone(), link);

        debug!(link_id = %link_id, "Created folder");
        Ok(link_id)
    }

    async fn create_revision(&self, link_id: &str) -> Result<String> {
        self.enter("create_revision")?;
        self.file(link_id)?;

        let mut revisions = self.inner.revisions.entry(link_id.to_string()).or_default();
        if revisions
            .iter()
            .any(|r| r.metadata.state == RevisionState::Draft)
        {
            return Err(ApiError::invalid(format!(
                "file {} already has a draft revision",
                link_id
            )));
        }

        let revision = Self::new_revision();
        let revision_id = revision.metadata.id.clone();
        revisions.push(revision);
        Ok(revision_id)
    }

    async fn delete_revision(&self, link_id: &str, revision_id: &str) -> Result<()> {
        self.enter("delete_revision")?;
        let link = self.file(link_id)?;
        if link.state == LinkState::Draft {
            return Err(ApiError::invalid(format!(
                "cannot delete the only revision of draft file {}",
                link_id
            )));
        }

        let removed = {
            let mut revisions = self
                .inner
                .revisions
                .get_mut(link_id)
                .ok_or_else(|| ApiError::not_found("revision", revision_id))?;
            let position = revisions
                .iter()
                .position(|r| r.metadata.id == revision_id)
                .ok_or_else(|| ApiError::not_found("revision", revision_id))?;
            if revisions[position].metadata.state != RevisionState::Draft {
                return Err(ApiError::invalid(format!(
                    "revision {} is not a draft",
                    revision_id
                )));
            }
            revisions.remove(position)
        };
        self.drop_block_tokens(&removed.blocks);
        Ok(())
    }

    async fn list_revisions(&self, link_id: &str) -> Result<Vec<RevisionMetadata>> {
        self.enter("list_revisions")?;
        self.file(link_id)?;
        Ok(self
            .inner
            .revisions
            .get(link_id)
            .map(|revisions| revisions.iter().map(|r| r.metadata.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_revision(&self, link_id: &str, revision_id: &str) -> Result<Revision> {
        self.enter("get_revision")?;
        self.file(link_id)?;
        let revisions = self
            .inner
            .revisions
            .get(link_id)
            .ok_or_else(|| ApiError::not_found("revision", revision_id))?;
        let revision = revisions
            .iter()
            .find(|r| r.metadata.id == revision_id)
            .ok_or_else(|| ApiError::not_found("revision", revision_id))?;

        Ok(Revision {
            metadata: revision.metadata.clone(),
            blocks: revision.blocks.values().cloned().collect(),
        })
    }

    async fn request_block_upload(
        &self,
        request: BlockUploadRequest,
    ) -> Result<Vec<BlockUploadLink>> {
        self.enter("request_block_upload")?;
        self.file(&request.link_id)?;

        let (links, replaced, pending) = {
            let mut revisions = self
                .inner
                .revisions
                .get_mut(&request.link_id)
                .ok_or_else(|| ApiError::not_found("revision", &request.revision_id))?;
            let revision = revisions
                .iter_mut()
                .find(|r| r.metadata.id == request.revision_id)
                .ok_or_else(|| ApiError::not_found("revision", &request.revision_id))?;
            if revision.metadata.state != RevisionState::Draft {
                return Err(ApiError::invalid(format!(
                    "revision {} is not a draft",
                    request.revision_id
                )));
            }
            if request.blocks.iter().any(|info| info.index == 0) {
                return Err(ApiError::invalid("block indices start at 1"));
            }

            let mut links = Vec::with_capacity(request.blocks.len());
            let mut replaced = Vec::new();
            let mut pending = Vec::with_capacity(request.blocks.len());
            for info in request.blocks {
                let token = new_id();
                pending.push((token.clone(), info.hash.clone(), info.size));
                let block = Block {
                    index: info.index,
                    hash: info.hash,
                    encrypted_signature: info.encrypted_signature,
                    size: info.size,
                    token: token.clone(),
                };
                if let Some(old) = revision.blocks.insert(info.index, block) {
                    replaced.push(old.token);
                }
                links.push(BlockUploadLink {
                    index: info.index,
                    token,
                });
            }
            (links, replaced, pending)
        };

        for token in replaced {
            self.inner.blocks.remove(&token);
        }
        for (token, hash, size) in pending {
            self.inner.blocks.insert(
                token,
                StoredBlock {
                    link_id: request.link_id.clone(),
                    revision_id: request.revision_id.clone(),
                    hash,
                    size,
                    data: None,
                },
            );
        }
        Ok(links)
    }

    async fn upload_block(&self, token: &str, data: Bytes) -> Result<()> {
        self.enter("upload_block")?;
        let mut block = self
            .inner
            .blocks
            .get_mut(token)
            .ok_or_else(|| ApiError::not_found("block token", token))?;

        if data.len() as u64 != block.size {
            return Err(ApiError::invalid(format!(
                "block size mismatch: declared {}, received {}",
                block.size,
                data.len()
            )));
        }
        let actual = sealdrive_crypto::hashing::content_hash(&data);
        if actual.as_slice() != block.hash.as_slice() {
            return Err(ApiError::invalid("block hash does not match uploaded data"));
        }

        debug!(
            link_id = %block.link_id,
            revision_id = %block.revision_id,
            size = data.len(),
            "Stored block"
        );
        block.data = Some(data);
        Ok(())
    }

    async fn get_block(&self, token: &str) -> Result<Bytes> {
        self.enter("get_block")?;
        self.inner
            .blocks
            .get(token)
            .and_then(|b| b.data.clone())
            .ok_or_else(|| ApiError::not_found("block", token))
    }

    async fn commit_revision(
        &self,
        link_id: &str,
        revision_id: &str,
        request: CommitRevisionRequest,
    ) -> Result<()> {
        self.enter("commit_revision")?;
        self.file(link_id)?;

        {
            let mut revisions = self
                .inner
                .revisions
                .get_mut(link_id)
                .ok_or_else(|| ApiError::not_found("revision", revision_id))?;
            let position = revisions
                .iter()
                .position(|r| r.metadata.id == revision_id)
                .ok_or_else(|| ApiError::not_found("revision", revision_id))?;
            if revisions[position].metadata.state != RevisionState::Draft {
                return Err(ApiError::invalid(format!(
                    "revision {} is not a draft",
                    revision_id
                )));
            }

            let mut size = 0u64;
            for block in revisions[position].blocks.values() {
                let uploaded = self
                    .inner
                    .blocks
                    .get(&block.token)
                    .map(|b| b.data.is_some())
                    .unwrap_or(false);
                if !uploaded {
                    return Err(ApiError::invalid(format!(
                        "block {} of revision {} was never uploaded",
                        block.index, revision_id
                    )));
                }
                size += block.size;
            }

            for revision in revisions.iter_mut() {
                if revision.metadata.state == RevisionState::Active {
                    revision.metadata.state = RevisionState::Obsolete;
                }
            }
            let metadata = &mut revisions[position].metadata;
            metadata.state = RevisionState::Active;
            metadata.size = size;
            metadata.manifest_signature = Some(request.manifest_signature);
            metadata.xattr = Some(request.xattr);
            metadata.xattr_signature = Some(request.xattr_signature);
            metadata.signature_address = Some(request.signature_address);
        }

        if let Some(mut link) = self.inner.links.get_mut(link_id) {
            if link.state == LinkState::Draft {
                link.state = LinkState::Active;
            }
            link.etag = new_etag();
            link.modify_time = Utc::now();
        }

        debug!(link_id = %link_id, revision_id = %revision_id, "Committed revision");
        Ok(())
    }

    async fn move_link(&self, link_id: &str, request: MoveLinkRequest) -> Result<()> {
        self.enter("move_link")?;
        let link = self.link(link_id)?;
        let old_parent = link
            .parent_id
            .clone()
            .ok_or_else(|| ApiError::invalid("the share root cannot be moved"))?;

        if link.etag != request.etag {
            return Err(ApiError::PreconditionFailed {
                link_id: link_id.to_string(),
                expected: request.etag,
                actual: link.etag,
            });
        }
        if link.hash != request.original_hash {
            return Err(ApiError::invalid("original hash does not match the link"));
        }
        self.active_folder(&request.parent_id)?;
        if self.is_descendant_or_self(&request.parent_id, link_id) {
            return Err(ApiError::invalid("cannot move a folder into itself"));
        }

        self.reserve_name(&request.parent_id, &request.hash, link_id)?;
        if old_parent != request.parent_id || link.hash != request.hash {
            self.release_name(&old_parent, &link.hash, link_id);
        }

        let mut stored = self
            .inner
            .links
            .get_mut(link_id)
            .ok_or_else(|| ApiError::not_found("link", link_id))?;
        stored.parent_id = Some(request.parent_id);
        stored.name = request.name;
        stored.name_signature = request.name_signature;
        stored.hash = request.hash;
        stored.node_passphrase = request.node_passphrase;
        stored.node_passphrase_signature = request.node_passphrase_signature;
        stored.signature_address = request.signature_address;
        stored.etag = new_etag();
        stored.modify_time = Utc::now();

        debug!(link_id = %link_id, "Moved link");
        Ok(())
    }

    async fn trash_children(&self, parent_id: &str, link_ids: &[String]) -> Result<()> {
        self.enter("trash_children")?;
        for link_id in link_ids {
            let link = self.check_child(parent_id, link_id)?;
            self.release_name(parent_id, &link.hash, link_id);
            if let Some(mut stored) = self.inner.links.get_mut(link_id) {
                stored.state = LinkState::Trashed;
                stored.etag = new_etag();
                stored.modify_time = Utc::now();
            }
        }
        Ok(())
    }

    async fn delete_children(&self, parent_id: &str, link_ids: &[String]) -> Result<()> {
        self.enter("delete_children")?;
        for link_id in link_ids {
            self.check_child(parent_id, link_id)?;
        }
        for link_id in link_ids {
            self.purge(link_id);
        }
        Ok(())
    }

    async fn empty_trash(&self) -> Result<()> {
        self.enter("empty_trash")?;
        let trashed: Vec<String> = self
            .inner
            .links
            .iter()
            .filter(|l| l.state == LinkState::Trashed)
            .map(|l| l.id.clone())
            .collect();
        for link_id in trashed {
            self.purge(&link_id);
        }
        Ok(())
    }
}
