//! Rule enforcement tests for the in-memory drive

use bytes::Bytes;
use sealdrive_crypto::{
    CryptoProvider, DefaultCryptoProvider, HashKey, KekKeyPair, SigningKeyPair,
};
use sealdrive_store::{
    ApiError, BlockUploadInfo, BlockUploadRequest, CommitRevisionRequest, CreateFileRequest,
    CreateFolderRequest, DriveApi, LinkState, MemoryDriveApi, MoveLinkRequest, RevisionState,
};

struct Env {
    api: MemoryDriveApi,
    root_id: String,
    provider: DefaultCryptoProvider,
    signer: SigningKeyPair,
    parent: KekKeyPair,
    hash_key: HashKey,
}

type Keys<'a> = (&'a DefaultCryptoProvider, &'a SigningKeyPair, &'a KekKeyPair, &'a HashKey);

fn folder_request(keys: Keys<'_>, parent_id: &str, name: &str) -> CreateFolderRequest {
    let (provider, signer, parent, hash_key) = keys;
    let keys = provider.generate_node_keys(parent.public_key(), signer).unwrap();
    let (name_enc, name_sig) = provider.encrypt_name(name, parent.public_key(), signer).unwrap();
    let (_, node_hash_key) = provider.generate_hash_key(keys.keypair.public_key()).unwrap();
    CreateFolderRequest {
        parent_id: parent_id.to_string(),
        name: name_enc,
        name_signature: name_sig,
        hash: provider.lookup_hash(hash_key, name),
        node_key: keys.locked_key,
        node_passphrase: keys.encrypted_passphrase,
        node_passphrase_signature: keys.passphrase_signature,
        signature_address: "user@example.com".to_string(),
        node_hash_key,
    }
}

impl Env {
    fn new() -> Self {
        let provider = DefaultCryptoProvider::new();
        let signer = SigningKeyPair::generate();
        let parent = KekKeyPair::generate();
        let hash_key = HashKey::generate();
        let api = MemoryDriveApi::new();
        let share = api
            .init_root(folder_request((&provider, &signer, &parent, &hash_key), "", "root"))
            .unwrap();
        Self {
            api,
            root_id: share.root_link_id,
            provider,
            signer,
            parent,
            hash_key,
        }
    }

    fn folder(&self, parent_id: &str, name: &str) -> CreateFolderRequest {
        folder_request(
            (&self.provider, &self.signer, &self.parent, &self.hash_key),
            parent_id,
            name,
        )
    }

    fn file(&self, parent_id: &str, name: &str) -> CreateFileRequest {
        let keys = self
            .provider
            .generate_node_keys(self.parent.public_key(), &self.signer)
            .unwrap();
        let (name_enc, name_sig) = self
            .provider
            .encrypt_name(name, self.parent.public_key(), &self.signer)
            .unwrap();
        let content = self
            .provider
            .generate_content_key(keys.keypair.public_key(), &self.signer)
            .unwrap();
        CreateFileRequest {
            parent_id: parent_id.to_string(),
            name: name_enc,
            name_signature: name_sig,
            hash: self.provider.lookup_hash(&self.hash_key, name),
            mime_type: "text/plain".to_string(),
            node_key: keys.locked_key,
            node_passphrase: keys.encrypted_passphrase,
            node_passphrase_signature: keys.passphrase_signature,
            signature_address: "user@example.com".to_string(),
            content_key_packet: content.packet,
            content_key_signature: content.signature,
        }
    }

    fn commit_request(&self) -> CommitRevisionRequest {
        CommitRevisionRequest {
            manifest_signature: self.signer.sign(b""),
            signature_address: "user@example.com".to_string(),
            xattr: self.provider.seal(b"{}", self.parent.public_key()).unwrap(),
            xattr_signature: self.signer.sign(b"{}"),
        }
    }

    fn block_info(&self, index: u32, data: &[u8]) -> BlockUploadInfo {
        BlockUploadInfo {
            index,
            size: data.len() as u64,
            encrypted_signature: self.provider.seal(b"sig", self.parent.public_key()).unwrap(),
            hash: self.provider.content_hash(data).to_vec(),
        }
    }
}

#[tokio::test]
async fn test_duplicate_name_is_rejected() {
    let env = Env::new();
    env.api.create_folder(env.folder(&env.root_id, "docs")).await.unwrap();

    let err = env
        .api
        .create_file(env.file(&env.root_id, "docs"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NameExists { .. }));
}

#[tokio::test]
async fn test_commit_activates_file_and_obsoletes_previous() {
    let env = Env::new();
    let created = env.api.create_file(env.file(&env.root_id, "a.txt")).await.unwrap();
    assert_eq!(
        env.api.get_link(&created.link_id).await.unwrap().state,
        LinkState::Draft
    );

    env.api
        .commit_revision(&created.link_id, &created.revision_id, env.commit_request())
        .await
        .unwrap();
    assert_eq!(
        env.api.get_link(&created.link_id).await.unwrap().state,
        LinkState::Active
    );

    let second = env.api.create_revision(&created.link_id).await.unwrap();
    assert!(env.api.create_revision(&created.link_id).await.is_err());
    env.api
        .commit_revision(&created.link_id, &second, env.commit_request())
        .await
        .unwrap();

    let revisions = env.api.list_revisions(&created.link_id).await.unwrap();
    let active: Vec<_> = revisions
        .iter()
        .filter(|r| r.state == RevisionState::Active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second);
    assert_eq!(
        revisions
            .iter()
            .filter(|r| r.state == RevisionState::Obsolete)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_commit_requires_uploaded_blocks() {
    let env = Env::new();
    let created = env.api.create_file(env.file(&env.root_id, "b.bin")).await.unwrap();

    let data = b"ciphertext".to_vec();
    let links = env
        .api
        .request_block_upload(BlockUploadRequest {
            link_id: created.link_id.clone(),
            revision_id: created.revision_id.clone(),
            blocks: vec![env.block_info(1, &data)],
        })
        .await
        .unwrap();

    assert!(env
        .api
        .commit_revision(&created.link_id, &created.revision_id, env.commit_request())
        .await
        .is_err());

    // Wrong bytes are refused
    assert!(env
        .api
        .upload_block(&links[0].token, Bytes::from_static(b"other data"))
        .await
        .is_err());

    env.api
        .upload_block(&links[0].token, Bytes::from(data.clone()))
        .await
        .unwrap();
    env.api
        .commit_revision(&created.link_id, &created.revision_id, env.commit_request())
        .await
        .unwrap();

    let revision = env
        .api
        .get_revision(&created.link_id, &created.revision_id)
        .await
        .unwrap();
    assert_eq!(revision.metadata.size, data.len() as u64);
    assert_eq!(revision.blocks.len(), 1);
    assert_eq!(env.api.get_block(&links[0].token).await.unwrap(), data);
}

#[tokio::test]
async fn test_draft_only_revision_cannot_be_deleted() {
    let env = Env::new();
    let created = env.api.create_file(env.file(&env.root_id, "c.txt")).await.unwrap();
    assert!(env
        .api
        .delete_revision(&created.link_id, &created.revision_id)
        .await
        .is_err());
}

#[tokio::test]
async fn test_move_checks_etag_and_names() {
    let env = Env::new();
    let dst = env.api.create_folder(env.folder(&env.root_id, "dst")).await.unwrap();
    let created = env.api.create_file(env.file(&env.root_id, "m.txt")).await.unwrap();
    let link = env.api.get_link(&created.link_id).await.unwrap();

    let request = |etag: &str| {
        let (name, name_signature) = env
            .provider
            .encrypt_name("moved.txt", env.parent.public_key(), &env.signer)
            .unwrap();
        MoveLinkRequest {
            parent_id: dst.clone(),
            name,
            name_signature,
            hash: env.provider.lookup_hash(&env.hash_key, "moved.txt"),
            original_hash: link.hash.clone(),
            node_passphrase: link.node_passphrase.clone(),
            node_passphrase_signature: link.node_passphrase_signature.clone(),
            signature_address: link.signature_address.clone(),
            etag: etag.to_string(),
        }
    };

    let err = env
        .api
        .move_link(&created.link_id, request("stale"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::PreconditionFailed { .. }));

    env.api
        .move_link(&created.link_id, request(&link.etag))
        .await
        .unwrap();
    let moved = env.api.get_link(&created.link_id).await.unwrap();
    assert_eq!(moved.parent_id.as_deref(), Some(dst.as_str()));
    assert_ne!(moved.etag, link.etag);

    // The old name is free again
    env.api.create_file(env.file(&env.root_id, "m.txt")).await.unwrap();
}

#[tokio::test]
async fn test_folder_cannot_move_into_itself() {
    let env = Env::new();
    let outer = env.api.create_folder(env.folder(&env.root_id, "outer")).await.unwrap();
    let inner = env.api.create_folder(env.folder(&outer, "inner")).await.unwrap();
    let link = env.api.get_link(&outer).await.unwrap();

    let (name, name_signature) = env
        .provider
        .encrypt_name("outer", env.parent.public_key(), &env.signer)
        .unwrap();
    let result = env
        .api
        .move_link(
            &outer,
            MoveLinkRequest {
                parent_id: inner,
                name,
                name_signature,
                hash: link.hash.clone(),
                original_hash: link.hash.clone(),
                node_passphrase: link.node_passphrase.clone(),
                node_passphrase_signature: link.node_passphrase_signature.clone(),
                signature_address: link.signature_address.clone(),
                etag: link.etag.clone(),
            },
        )
        .await;
    assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_trash_and_empty_trash() {
    let env = Env::new();
    let folder = env.api.create_folder(env.folder(&env.root_id, "t")).await.unwrap();
    env.api.create_folder(env.folder(&folder, "nested")).await.unwrap();
    let before = env.api.link_count();

    env.api
        .trash_children(&env.root_id, &[folder.clone()])
        .await
        .unwrap();
    assert!(env.api.list_children(&env.root_id, false).await.unwrap().is_empty());
    assert_eq!(env.api.list_children(&env.root_id, true).await.unwrap().len(), 1);

    env.api.empty_trash().await.unwrap();
    assert_eq!(env.api.link_count(), before - 2);
    assert!(matches!(
        env.api.get_link(&folder).await,
        Err(ApiError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_failure_injection_and_counters() {
    let env = Env::new();
    env.api.reset_call_counts();
    env.api.fail_next("get_link", ApiError::Transport("boom".into()));

    assert!(matches!(
        env.api.get_link(&env.root_id).await,
        Err(ApiError::Transport(_))
    ));
    env.api.get_link(&env.root_id).await.unwrap();
    assert_eq!(env.api.call_counts().get("get_link"), 2);
    assert_eq!(env.api.call_counts().total(), 2);
}
