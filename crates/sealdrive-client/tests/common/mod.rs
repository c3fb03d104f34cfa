//! Shared harness: a drive over the in-memory store
#![allow(dead_code)]

use sealdrive_client::{Config, Drive, Identity, ListOptions};
use sealdrive_crypto::DefaultCryptoProvider;
use sealdrive_store::{Link, MemoryDriveApi};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct TestDrive {
    pub api: MemoryDriveApi,
    pub drive: Drive,
    pub identity: Identity,
    pub cancel: CancellationToken,
}

/// Small blocks so tests exercise multi-block files cheaply
pub fn small_blocks() -> Config {
    Config::default()
        .with_chunk_size(16)
        .with_upload_batch_size(3)
        .with_encryption_concurrency(2)
        .with_download_batch_size(2)
}

pub async fn test_drive(config: Config) -> TestDrive {
    let crypto = Arc::new(DefaultCryptoProvider::new());
    let identity = Identity::generate("tester@example.com");
    let api = MemoryDriveApi::new();
    api.init_root(identity.root_folder_request(crypto.as_ref(), "root").unwrap())
        .unwrap();

    let drive = Drive::connect(Arc::new(api.clone()), crypto, identity.clone(), config)
        .await
        .unwrap();
    TestDrive {
        api,
        drive,
        identity,
        cancel: CancellationToken::new(),
    }
}

impl TestDrive {
    /// A second client of the same account and store
    pub async fn another_client(&self, config: Config) -> Drive {
        Drive::connect(
            Arc::new(self.api.clone()),
            Arc::new(DefaultCryptoProvider::new()),
            self.identity.clone(),
            config,
        )
        .await
        .unwrap()
    }

    pub async fn root(&self) -> Link {
        self.drive.root_link(&self.cancel).await.unwrap()
    }

    pub async fn folder(&self, parent: &Link, name: &str) -> Link {
        let id = self
            .drive
            .create_folder(parent, name, &self.cancel)
            .await
            .unwrap();
        self.drive.get_link(&id, &self.cancel).await.unwrap()
    }

    pub async fn file(&self, parent: &Link, name: &str, data: &[u8]) -> Link {
        self.drive
            .upload_bytes(parent, name, data.to_vec(), &self.cancel)
            .await
            .unwrap()
    }

    /// Sorted paths of the whole tree below the root, root excluded
    pub async fn tree(&self) -> Vec<String> {
        let root = self.root().await;
        let mut paths: Vec<String> = self
            .drive
            .list_recursive(&root, &ListOptions::new().excluding_root(), &self.cancel)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        paths.sort();
        paths
    }
}

/// Deterministic test payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
