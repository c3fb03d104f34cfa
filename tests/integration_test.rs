//! Integration tests for the SealDrive engine
//!
//! These tests drive the whole stack (engine, crypto provider and the
//! in-memory store) through complete workflows.

use sealdrive_client::{Config, Drive, DriveError, ErrorKind, Identity, ListOptions};
use sealdrive_crypto::DefaultCryptoProvider;
use sealdrive_store::{Link, MemoryDriveApi};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn setup(config: Config) -> (MemoryDriveApi, Drive) {
    let crypto = Arc::new(DefaultCryptoProvider::new());
    let identity = Identity::generate("alice@example.com");
    let api = MemoryDriveApi::new();
    api.init_root(identity.root_folder_request(crypto.as_ref(), "root").unwrap())
        .unwrap();
    let drive = Drive::connect(Arc::new(api.clone()), crypto, identity, config)
        .await
        .unwrap();
    (api, drive)
}

async fn tree(drive: &Drive, cancel: &CancellationToken) -> Vec<String> {
    let root = drive.root_link(cancel).await.unwrap();
    let mut paths: Vec<String> = drive
        .list_recursive(&root, &ListOptions::new().excluding_root(), cancel)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.path)
        .collect();
    paths.sort();
    paths
}

async fn folder(drive: &Drive, parent: &Link, name: &str, cancel: &CancellationToken) -> Link {
    let id = drive.create_folder(parent, name, cancel).await.unwrap();
    drive.get_link(&id, cancel).await.unwrap()
}

/// Test a complete session: build a tree, reorganize it, read it back, clean up
#[tokio::test]
async fn test_drive_lifecycle() {
    let config = Config::default().with_chunk_size(64).with_upload_batch_size(4);
    let (api, drive) = setup(config).await;
    let cancel = CancellationToken::new();
    let root = drive.root_link(&cancel).await.unwrap();

    let photos = folder(&drive, &root, "photos", &cancel).await;
    let trips = folder(&drive, &photos, "trips", &cancel).await;
    let docs = folder(&drive, &root, "docs", &cancel).await;

    let image: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
    let beach = drive
        .upload_bytes(&trips, "beach.jpg", image.clone(), &cancel)
        .await
        .unwrap();
    let notes = drive
        .upload_bytes(&docs, "notes.md", &b"# Notes"[..], &cancel)
        .await
        .unwrap();
    assert_eq!(
        beach.file_properties.as_ref().unwrap().mime_type,
        "image/jpeg"
    );

    assert_eq!(
        tree(&drive, &cancel).await,
        vec![
            "/docs",
            "/docs/notes.md",
            "/photos",
            "/photos/trips",
            "/photos/trips/beach.jpg",
        ]
    );

    // Reorganize: move trips under docs, rename notes
    let trips = drive
        .move_link(&trips, &docs, "travel", &cancel)
        .await
        .unwrap();
    drive
        .move_by_id(&notes.id, &docs.id, "README.md", &cancel)
        .await
        .unwrap();
    assert_eq!(
        tree(&drive, &cancel).await,
        vec![
            "/docs",
            "/docs/README.md",
            "/docs/travel",
            "/docs/travel/beach.jpg",
            "/photos",
        ]
    );

    let found = drive
        .search_recursive(&root, "beach.jpg", None, false, &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.link.parent_id.as_deref(), Some(trips.id.as_str()));
    assert_eq!(
        drive.download_bytes(&found.link, &cancel).await.unwrap(),
        image
    );

    // Clean up
    drive.trash_folder(&photos.id, true, &cancel).await.unwrap();
    drive.empty_root_folder(&cancel).await.unwrap();
    drive.empty_trash(&cancel).await.unwrap();
    assert!(tree(&drive, &cancel).await.is_empty());
    assert_eq!(api.link_count(), 1);
    assert_eq!(api.block_count(), 0);
}

/// Test that clones of one drive work concurrently
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_share_one_drive() {
    let config = Config::default()
        .with_chunk_size(32)
        .with_upload_batch_size(3)
        .with_encryption_concurrency(2);
    let (_api, drive) = setup(config).await;
    let cancel = CancellationToken::new();
    let root = drive.root_link(&cancel).await.unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8u8 {
        let drive = drive.clone();
        let root = root.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let data = vec![i; 100 + i as usize * 13];
            let link = drive
                .upload_bytes(&root, &format!("file-{i}.bin"), data.clone(), &cancel)
                .await?;
            Ok::<_, DriveError>((link, data))
        });
    }

    let mut uploaded = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        uploaded.push(joined.unwrap().unwrap());
    }
    assert_eq!(tree(&drive, &cancel).await.len(), 8);

    let downloads = futures::future::try_join_all(
        uploaded
            .iter()
            .map(|(link, _)| drive.download_bytes(link, &cancel)),
    )
    .await
    .unwrap();
    for ((_, expected), actual) in uploaded.iter().zip(downloads) {
        assert_eq!(&actual, expected);
    }
}

/// Test that a configuration file shapes the block layout
#[tokio::test]
async fn test_config_file_controls_chunking() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sealdrive.toml");
    std::fs::write(&path, "chunk_size = 8\nupload_batch_size = 2\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.chunk_size, 8);
    let (api, drive) = setup(config).await;
    let cancel = CancellationToken::new();
    let root = drive.root_link(&cancel).await.unwrap();

    api.reset_call_counts();
    let link = drive
        .upload_bytes(&root, "forty.bin", vec![7u8; 40], &cancel)
        .await
        .unwrap();
    assert_eq!(api.call_counts().get("upload_block"), 5);
    assert_eq!(api.call_counts().get("request_block_upload"), 3);
    assert_eq!(drive.download_bytes(&link, &cancel).await.unwrap(), vec![7u8; 40]);
}

/// Test uploading from a local file reader
#[tokio::test]
async fn test_upload_from_file_reader() {
    let (_api, drive) = setup(Config::default().with_chunk_size(100)).await;
    let cancel = CancellationToken::new();
    let root = drive.root_link(&cancel).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source.txt");
    let content = "line of text\n".repeat(50);
    std::fs::write(&path, &content).unwrap();

    let mut file = tokio::fs::File::open(&path).await.unwrap();
    let link = drive
        .upload_reader(&root, "copy.txt", &mut file, &cancel)
        .await
        .unwrap();
    assert_eq!(
        drive.download_bytes(&link, &cancel).await.unwrap(),
        content.as_bytes()
    );
}

/// Test that a folder cannot be moved below itself
#[tokio::test]
async fn test_move_into_own_subtree_is_rejected() {
    let (_api, drive) = setup(Config::default()).await;
    let cancel = CancellationToken::new();
    let root = drive.root_link(&cancel).await.unwrap();
    let outer = folder(&drive, &root, "outer", &cancel).await;
    let inner = folder(&drive, &outer, "inner", &cancel).await;

    let err = drive
        .move_link(&outer, &inner, "loop", &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Api);
    assert_eq!(tree(&drive, &cancel).await, vec!["/outer", "/outer/inner"]);
}
