//! Upload and download through the block pipeline

mod common;

use common::{payload, small_blocks, test_drive};
use proptest::prelude::*;
use rstest::rstest;
use sealdrive_client::{Config, DriveError, ErrorKind, UploadStage, UploadStopPoint};
use sealdrive_store::{LinkState, RevisionState};
use tokio::io::AsyncReadExt;

#[rstest]
#[case::empty(0)]
#[case::single_partial(5)]
#[case::exactly_one_chunk(16)]
#[case::one_batch(48)]
#[case::several_batches(16 * 7 + 3)]
#[tokio::test]
async fn test_roundtrip(#[case] size: usize) {
    let t = test_drive(small_blocks()).await;
    let root = t.root().await;
    let data = payload(size);

    let link = t.file(&root, "data.bin", &data).await;
    assert_eq!(link.state, LinkState::Active);

    let downloaded = t.drive.download(&link, &t.cancel).await.unwrap();
    assert_eq!(downloaded.attrs.size, size as u64);
    assert_eq!(downloaded.stream.collect_bytes().await.unwrap(), data);
}

#[tokio::test]
async fn test_block_layout_for_2500_bytes() {
    let config = Config::default()
        .with_chunk_size(10)
        .with_upload_batch_size(10);
    let t = test_drive(config).await;
    let root = t.root().await;
    let data = payload(2500);

    t.api.reset_call_counts();
    let link = t.file(&root, "big.bin", &data).await;

    let calls = t.api.call_counts();
    assert_eq!(calls.get("request_block_upload"), 25);
    assert_eq!(calls.get("upload_block"), 250);
    assert_eq!(calls.get("commit_revision"), 1);

    let revision = t.drive.active_revision(&link, &t.cancel).await.unwrap();
    assert_eq!(revision.blocks.len(), 250);
    for (expected, block) in (1u32..).zip(&revision.blocks) {
        assert_eq!(block.index, expected);
        // nonce || ciphertext || tag
        assert_eq!(block.size, 12 + 10 + 16);
    }
    assert_eq!(revision.metadata.size, 250 * 38);

    assert_eq!(t.drive.download_bytes(&link, &t.cancel).await.unwrap(), data);
}

#[tokio::test]
async fn test_empty_file_in_subfolder() {
    let t = test_drive(Config::default()).await;
    let root = t.root().await;
    let folder = t.folder(&root, "a").await;

    let listing = t
        .drive
        .list_recursive(
            &root,
            &sealdrive_client::ListOptions::shallow().excluding_root(),
            &t.cancel,
        )
        .await
        .unwrap();
    let paths: Vec<&str> = listing.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/a"]);

    let file = t.file(&folder, "empty.txt", b"").await;
    let revisions = t.drive.revisions(&file, &t.cancel).await.unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].state, RevisionState::Active);
    assert_eq!(revisions[0].size, 0);

    let downloaded = t.drive.download(&file, &t.cancel).await.unwrap();
    assert_eq!(downloaded.attrs.size, 0);
    assert!(downloaded.stream.collect_bytes().await.unwrap().is_empty());
    assert_eq!(t.api.call_counts().get("upload_block"), 0);
}

#[tokio::test]
async fn test_tampered_block_fails_download() {
    let t = test_drive(small_blocks()).await;
    let root = t.root().await;
    let link = t.file(&root, "secret.bin", &payload(40)).await;

    let revision = t.drive.active_revision(&link, &t.cancel).await.unwrap();
    t.api
        .tamper_block(&revision.blocks[1].token, |data| data[20] ^= 0x01)
        .unwrap();

    // Manifest and attributes are intact, so opening still works
    let downloaded = t.drive.download(&link, &t.cancel).await.unwrap();
    let err = downloaded.stream.collect_bytes().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Crypto);
}

#[tokio::test]
async fn test_async_read_adapter() {
    let t = test_drive(small_blocks()).await;
    let root = t.root().await;
    let data = payload(100);
    let link = t.file(&root, "stream.bin", &data).await;

    let downloaded = t.drive.download(&link, &t.cancel).await.unwrap();
    let mut reader = downloaded.stream.into_async_read();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, data);
}

#[tokio::test]
async fn test_upload_path_keeps_mtime_and_mime() {
    let t = test_drive(small_blocks()).await;
    let root = t.root().await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.png");
    std::fs::write(&path, payload(70)).unwrap();
    let mtime: chrono::DateTime<chrono::Utc> =
        std::fs::metadata(&path).unwrap().modified().unwrap().into();

    let link = t.drive.upload_path(&root, &path, &t.cancel).await.unwrap();
    assert_eq!(
        link.file_properties.as_ref().unwrap().mime_type,
        "image/png"
    );

    let downloaded = t.drive.download(&link, &t.cancel).await.unwrap();
    assert_eq!(downloaded.attrs.modification_time, mtime);
    assert_eq!(downloaded.stream.collect_bytes().await.unwrap(), payload(70));
}

#[tokio::test]
async fn test_new_revision_replaces_content() {
    let t = test_drive(small_blocks()).await;
    let root = t.root().await;
    t.file(&root, "notes.txt", b"first version").await;
    let link = t.file(&root, "notes.txt", b"second, longer version").await;

    let revisions = t.drive.revisions(&link, &t.cancel).await.unwrap();
    let states: Vec<RevisionState> = revisions.iter().map(|r| r.state).collect();
    assert_eq!(states.len(), 2);
    assert_eq!(
        states.iter().filter(|s| **s == RevisionState::Active).count(),
        1
    );
    assert!(states.contains(&RevisionState::Obsolete));

    let data = t.drive.download_bytes(&link, &t.cancel).await.unwrap();
    assert_eq!(data, b"second, longer version");
}

#[tokio::test]
async fn test_stop_after_blocks_leaves_draft() {
    let t = test_drive(small_blocks()).await;
    let root = t.root().await;
    let data = payload(50);

    let outcome = t
        .drive
        .upload_until(
            &root,
            "partial.bin",
            &mut &data[..],
            UploadStopPoint::BlocksUploaded,
            &t.cancel,
        )
        .await
        .unwrap();
    assert_eq!(outcome.stage, UploadStage::BlocksUploaded);
    assert_eq!(outcome.blocks, 4);
    assert_eq!(outcome.size, 50);
    assert_eq!(outcome.link.state, LinkState::Draft);
    assert_eq!(t.api.call_counts().get("commit_revision"), 0);

    // Draft-only files have no active revision to read
    let err = t.drive.download(&outcome.link, &t.cancel).await.unwrap_err();
    assert!(matches!(
        err,
        DriveError::ActiveRevisionCount { found: 0, .. }
    ));
}

#[tokio::test]
async fn test_download_rejects_folder() {
    let t = test_drive(Config::default()).await;
    let root = t.root().await;
    let err = t.drive.download(&root, &t.cancel).await.unwrap_err();
    assert!(matches!(err, DriveError::NotAFile(_)));
}

#[tokio::test]
async fn test_cancelled_upload_makes_no_calls() {
    let t = test_drive(Config::default()).await;
    let root = t.root().await;
    t.api.reset_call_counts();
    t.cancel.cancel();

    let err = t
        .drive
        .upload_bytes(&root, "never.txt", &b"data"[..], &t.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, DriveError::Cancelled));
    assert_eq!(t.api.call_counts().total(), 0);
}

#[test_log::test(tokio::test)]
async fn test_api_failure_aborts_upload() {
    let t = test_drive(small_blocks()).await;
    let root = t.root().await;
    t.api.fail_next(
        "upload_block",
        sealdrive_store::ApiError::Transport("connection reset".into()),
    );

    let err = t
        .drive
        .upload_bytes(&root, "flaky.bin", payload(40), &t.cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Api);
    assert_eq!(t.api.call_counts().get("commit_revision"), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_roundtrip(
        data in proptest::collection::vec(any::<u8>(), 0..200),
        chunk_size in 1usize..48,
        batch in 1usize..5,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let downloaded = runtime.block_on(async {
            let config = Config::default()
                .with_chunk_size(chunk_size)
                .with_upload_batch_size(batch);
            let t = test_drive(config).await;
            let root = t.root().await;
            let link = t.file(&root, "prop.bin", &data).await;
            t.drive.download_bytes(&link, &t.cancel).await.unwrap()
        });
        prop_assert_eq!(downloaded, data);
    }
}
