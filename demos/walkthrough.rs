//! End-to-end walkthrough against the in-memory store
//!
//! This demo:
//! - Creates a share root owned by a fresh identity
//! - Uploads a random file in small blocks
//! - Moves it into a subfolder and lists the tree
//! - Downloads and verifies it, then empties the drive
//!
//! Run with: cargo run --example walkthrough -- --size 100000
//! Set RUST_LOG=sealdrive_client=debug to watch the engine.

use anyhow::Context;
use clap::Parser;
use rand::RngCore;
use sealdrive_client::{Config, Drive, Identity, ListOptions, deadline_token};
use sealdrive_crypto::DefaultCryptoProvider;
use sealdrive_store::MemoryDriveApi;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "walkthrough", about = "SealDrive engine walkthrough")]
struct Args {
    /// Optional TOML config file, overridden by SEALDRIVE_* variables
    #[arg(long, env = "SEALDRIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Size of the random file to upload
    #[arg(long, default_value_t = 64 * 1024)]
    size: usize,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("loading configuration")?;
    info!(?config, "Loaded configuration");

    // ==================== Set up the drive ====================

    let crypto = Arc::new(DefaultCryptoProvider::new());
    let identity = Identity::generate("demo@sealdrive.local");
    let api = MemoryDriveApi::new();
    api.init_root(identity.root_folder_request(crypto.as_ref(), "My Drive")?)?;

    let drive = Drive::connect(Arc::new(api.clone()), crypto, identity, config).await?;
    let cancel = deadline_token(&CancellationToken::new(), Duration::from_secs(args.timeout_secs));
    let root = drive.root_link(&cancel).await?;

    // ==================== Upload ====================

    let mut data = vec![0u8; args.size];
    rand::thread_rng().fill_bytes(&mut data);
    let file = drive
        .upload_bytes(&root, "random.bin", bytes::Bytes::from(data.clone()), &cancel)
        .await?;
    let revision = drive.active_revision(&file, &cancel).await?;
    println!(
        "Uploaded {} bytes as {} blocks ({} bytes stored)",
        args.size,
        revision.blocks.len(),
        revision.metadata.size
    );

    // ==================== Move and list ====================

    let archive_id = drive.create_folder(&root, "archive", &cancel).await?;
    let archive = drive.get_link(&archive_id, &cancel).await?;
    let file = drive.move_link(&file, &archive, "kept.bin", &cancel).await?;

    println!("\nTree:");
    for entry in drive
        .list_recursive(&root, &ListOptions::new(), &cancel)
        .await?
    {
        let kind = if entry.is_folder { "dir " } else { "file" };
        println!("  {kind} {}", entry.path);
    }

    // ==================== Download ====================

    let downloaded = drive.download(&file, &cancel).await?;
    println!(
        "\nAttributes: size={} modified={}",
        downloaded.attrs.size, downloaded.attrs.modification_time
    );
    let content = downloaded.stream.collect_bytes().await?;
    anyhow::ensure!(content == data, "downloaded content differs");
    println!("Downloaded content matches");

    // ==================== Clean up ====================

    drive.empty_root_folder(&cancel).await?;
    drive.empty_trash(&cancel).await?;
    println!(
        "\nDrive emptied: {} links left, {} store calls made",
        api.link_count(),
        api.call_counts().total()
    );
    Ok(())
}
