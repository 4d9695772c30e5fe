use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use bytes::Bytes;
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use futures::TryStreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spool_core::impls::{InMemoryCache, InMemoryLockService, InMemoryObjectStore};
use spool_core::ports::FixedClock;
use spool_core::{EngineConfig, ResumableUploadStore, UploadMetadata, UploadStoreBuilder};

/// spool - buffered resumable uploads against in-memory collaborators
#[derive(Parser, Debug)]
#[command(name = "spool")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "spool.toml")]
    config: String,

    /// Declared length of the demo upload, in bytes
    #[arg(long, default_value_t = 12 * 1024 * 1024)]
    length: u64,

    /// Size of each append call, in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    chunk_size: usize,

    /// Filename recorded in the upload metadata
    #[arg(long, default_value = "demo.bin")]
    filename: String,
}

fn load_config(path: &str) -> anyhow::Result<EngineConfig> {
    let mut figment = Figment::new();
    if Path::new(path).exists() {
        tracing::info!("Loading configuration from {}", path);
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    figment
        .merge(Env::prefixed("SPOOL_"))
        .extract()
        .context("failed to load configuration")
}

fn demo_payload(length: u64) -> Vec<u8> {
    (0..length).map(|i| (i % 251) as u8).collect()
}

async fn upload_in_chunks(
    store: &ResumableUploadStore,
    args: &Args,
) -> anyhow::Result<spool_core::UploadId> {
    let mut metadata = UploadMetadata::new();
    metadata.insert("filename", args.filename.as_str());
    let id = store
        .create_upload(args.length, &metadata.to_header())
        .await
        .context("create upload")?;
    tracing::info!(upload_id = %id, length = args.length, "created upload");

    let payload = Bytes::from(demo_payload(args.length));
    let mut sent = 0;
    while sent < payload.len() {
        let end = (sent + args.chunk_size).min(payload.len());
        let accepted = store
            .append_bytes(&id, payload.slice(sent..end))
            .await
            .with_context(|| format!("append at offset {sent}"))?;
        sent += accepted as usize;

        let offset = store.get_offset(&id).await?;
        tracing::info!(upload_id = %id, accepted, offset, "appended chunk");
    }

    let content: Vec<Bytes> = store.get_content(&id).await?.try_collect().await?;
    let stored: Vec<u8> = content.concat();
    if payload != stored {
        bail!("stored object does not match the uploaded bytes");
    }
    Ok(id)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if args.chunk_size == 0 {
        bail!("--chunk-size must be greater than zero");
    }
    let config = load_config(&args.config)?;
    let expiration = config.expiration_delta();

    // 期限切れ回収を実演するため、時刻は手で進める
    let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
    let store = UploadStoreBuilder::new(config)
        .cache(Arc::new(InMemoryCache::new(clock.clone())))
        .locks(Arc::new(InMemoryLockService::new()))
        .object_store(Arc::new(InMemoryObjectStore::new()))
        .clock(clock.clone())
        .build()
        .context("failed to build upload store")?;

    let id = upload_in_chunks(&store, &args).await?;
    let info = store.get_info(&id).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);

    // 途中で放棄されたアップロード
    let abandoned = store.create_upload(2, "").await?;
    store
        .append_bytes(&abandoned, Bytes::from_static(b"x"))
        .await?;

    clock.advance(expiration + chrono::Duration::seconds(1));
    let pending = store
        .list_pending_deletion(store.config().sweep_batch_size, &[])
        .await?;
    let removed = store.remove_expired().await?;
    tracing::info!(pending = pending.len(), removed, "swept expired uploads");

    println!(
        "completed upload still present: {}, abandoned upload present: {}",
        store.exists(&id).await?,
        store.exists(&abandoned).await?
    );
    Ok(())
}
