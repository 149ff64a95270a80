//! GalleryStore CLI - Command line interface for photo storage backends.
//!
//! This tool drives the storage layer from a JSON config file: listing,
//! reading and writing objects, moving them between keys, and finding
//! Live Photo pairs.

mod config;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gallerystore_storage::{
    create_default_registry, ProviderCategory, ProviderRegistry, StorageManager,
    TransactionalStorageManager, UploadOptions,
};

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "gallerystore")]
#[command(about = "GalleryStore - Photo gallery storage backends")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: $GALLERYSTORE_CONFIG, then the user config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered provider kinds.
    Providers,

    /// List stored objects.
    List {
        /// Only list photos.
        #[arg(short, long)]
        images: bool,
    },

    /// Download an object.
    Get {
        /// Object key.
        key: String,

        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a file as one transaction.
    Put {
        /// Object key.
        key: String,

        /// Source file.
        file: PathBuf,

        /// MIME type stored with the object.
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Move an object to a new key.
    Mv {
        /// Source key.
        from: String,

        /// Target key.
        to: String,
    },

    /// Delete an object.
    Rm {
        /// Object key.
        key: String,
    },

    /// Print the public URL of a key.
    Url {
        /// Object key.
        key: String,
    },

    /// List Live Photo pairs.
    LivePhotos,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let registry = create_default_registry();

    if let Commands::Providers = cli.command {
        cmd_providers(&registry);
        return Ok(());
    }

    let config_path = config::resolve_path(cli.config)?;
    let config = CliConfig::load(&config_path).await?;
    let manager = config.build_manager(&registry)?;
    info!(
        provider = %manager.provider().name(),
        config = %config_path.display(),
        "Storage ready"
    );

    match cli.command {
        Commands::Providers => Ok(()),

        Commands::List { images } => cmd_list(&manager, images).await,

        Commands::Get { key, output } => cmd_get(&manager, &key, output.as_deref()).await,

        Commands::Put {
            key,
            file,
            content_type,
        } => cmd_put(manager, &key, &file, content_type).await,

        Commands::Mv { from, to } => cmd_move(&manager, &from, &to).await,

        Commands::Rm { key } => cmd_remove(&manager, &key).await,

        Commands::Url { key } => cmd_url(&manager, &key).await,

        Commands::LivePhotos => cmd_live_photos(&manager).await,
    }
}

/// Print registered provider kinds by category.
fn cmd_providers(registry: &ProviderRegistry) {
    for category in [ProviderCategory::Local, ProviderCategory::Remote] {
        println!("{}:", category);
        for kind in registry.kinds_in(category) {
            println!("  {}", kind);
        }
    }
}

/// List objects.
async fn cmd_list(manager: &StorageManager, images: bool) -> Result<()> {
    let objects = if images {
        manager.list_images().await
    } else {
        manager.list_all_files().await
    }
    .context("Failed to list objects")?;

    if objects.is_empty() {
        println!("No objects found.");
        return Ok(());
    }

    for object in &objects {
        println!(
            "{:>12}  {}  {}",
            object.size,
            object.last_modified.format("%Y-%m-%d %H:%M"),
            object.key
        );
    }
    println!("{} object(s)", objects.len());

    Ok(())
}

/// Download an object.
async fn cmd_get(manager: &StorageManager, key: &str, output: Option<&Path>) -> Result<()> {
    let data = manager
        .get_file(key)
        .await
        .context("Failed to read object")?
        .with_context(|| format!("Object not found: {}", key))?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &data)
                .await
                .context("Failed to write output file")?;
            println!("Saved {} ({} bytes) to {}", key, data.len(), path.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(&data)
                .context("Failed to write to stdout")?;
        }
    }

    Ok(())
}

/// Upload a file through a transaction: stage, flush, roll back on failure.
async fn cmd_put(
    manager: StorageManager,
    key: &str,
    file: &Path,
    content_type: Option<String>,
) -> Result<()> {
    let content = tokio::fs::read(file)
        .await
        .context("Failed to read source file")?;

    let options = UploadOptions { content_type };
    let mut tx = TransactionalStorageManager::new(manager);
    tx.upload_file(key, Bytes::from(content), options);

    match tx.flush_uploads().await {
        Ok(objects) => {
            tx.finish();
            for object in objects {
                println!("Uploaded {} ({} bytes)", object.key, object.size);
            }
            Ok(())
        }
        Err(e) => {
            let report = tx.rollback_uploads().await;
            for (key, failure) in &report.failed {
                warn!(key = %key, error = %failure, "Rollback left object behind");
            }
            Err(e).context("Failed to upload file")
        }
    }
}

/// Move an object.
async fn cmd_move(manager: &StorageManager, from: &str, to: &str) -> Result<()> {
    let object = manager
        .move_file(from, to, &UploadOptions::default())
        .await
        .context("Failed to move object")?;

    println!("Moved {} -> {} ({} bytes)", from, object.key, object.size);
    Ok(())
}

/// Delete an object.
async fn cmd_remove(manager: &StorageManager, key: &str) -> Result<()> {
    manager
        .delete_file(key)
        .await
        .context("Failed to delete object")?;

    println!("Deleted {}", key);
    Ok(())
}

/// Print a public URL.
async fn cmd_url(manager: &StorageManager, key: &str) -> Result<()> {
    let url = manager
        .generate_public_url(key)
        .await
        .context("Failed to build URL")?;

    println!("{}", url);
    Ok(())
}

/// List Live Photo pairs.
async fn cmd_live_photos(manager: &StorageManager) -> Result<()> {
    let pairs = manager
        .detect_live_photos(None)
        .await
        .context("Failed to detect Live Photos")?;

    if pairs.is_empty() {
        println!("No Live Photos found.");
        return Ok(());
    }

    let mut pairs: Vec<_> = pairs.into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    for (image, video) in &pairs {
        println!("{}  <->  {}", image, video.key);
    }
    println!("{} pair(s)", pairs.len());

    Ok(())
}
