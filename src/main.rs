use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use pushpool::config::Config;
use pushpool::feed::{ensure_content_type, parse_feed, read_feed, ParsedFeed};
use pushpool::index::{IndexDocument, IndexQuery, SearchIndex, SqliteIndex};
use pushpool::model::FeedType;
use pushpool::reconcile::{
    combine_from_store, delete_items, restore_from_deletion, EntryReconciler,
};
use pushpool::storage::{Database, ItemStore, StoreError};

#[derive(Parser, Debug)]
#[command(
    name = "pushpool",
    about = "Reconcile shared/selected/deleted feed state and keep the search index in sync"
)]
struct Args {
    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = "pushpool.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a feed submission to the pool
    Update {
        /// Atom or RSS document
        file: PathBuf,
        /// Media type the submission was sent with
        #[arg(long, default_value = "application/atom+xml")]
        content_type: String,
    },
    /// Remove every item listed in a feed from the pool and the index
    Delete {
        file: PathBuf,
        #[arg(long, default_value = "application/atom+xml")]
        content_type: String,
    },
    /// Take an item out of the deleted feed
    Undelete { uid: String },
    /// Print one feed's items as JSON, newest first
    View { feed: FeedType },
    /// Full-text search over the index
    Search { query: String },
    /// Reindex every stored item and rebuild the full-text table
    RebuildIndex,
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in path: {}", path.display()))
}

async fn open_store(config: &Config) -> Result<Database> {
    match Database::open(path_str(&config.database_path)?).await {
        Ok(db) => Ok(db),
        Err(StoreError::InstanceLocked) => {
            eprintln!(
                "Error: The item store at {} is locked by another process. Please try again.",
                config.database_path.display()
            );
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open item store: {}", e)),
    }
}

async fn open_index(config: &Config) -> Result<SqliteIndex> {
    let path = config.index_path()?;
    SqliteIndex::open(path_str(path)?)
        .await
        .with_context(|| format!("Failed to open search index at {}", path.display()))
}

async fn load_feed(config: &Config, file: &Path, content_type: &str) -> Result<ParsedFeed> {
    ensure_content_type(content_type)?;
    let bytes = read_feed(file, config.max_feed_bytes)
        .await
        .with_context(|| format!("Failed to read feed: {}", file.display()))?;
    parse_feed(&bytes).with_context(|| format!("Failed to parse feed: {}", file.display()))
}

/// Subscriber in effect while the configuration itself is being read.
fn bootstrap_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish()
}

/// Load the config file so that its warnings (unknown keys) reach stderr
/// even though the configured log filter is not installed yet.
fn load_config(path: &Path) -> Result<Config> {
    let config = tracing::subscriber::with_default(bootstrap_subscriber(std::io::stderr), || {
        Config::load(path)
    })
    .with_context(|| format!("Failed to load config: {}", path.display()))?;
    Ok(config.with_env_overrides())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    // RUST_LOG wins over the configured filter; logs go to stderr so stdout
    // stays machine-readable
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Update { file, content_type } => {
            let feed = load_feed(&config, &file, &content_type).await?;
            let store = open_store(&config).await?;
            let index = open_index(&config).await?;

            let summary = EntryReconciler::new(&store, &index)
                .process_feed(&feed)
                .await
                .context("Failed to apply feed")?;
            println!("{}", summary);
        }
        Command::Delete { file, content_type } => {
            let feed = load_feed(&config, &file, &content_type).await?;
            let store = open_store(&config).await?;
            let index = open_index(&config).await?;

            let uids = feed.entries.iter().map(|entry| entry.id.as_str());
            let summary = delete_items(&store, &index, uids)
                .await
                .context("Failed to delete items")?;
            println!("{}", summary);
        }
        Command::Undelete { uid } => {
            let store = open_store(&config).await?;
            let index = open_index(&config).await?;

            restore_from_deletion(&store, &index, &uid)
                .await
                .with_context(|| format!("Failed to restore {}", uid))?;
            println!("Item no longer marked as deleted");
        }
        Command::View { feed } => {
            let store = open_store(&config).await?;
            let items = combine_from_store(&store, feed)
                .await
                .context("Failed to load items")?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Command::Search { query } => {
            let index = open_index(&config).await?;
            match index.check_consistency().await {
                Ok(report) if !report.is_consistent => {
                    tracing::warn!(
                        documents = report.documents_count,
                        fts = report.fts_count,
                        orphaned = report.orphaned_fts_entries,
                        missing = report.missing_fts_entries,
                        "FTS index inconsistent, run rebuild-index"
                    );
                }
                Ok(_) => tracing::debug!("FTS5 index is consistent"),
                Err(e) => tracing::warn!(error = %e, "Failed to check FTS5 consistency"),
            }

            let documents = index
                .search(&IndexQuery::Text(query))
                .await
                .context("Search failed")?;
            let fields: Vec<_> = documents.into_iter().map(IndexDocument::into_fields).collect();
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
        Command::RebuildIndex => {
            let store = open_store(&config).await?;
            let index = open_index(&config).await?;

            tracing::info!("Rebuilding search index...");
            let items = store.list().await.context("Failed to load items")?;
            let documents = items
                .iter()
                .map(IndexDocument::from_item)
                .collect::<Result<Vec<_>, _>>()?;

            let replaced = index
                .replace_all(documents)
                .await
                .context("Failed to reindex items")?;
            let count = index
                .rebuild_fts()
                .await
                .context("Failed to rebuild search index")?;
            tracing::info!(replaced = replaced, documents = count, "Search index rebuilt");
            println!("Search index rebuilt: {} items indexed", count);
        }
    }

    Ok(())
}
