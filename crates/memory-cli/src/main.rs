// ============================================================================
// companion-memory - CLI for inspecting and managing companion memory
// ============================================================================
// Usage:
//   companion-memory stats                           Show database statistics
//   companion-memory read   -c aria -m gpt -u u1     Print the recent window
//   companion-memory append -c aria -m gpt -u u1 TEXT
//   companion-memory seed   -c aria -m gpt -u u1 --file aria.txt
//   companion-memory recall --source aria.txt QUERY  Semantic recall
//   companion-memory export -c aria -m gpt -u u1     Dump a log as JSON
//   companion-memory purge  -c aria -m gpt -u u1 --yes
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use memory_core::{
    CompanionKey, EntrySource, HistoryDb, HistoryStore, MemoryManager, RecallOutcome,
    DEFAULT_DELIMITER,
};
use memory_core::config::DEFAULT_RECENT_WINDOW;
use tracing::warn;

/// Companion memory inspection tool
#[derive(Parser)]
#[command(
    name = "companion-memory",
    version,
    about = "Inspect and manage companion conversation memory"
)]
struct Cli {
    /// Path to the history database (default: MEMORY_DB_PATH or ~/.companion/memory.redb)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Conversation identity arguments
#[derive(Args)]
struct KeyArgs {
    /// Companion name
    #[arg(short = 'c', long)]
    companion: String,

    /// Model name
    #[arg(short = 'm', long)]
    model: String,

    /// User id
    #[arg(short = 'u', long)]
    user: String,
}

impl KeyArgs {
    fn key(&self) -> CompanionKey {
        CompanionKey::new(&self.companion, &self.model, &self.user)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show database statistics (logs, entries, seeded vs live)
    Stats,

    /// Print the most recent history window, oldest first
    Read {
        #[command(flatten)]
        key: KeyArgs,

        /// Number of entries to show
        #[arg(long, default_value_t = DEFAULT_RECENT_WINDOW)]
        window: usize,
    },

    /// Append a conversation turn
    Append {
        #[command(flatten)]
        key: KeyArgs,

        /// Text to append
        text: String,
    },

    /// Seed a log with backstory content (no-op if the log exists)
    Seed {
        #[command(flatten)]
        key: KeyArgs,

        /// File holding the seed content
        #[arg(long)]
        file: PathBuf,

        /// Line delimiter (escape sequences \n, \t and \r are understood)
        #[arg(long, default_value = "\\n")]
        delimiter: String,
    },

    /// Semantic recall against the vector index (needs QDRANT_* and OPENAI_API_KEY)
    Recall {
        /// Source tag to restrict results to
        #[arg(long)]
        source: String,

        /// Query text
        query: String,
    },

    /// Export a history log with scores as JSON
    Export {
        #[command(flatten)]
        key: KeyArgs,

        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Delete a history log
    Purge {
        #[command(flatten)]
        key: KeyArgs,

        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

fn format_timestamp(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ms))
}

/// Turn `\n`-style escapes typed on the command line into real characters
fn parse_delimiter(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    if out.is_empty() {
        DEFAULT_DELIMITER.to_string()
    } else {
        out
    }
}

fn resolve_db_path(cli_path: Option<PathBuf>) -> Option<PathBuf> {
    cli_path.or_else(|| std::env::var("MEMORY_DB_PATH").ok().map(PathBuf::from))
}

fn open_db(cli_path: Option<PathBuf>) -> Result<Arc<HistoryDb>> {
    Ok(Arc::new(HistoryDb::open(
        resolve_db_path(cli_path).as_deref(),
    )?))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Could not load .env file: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("memory_core=info".parse()?)
                .add_directive("companion_memory=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}

async fn run(cli: Cli) -> Result<()> {
    let db_path = cli.db_path;

    match cli.command {
        Commands::Stats => cmd_stats(&*open_db(db_path)?),
        Commands::Read { key, window } => cmd_read(open_db(db_path)?, &key.key(), window).await,
        Commands::Append { key, text } => cmd_append(open_db(db_path)?, &key.key(), &text).await,
        Commands::Seed {
            key,
            file,
            delimiter,
        } => cmd_seed(open_db(db_path)?, &key.key(), &file, &delimiter).await,
        Commands::Recall { source, query } => cmd_recall(&source, &query).await,
        Commands::Export { key, format } => cmd_export(&*open_db(db_path)?, &key.key(), &format),
        Commands::Purge { key, yes } => cmd_purge(&*open_db(db_path)?, &key.key(), yes),
    }
}

fn cmd_stats(db: &HistoryDb) -> Result<()> {
    let stats = db.stats()?;

    println!("=== Companion Memory Stats ===");
    match db.path() {
        Some(path) => println!("Database: {}", path.display()),
        None => println!("Database: (in memory)"),
    }
    println!();
    println!("Logs:     {}", stats.total_logs);
    println!("Entries:  {} total", stats.total_entries);
    println!("  {:12} {}", "seed", stats.seed_entries);
    println!("  {:12} {}", "live", stats.live_entries);

    Ok(())
}

async fn cmd_read(db: Arc<HistoryDb>, key: &CompanionKey, window: usize) -> Result<()> {
    let store = HistoryStore::new(db, window.max(1));
    let lines = store.read_recent(key).await?;

    if lines.is_empty() {
        println!("No history for {}.", key);
        return Ok(());
    }

    println!("{}", lines.join("\n"));
    Ok(())
}

async fn cmd_append(db: Arc<HistoryDb>, key: &CompanionKey, text: &str) -> Result<()> {
    let store = HistoryStore::new(db, DEFAULT_RECENT_WINDOW);
    let score = store.append(key, text).await?;

    println!("Appended to {} at {}", key, format_timestamp(score));
    Ok(())
}

async fn cmd_seed(
    db: Arc<HistoryDb>,
    key: &CompanionKey,
    file: &Path,
    delimiter: &str,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read seed file {}", file.display()))?;
    let store = HistoryStore::new(db, DEFAULT_RECENT_WINDOW);

    match store.seed(key, &content, &parse_delimiter(delimiter)).await? {
        Some(lines) => println!("Seeded {} lines for {}", lines, key),
        None => println!("{} already has chat history, nothing seeded.", key),
    }
    Ok(())
}

async fn cmd_recall(source: &str, query: &str) -> Result<()> {
    let manager = MemoryManager::from_env().await?;

    let passages = match manager.recall(query, source).await {
        RecallOutcome::Found(passages) => passages,
        RecallOutcome::Degraded(reason) => {
            warn!("Recall degraded: {}", reason);
            anyhow::bail!("Recall failed: {}", reason);
        }
    };

    if passages.is_empty() {
        println!("No passages found for source '{}'.", source);
        return Ok(());
    }

    for (rank, passage) in passages.iter().enumerate() {
        println!("--- #{} ---", rank + 1);
        println!("{}", passage.text);
        if !passage.metadata.is_empty() {
            println!("{}", serde_json::Value::Object(passage.metadata.clone()));
        }
    }
    Ok(())
}

fn cmd_export(db: &HistoryDb, key: &CompanionKey, format: &str) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }
    key.validate()?;

    let entries = db.entries(&key.derive_key())?;
    let seeded = entries
        .iter()
        .filter(|e| e.record.source == EntrySource::Seed)
        .count();

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "companion": key.companion_name(),
        "model": key.model_name(),
        "user": key.user_id(),
        "storage_key": key.derive_key(),
        "seed_entries": seeded,
        "entries": entries,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

fn cmd_purge(db: &HistoryDb, key: &CompanionKey, yes: bool) -> Result<()> {
    key.validate()?;
    let storage_key = key.derive_key();

    if !yes {
        let count = db.entries(&storage_key)?.len();
        println!("=== DRY RUN: no data will be deleted ===");
        println!("Would delete {} entries for {}", count, key);
        println!("Re-run with --yes to delete.");
        return Ok(());
    }

    let removed = db.delete_log(&storage_key)?;
    println!("Deleted {} entries for {}", removed, key);
    Ok(())
}
