//! # Member QA CLI (`mqa`)
//!
//! The `mqa` binary wraps the library with three commands:
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mqa fetch` | One-off ingestion run; merges into the snapshot file |
//! | `mqa ask "<question>"` | Answer a question against the persisted snapshot |
//! | `mqa serve` | Start the HTTP server with background refresh |
//!
//! ## Examples
//!
//! ```bash
//! mqa fetch --config ./config/mqa.toml
//! mqa ask "How many cars does Vikram Desai have?" --config ./config/mqa.toml
//! mqa serve --config ./config/mqa.toml
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use member_qa::config::{load_config, Config};
use member_qa::engine::QaEngine;
use member_qa::fetch::{self, FetchOptions, HttpMessageSource};
use member_qa::refresh::Refresher;
use member_qa::server::run_server;
use member_qa::snapshot;

/// Member QA — answer natural-language questions about member chat
/// messages with lexical retrieval and rule-based extraction.
#[derive(Parser)]
#[command(
    name = "mqa",
    about = "Member QA — lexical retrieval and rule-based answers over member chat messages",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingestion pass and merge it into the snapshot file.
    Fetch {
        /// Ignore the existing snapshot and re-fetch from the beginning.
        #[arg(long)]
        full: bool,
    },

    /// Answer a single question against the persisted snapshot.
    Ask {
        /// Natural-language question.
        question: String,
    },

    /// Start the HTTP server with periodic background refresh.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Fetch { full } => run_fetch(&config, full).await,
        Commands::Ask { question } => run_ask(&config, &question),
        Commands::Serve => run_serve(&config).await,
    }
}

async fn run_fetch(config: &Config, full: bool) -> Result<()> {
    let source = HttpMessageSource::new(&config.source)?;
    let existing = if full {
        None
    } else {
        snapshot::load(&config.snapshot.path)
    };
    let known_ids: HashSet<String> = existing
        .iter()
        .flat_map(|s| s.messages.iter())
        .map(|m| m.id.clone())
        .collect();

    let outcome = fetch::fetch_all(&source, &known_ids, &FetchOptions::from(&config.source)).await;
    let added = outcome.messages.len();
    let merged = snapshot::merge(existing, outcome.messages);
    snapshot::save(&config.snapshot.path, &merged)?;

    println!("fetch");
    println!("  pages: {}", outcome.pages);
    println!("  new messages: {}", added);
    println!("  skipped records: {}", outcome.skipped);
    println!("  corpus size: {}", merged.len());
    println!("  complete: {}", outcome.complete);
    println!("ok");
    Ok(())
}

fn run_ask(config: &Config, question: &str) -> Result<()> {
    let Some(snap) = snapshot::load(&config.snapshot.path) else {
        anyhow::bail!(
            "no snapshot at {}; run `mqa fetch` first",
            config.snapshot.path.display()
        );
    };

    let engine = QaEngine::new(config.retrieval.top_k);
    engine.publish(snap);

    let answer = engine.answer(question);
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}

async fn run_serve(config: &Config) -> Result<()> {
    let engine = Arc::new(QaEngine::new(config.retrieval.top_k));
    let source = Arc::new(HttpMessageSource::new(&config.source)?);
    let refresher = Arc::new(Refresher::new(engine.clone(), source, config));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let refresh_task = tokio::spawn(refresher.run(shutdown_rx));

    run_server(engine, &config.server.bind).await?;

    // The server only returns on shutdown; stop the refresh task too.
    let _ = shutdown_tx.send(true);
    refresh_task.await?;
    Ok(())
}
