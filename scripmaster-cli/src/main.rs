//! scripmaster CLI: reconcile vendor scrip masters and load them into stores.
//!
//! Commands:
//! - `run`: fetch, persist, reconcile, report
//! - `reconcile`: fetch, reconcile, report (no store writes)
//! - `init-config`: write the default configuration as TOML
//! - `check sqlite` / `check mongo`: row count and a sample from a store

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scripmaster_runner::{
    DocumentStore, MongoDocumentStore, Pipeline, PipelineConfig, RelationalSink, RunSummary,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "scripmaster",
    about = "Reconcile Upstox and Dhan instrument masters into MongoDB and SQLite"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch both feeds, load the stores, reconcile and write reports.
    Run {
        /// Path to a TOML config file. Built-in defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Fetch both feeds, reconcile and write reports without touching the stores.
    Reconcile {
        /// Path to a TOML config file. Built-in defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write the default configuration to a file.
    InitConfig {
        #[arg(long, default_value = "scripmaster.toml")]
        out: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Inspect what a previous run stored.
    Check {
        #[command(subcommand)]
        store: CheckStore,
    },
}

#[derive(Subcommand)]
enum CheckStore {
    /// Row count and first rows of the SQLite table.
    Sqlite {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Document count and first documents of the MongoDB collection.
    Mongo {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scripmaster_core=info,scripmaster_runner=info,scripmaster=info".into()),
        )
        .with(fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_pipeline(config.as_deref(), true),
        Commands::Reconcile { config } => run_pipeline(config.as_deref(), false),
        Commands::InitConfig { out, force } => init_config(&out, force),
        Commands::Check { store } => match store {
            CheckStore::Sqlite { config, limit } => check_sqlite(config.as_deref(), limit),
            CheckStore::Mongo { config, limit } => check_mongo(config.as_deref(), limit),
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let config = PipelineConfig::default().with_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            config
        }
    };
    Ok(config)
}

fn run_pipeline(config_path: Option<&Path>, persist: bool) -> Result<()> {
    let config = load_config(config_path)?;

    let mut pipeline = Pipeline::new(&config);
    if persist {
        pipeline = pipeline.with_configured_sinks()?;
    }

    let summary = pipeline.run()?;
    print_summary(&summary, &config);
    Ok(())
}

fn print_summary(summary: &RunSummary, config: &PipelineConfig) {
    let m = &summary.manifest;
    let label_a = &config.source_a.label;
    let label_b = &config.source_b.label;

    println!();
    println!("=== Reconciliation ===");
    println!("{label_a} equities:  {}", m.extracted.source_a);
    println!("{label_b} equities:  {}", m.extracted.source_b);
    println!("Common:            {}", m.reconciliation.common);
    println!("Only in {label_a}:   {}", m.reconciliation.only_a);
    println!("Only in {label_b}:   {}", m.reconciliation.only_b);
    if m.reconciliation.collapsed_a + m.reconciliation.collapsed_b > 0 {
        println!(
            "Collapsed dupes:   {} / {}",
            m.reconciliation.collapsed_a, m.reconciliation.collapsed_b
        );
    }

    if !m.sinks.is_empty() {
        println!();
        println!("=== Stores ===");
        for sink in &m.sinks {
            println!(
                "{:<28} {} records, {} written, {} unchanged",
                sink.store, sink.records, sink.written, sink.unchanged
            );
        }
    }

    println!();
    println!("Reports:  {}", m.reports.common.display());
    println!("          {}", m.reports.only_a.display());
    println!("          {}", m.reports.only_b.display());
    println!("Manifest: {}", summary.manifest_path.display());
}

fn init_config(out: &Path, force: bool) -> Result<()> {
    if out.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", out.display());
    }
    let toml = PipelineConfig::default().to_toml()?;
    std::fs::write(out, toml).with_context(|| format!("failed to write {}", out.display()))?;
    println!("Wrote default config to {}", out.display());
    Ok(())
}

fn check_sqlite(config_path: Option<&Path>, limit: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let store = &config.relational_store;
    if !store.path.exists() {
        bail!("SQLite database not found: {}", store.path.display());
    }

    let sink = RelationalSink::open(store)?;
    let count = sink.count()?;
    println!("Total records in {} ({}): {count}", sink.table(), store.path.display());

    let rows = sink.sample(limit)?;
    if rows.is_empty() {
        return Ok(());
    }
    println!();
    println!(
        "{:<10} {:<12} {:<32} {:<20} {:<25}",
        "Exchange", "Security ID", "Symbol Name", "Trading Symbol", "Updated"
    );
    println!("{}", "-".repeat(103));
    for row in &rows {
        println!(
            "{:<10} {:<12} {:<32} {:<20} {:<25}",
            row.exchange.as_deref().unwrap_or(""),
            row.security_id,
            row.symbol_name.as_deref().unwrap_or(""),
            row.trading_symbol.as_deref().unwrap_or(""),
            row.updated_at.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

fn check_mongo(config_path: Option<&Path>, limit: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let store = MongoDocumentStore::connect(&config.document_store)?;

    let count = store.count()?;
    println!(
        "Total documents in {}.{}: {count}",
        config.document_store.database, config.document_store.collection
    );
    for doc in store.sample(limit)? {
        println!("{doc}");
    }
    Ok(())
}
