use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use embedfill_core::config::{AppConfig, Config};
use embedfill_core::traits::DestinationStore;
use embedfill_core::types::{EmbeddingType, StoreStats};
use embedfill_embed::{get_default_provider, EmbeddingClient};
use embedfill_pipeline::{BarProgress, FinalReport, Pipeline, StatsTracker, StopSignal};
use embedfill_store::LanceStore;

#[derive(Parser, Debug)]
#[command(name = "embedfill", about = "Backfill vector embeddings for stored text records")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Embed every record that does not have an embedding of the requested type yet
    Run {
        /// Records per provider call
        #[arg(long)]
        batch_size: Option<usize>,

        /// Stop after this many source records
        #[arg(long)]
        max_records: Option<u64>,

        /// combined, content or title
        #[arg(long)]
        embedding_type: Option<EmbeddingType>,
    },
    /// Print destination totals and exit
    Stats,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let mut app = config.app()?;

    match cli.command {
        Command::Run { batch_size, max_records, embedding_type } => {
            if let Some(n) = batch_size {
                app.pipeline.batch_size = n;
            }
            if max_records.is_some() {
                app.pipeline.max_records = max_records;
            }
            if let Some(ty) = embedding_type {
                app.pipeline.embedding_type = ty;
            }
            app.validate()?;
            run(app).await
        }
        Command::Stats => {
            let store = LanceStore::from_config(&app.store, app.embedding.dimensions)
                .await
                .context("failed to open destination store")?;
            let stats = store.stats().await.context("failed to read destination totals")?;
            print_store_stats(&stats);
            Ok(())
        }
    }
}

async fn run(app: AppConfig) -> Result<()> {
    let provider = get_default_provider(&app.embedding)?;
    let client = Arc::new(EmbeddingClient::from_config(provider, &app.embedding));
    let dim = client.dim();
    let store = Arc::new(
        LanceStore::from_config(&app.store, dim).await.context("failed to open lancedb store")?,
    );

    info!(
        embedder = client.embedder_id(),
        dimensions = dim,
        batch_size = app.pipeline.batch_size,
        retry_base_delay = ?app.embedding.retry_policy().base_delay(),
        embedding_type = %app.pipeline.embedding_type,
        store = %app.store.resolved_uri().display(),
        "🚀 embedfill starting"
    );

    let stop = StopSignal::new();
    tokio::spawn({
        let stop = stop.clone();
        async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if stop.is_stopped() {
                    warn!("second interrupt, exiting now");
                    std::process::exit(130);
                }
                warn!("interrupt received, finishing the current chunk; press Ctrl-C again to exit");
                stop.stop();
            }
        }
    });

    let stats = StatsTracker::new();
    let progress = BarProgress::new();
    let pipeline = Pipeline::new(store.clone(), store.clone(), client, app.pipeline.clone(), app.store.retry_policy());

    match pipeline.run(&stats, &progress, &stop).await {
        Ok(summary) => {
            print_report(&summary.report);
            if summary.cancelled {
                println!("⏹  Interrupted after {} page(s); re-run to continue.", summary.pages_completed);
            }
            match store.stats().await {
                Ok(totals) => print_store_stats(&totals),
                Err(e) => warn!(error = %e, "could not read destination totals"),
            }
            Ok(())
        }
        Err(e) => {
            print_report(&stats.final_report());
            Err(e.into())
        }
    }
}

fn print_report(report: &FinalReport) {
    println!();
    println!("📊 Embedding run summary");
    println!("  {:<18} {}", "processed", report.processed);
    println!("  {:<18} {}", "succeeded", report.succeeded);
    println!("  {:<18} {}", "failed", report.failed);
    println!("  {:<18} {}", "skipped (existing)", report.skipped_existing);
    println!("  {:<18} {:.1}s", "duration", report.duration.as_secs_f64());
    println!("  {:<18} {:.2} records/s", "throughput", report.throughput);
    if !report.failure_reasons.is_empty() {
        println!("  failure reasons:");
        for (reason, count) in &report.failure_reasons {
            println!("    {:<16} {}", reason, count);
        }
    }
}

fn print_store_stats(stats: &StoreStats) {
    println!();
    println!("🗄  Destination totals");
    println!("  {:<18} {}", "total", stats.total);
    for (ty, count) in &stats.by_type {
        println!("  {:<18} {}", ty.as_str(), count);
    }
    println!("  {:<18} {}", "created today", stats.today);
}
