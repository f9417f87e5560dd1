// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

mod api;
mod bars;
mod config;
mod embedding;
mod error;
mod ingest;
mod manifest;
mod models;
mod pipeline;
mod text;
mod utils;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::api::MassiveClient;
use crate::config::Config;
use crate::embedding::{BertEncoder, Encoder};
use crate::ingest::{DateRange, Ingestion};
use crate::models::Timespan;
use crate::pipeline::Saved;
use crate::utils::truncate_chars;

#[derive(Parser)]
#[command(
    name = "news-embed",
    version,
    about = "Fetch ticker news from Massive and embed it with a BERT encoder"
)]
struct Cli {
    /// Path to config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch news, save it, embed it and save the embedded manifest
    Run(NewsArgs),
    /// Fetch news and save it without embedding
    News(NewsArgs),
    /// Embed a saved news manifest
    Embed {
        /// Manifest to embed (default: latest in the data directory)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Fetch OHLCV aggregate bars and export them to CSV
    Bars(BarsArgs),
}

#[derive(Args, Default)]
struct NewsArgs {
    #[arg(long)]
    ticker: Option<String>,
    #[arg(long)]
    limit: Option<usize>,
    /// Earliest publish date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Latest publish date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Args)]
struct BarsArgs {
    #[arg(long)]
    ticker: Option<String>,
    /// Number of timespan units per bar
    #[arg(long, default_value_t = 1)]
    multiplier: u32,
    #[arg(long, value_enum, default_value_t = Timespan::Day)]
    timespan: Timespan,
    #[arg(long)]
    from: NaiveDate,
    #[arg(long)]
    to: NaiveDate,
    #[arg(long, default_value_t = 5000)]
    limit: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run(NewsArgs::default())) {
        Command::Run(args) => run(&config, &args).await?,
        Command::News(args) => {
            let client = massive_client(&config)?;
            let (ingestion, saved) = fetch_news(&config, &client, &args).await?;
            print_article_details(&saved);
            println!("\n✅ {}", ingestion.summary());
        }
        Command::Embed { input } => embed_existing(&config, input).await?,
        Command::Bars(args) => export_bars(&config, &args).await?,
    }

    Ok(())
}

/// The API key is resolved before any network traffic.
fn massive_client(config: &Config) -> Result<MassiveClient> {
    let api_key = config::load_api_key(&config.massive.api_key_file)?;
    let client = MassiveClient::new(
        api_key,
        &config.massive.base_url,
        config.massive.timeout(),
    )?;
    Ok(client)
}

async fn load_encoder(config: &Config) -> Result<BertEncoder> {
    let model_id = config.embedding.model_id.clone();
    let revision = config.embedding.revision.clone();

    println!("Loading {} ...", model_id);
    let encoder = tokio::task::spawn_blocking(move || BertEncoder::load(&model_id, &revision))
        .await??;
    println!("✅ {} loaded (dimension {})", encoder.model_id(), encoder.dim());
    Ok(encoder)
}

async fn fetch_news(
    config: &Config,
    client: &MassiveClient,
    args: &NewsArgs,
) -> Result<(Ingestion, Saved)> {
    let ticker = args.ticker.as_deref().unwrap_or(&config.news.ticker);
    let limit = args.limit.unwrap_or(config.news.limit);
    let range = DateRange {
        from: args.from,
        to: args.to,
    };

    println!("Fetching news for {} (limit {}) ⌛️", ticker, limit);
    let (ingestion, saved) =
        pipeline::fetch_and_save(client, ticker, limit, range, &config.output.data_dir).await?;

    for record in &ingestion.records {
        let title = record.title.as_deref().unwrap_or("No title");
        println!("  [+] {}", truncate_chars(title, 60));
    }
    if let Some(reason) = &ingestion.interruption {
        warn!("Stopped early with {} articles: {}", ingestion.records.len(), reason);
    }
    println!(
        "✅ Saved {} articles to {}",
        saved.manifest.count,
        saved.path.display()
    );

    Ok((ingestion, saved))
}

fn print_article_details(saved: &Saved) {
    for (i, article) in saved.manifest.articles.iter().enumerate() {
        println!("\nArticle {}:", i + 1);
        println!("  Title: {}", article.title.as_deref().unwrap_or("N/A"));
        println!(
            "  Description: {}",
            truncate_chars(article.description.as_deref().unwrap_or("N/A"), 100)
        );
        println!("  Published: {}", article.published_utc.as_deref().unwrap_or("N/A"));
        println!("  Tickers: {:?}", article.tickers);
        println!("  Author: {}", article.author.as_deref().unwrap_or("N/A"));
    }
}

fn print_summary(ingestion: Option<&Ingestion>, embedded: &Saved) {
    println!("\nSummary");
    if let Some(ingestion) = ingestion {
        println!("  Fetched: {}", ingestion.summary());
    }
    println!("  Articles processed: {}", embedded.manifest.count);
    if let Some(info) = &embedded.manifest.embedding {
        println!("  Embeddings generated: {}", embedded.manifest.articles.len());
        println!("  Embedding dimension: {}", info.dim);
        println!("  Pooling: {} over at most {} tokens", info.pooling_strategy, info.max_length);
    }
    println!("✅ Saved embeddings to {}", embedded.path.display());
}

async fn run(config: &Config, args: &NewsArgs) -> Result<()> {
    let client = massive_client(config)?;
    let encoder = load_encoder(config).await?;

    let (ingestion, raw) = fetch_news(config, &client, args).await?;
    if raw.manifest.articles.is_empty() {
        warn!("No articles returned, nothing to embed");
        println!("\n{}", ingestion.summary());
        return Ok(());
    }

    println!("\nGenerating embeddings...");
    let embedded = pipeline::embed_and_save(
        &encoder,
        &raw.manifest,
        &raw.path,
        config.embedding.max_length,
    )?;
    print_summary(Some(&ingestion), &embedded);
    Ok(())
}

async fn embed_existing(config: &Config, input: Option<PathBuf>) -> Result<()> {
    let path = match input {
        Some(path) => path,
        None => manifest::latest_raw_manifest(&config.output.data_dir)?,
    };
    let raw = manifest::load(&path)?;
    println!("✅ Loaded {} articles from {}", raw.count, path.display());
    if raw.is_embedded() {
        warn!("{} already carries embeddings, recomputing them", path.display());
    }
    if raw.articles.is_empty() {
        anyhow::bail!("{} contains no articles", path.display());
    }

    let encoder = load_encoder(config).await?;
    println!("\nGenerating embeddings...");
    let embedded =
        pipeline::embed_and_save(&encoder, &raw, &path, config.embedding.max_length)?;
    print_summary(None, &embedded);
    Ok(())
}

async fn export_bars(config: &Config, args: &BarsArgs) -> Result<()> {
    let client = massive_client(config)?;
    let ticker = args.ticker.as_deref().unwrap_or(&config.news.ticker);

    println!(
        "Fetching {} {} bars for {} from {} to {} ⌛️",
        args.multiplier, args.timespan, ticker, args.from, args.to
    );
    let bars = client
        .list_aggs(ticker, args.multiplier, args.timespan, args.from, args.to, args.limit)
        .await?;

    let csv_path = bars::bars_csv_path(&config.output.data_dir, ticker);
    bars::export_bars_csv(ticker, &bars, &csv_path)?;
    println!("✅ {} bars written to {}", bars.len(), csv_path.display());
    Ok(())
}
