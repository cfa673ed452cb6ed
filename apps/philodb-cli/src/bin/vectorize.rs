use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use philodb_core::config::Config;
use philodb_core::logging;
use philodb_embed::get_default_embedder;
use philodb_vector::{QueryService, Vectorizer};

#[derive(Parser, Debug)]
#[command(name = "philodb-vectorize", about = "Extract, chunk and embed the scraped HTML corpus into the vector store")]
struct Cli {
    /// Config file (defaults to ./config.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of scraped `*.html` entries; overrides `data.html_dir`.
    #[arg(long)]
    html_dir: Option<PathBuf>,

    /// Only ingest the first N files (sorted by name).
    #[arg(long)]
    max_files: Option<usize>,

    /// Hide the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Query run against the fresh store as a smoke test.
    #[arg(long, default_value = "consciousness")]
    sample_query: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("info");
    let cli = Cli::parse();
    let config = Config::load_from(cli.config.as_deref())?;
    let html_dir = cli.html_dir.unwrap_or_else(|| config.html_dir());

    println!("Philosophy corpus vectorizer\n============================");
    println!("HTML directory: {}", html_dir.display());
    println!("Vector store:   {} (table '{}')", config.store_path().display(), config.store.table);

    let model_dir = config.model_dir();
    let embedder = get_default_embedder(&config.embedding, model_dir.as_deref()).context("loading embedding model")?;
    let vectorizer = Vectorizer::new(config.clone(), embedder)?.with_progress(!cli.no_progress);
    let report = vectorizer.run(&html_dir, cli.max_files).await?;

    println!("\n{}", report.summary());
    for failure in &report.failures {
        println!("  skipped {}: {}", failure.filename, failure.error);
    }

    let service = QueryService::open(config)?;
    let stats = service.stats().await?;
    println!("\nStore statistics:\n{}", serde_json::to_string_pretty(&stats)?);

    let results = service.search(&cli.sample_query, 3, None).await?;
    println!("\nSample query '{}':", cli.sample_query);
    for (i, r) in results.iter().enumerate() {
        let preview: String = r.text.chars().take(120).collect();
        println!("  {}. {} ({:.3}) {}", i + 1, r.metadata.title, r.score, preview);
    }
    service.shutdown();
    Ok(())
}
