use std::path::PathBuf;

use clap::{Parser, Subcommand};
use philodb_core::config::Config;
use philodb_core::logging;
use philodb_vector::QueryService;

#[derive(Parser, Debug)]
#[command(name = "philodb-query", about = "Query the philosophy vector store and print JSON")]
struct Cli {
    /// Config file (defaults to ./config.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Semantic search over all chunks.
    Search {
        query: String,
        /// Number of results (defaults to `search.default_k`).
        #[arg(short)]
        k: Option<usize>,
        /// Restrict to one entry.
        #[arg(long)]
        entry: Option<String>,
    },
    /// Print every chunk of one entry.
    Entry { name: String },
    /// List indexed entries.
    List {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("warn");
    let cli = Cli::parse();
    let config = Config::load_from(cli.config.as_deref())?;
    let default_k = config.search.default_k;
    let service = QueryService::open(config)?;

    let output = match cli.command {
        Command::Search { query, k, entry } => {
            let results = service.search(&query, k.unwrap_or(default_k), entry.as_deref()).await?;
            serde_json::json!({ "query": query, "total_results": results.len(), "results": results })
        }
        Command::Entry { name } => match service.get_entry(&name).await? {
            Some(entry) => serde_json::json!({ "found": true, "total_chunks": entry.chunks.len(), "entry": entry }),
            None => serde_json::json!({ "found": false, "entry_name": name }),
        },
        Command::List { limit } => {
            let entries = service.list(limit).await?;
            serde_json::json!({ "total_entries": entries.len(), "entries": entries })
        }
        Command::Stats => serde_json::to_value(service.stats().await?)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    service.shutdown();
    Ok(())
}
