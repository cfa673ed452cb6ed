use std::path::PathBuf;

use clap::Parser;
use philodb_core::config::Config;
use philodb_core::logging;
use philodb_mcp::McpServer;
use philodb_vector::QueryService;
use tokio::io::BufReader;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "philodb-mcp-server", about = "Serve philosophy search tools over MCP (JSON-RPC on stdio)")]
struct Cli {
    /// Config file (defaults to ./config.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol; logs go to stderr
    logging::init("info");
    let cli = Cli::parse();
    let config = Config::load_from(cli.config.as_deref())?;
    let max_k = config.search.max_k;

    let service = match QueryService::open(config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot start");
            return Err(e.into());
        }
    };

    let server = McpServer::new(service, max_k);
    let service = server.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    service.shutdown();
    info!("bye");
    Ok(())
}
