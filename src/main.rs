//! Ridx daemon entry point

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "ridx")]
#[command(about = "Persistent cross-reference index and query daemon for C/C++", long_about = None)]
struct Cli {
    /// Project root path (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Port for the query channel
    #[arg(short, long, default_value_t = 12526)]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// External parser command, invoked once per translation unit
    #[arg(long, default_value = "ridx-parse")]
    parser: PathBuf,

    /// Read one query from stdin, print the results and exit
    #[arg(long)]
    stdio: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("ridx={}", log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ridx v{}", env!("CARGO_PKG_VERSION"));

    if cli.stdio {
        let code = commands::query_stdio(cli.path, cli.parser).await?;
        std::process::exit(code);
    }

    tracing::info!("Indexing: {}", cli.path.display());
    commands::daemon(cli.path, cli.host, cli.port, cli.parser).await
}
