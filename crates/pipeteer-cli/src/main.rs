// Design Decision: use clap derive for ergonomic argument parsing, matching
// the rest of the teacher's CLI tooling.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pipeteer")]
#[command(about = "Pipeteer durable workflow engine CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pub-sub notification fanout proxy
    Proxy {
        /// Bind address for publishers
        #[arg(long, env = "PIPETEER_PROXY_PUB", default_value = "127.0.0.1:7780")]
        r#pub: String,

        /// Bind address for subscribers
        #[arg(long, env = "PIPETEER_PROXY_SUB", default_value = "127.0.0.1:7781")]
        sub: String,

        /// Enable verbose (debug-level) logging
        #[arg(long, short)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Proxy { r#pub, sub, verbose } => {
            init_tracing(verbose);
            pipeteer::notify::run_proxy(&r#pub, &sub).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();
}
