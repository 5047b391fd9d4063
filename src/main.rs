//! nodeplane - unified CLI entrypoint.
//!
//! Usage:
//!   nodeplane start --config config/nodeplane.toml
//!   nodeplane config validate --config config/nodeplane.toml
//!   nodeplane route --node n1 [--region west] [--token secret]

use anyhow::Result;
use clap::Parser;
use nodeplane::cli::commands::{init_tracing, run_config, run_route, run_start};
use nodeplane::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine config path - use global --config or default
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/nodeplane.toml"));

    match cli.command {
        Commands::Start(args) => run_start(args, &config_path, cli.log_level).await,
        Commands::Config(args) => run_config(args),
        Commands::Route(args) => {
            init_tracing(cli.log_level.as_deref().unwrap_or("warn"));
            run_route(args, &config_path).await
        }
    }
}
