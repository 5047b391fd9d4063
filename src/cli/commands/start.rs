//! Start command implementation.

use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::Runtime;
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

/// Start the router.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Override the server id from the config file.
    #[arg(long)]
    pub server_id: Option<String>,

    /// Override the region from the config file.
    #[arg(long)]
    pub region: Option<String>,
}

/// Initialize the tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` takes precedence over the configured level.
#[cfg(feature = "telemetry")]
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_default_level: &str) {}

/// Run the start command.
pub async fn run_start(
    args: StartArgs,
    config_path: &Path,
    log_level: Option<String>,
) -> Result<()> {
    let mut config = Config::from_file(config_path)
        .with_context(|| format!("failed to load config from {:?}", config_path))?;
    config.apply_overrides(&ConfigOverrides {
        log_level,
        server_id: args.server_id,
        region: args.region,
        forward_timeout_ms: None,
    });

    init_tracing(&config.telemetry.log_level);

    let mut runtime = Runtime::new(config)?;
    runtime.run().await
}
