//! Config command implementation.

use crate::core::config::Config;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate configuration file.
    Validate {
        /// Config file path.
        #[arg(short, long, default_value = "config/nodeplane.toml")]
        config: PathBuf,
    },
    /// Print configuration with defaults applied.
    Show {
        /// Config file path.
        #[arg(short, long, default_value = "config/nodeplane.toml")]
        config: PathBuf,
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Print a configuration template.
    Generate {
        /// Output file path.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Validate { config } => validate_config(&config),
        ConfigCommand::Show { config, format } => show_config(&config, &format),
        ConfigCommand::Generate { output } => generate_config(output.as_deref()),
    }
}

fn validate_config(path: &Path) -> Result<()> {
    let config = Config::from_file(path)?;
    println!("✓ Configuration is valid");
    println!(
        "  server {} in region {}",
        config.server.server_id, config.server.region
    );
    if !config.acl.enabled {
        println!("  ⚠ Warning: ACLs disabled, every request is unrestricted");
    }
    println!(
        "  cluster: {} servers, {} nodes, {} connections",
        config.cluster_servers().len(),
        config.cluster.nodes.len(),
        config.cluster.connections.len()
    );
    Ok(())
}

fn show_config(path: &Path, format: &str) -> Result<()> {
    let config = Config::from_file(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        _ => println!("{}", toml::to_string_pretty(&config)?),
    }
    Ok(())
}

fn generate_config(output: Option<&Path>) -> Result<()> {
    let template = template();
    match output {
        Some(path) => {
            std::fs::write(path, template)?;
            println!("Generated config template: {:?}", path);
        }
        None => println!("{}", template),
    }
    Ok(())
}

fn template() -> &'static str {
    r#"# nodeplane configuration

[server]
server_id = "srv1"
region = "east"

[routing]
allow_stale = true
forward_timeout_ms = 10000

[acl]
enabled = true

[[acl.tokens]]
secret = "operator-token"
management = true

[[acl.tokens]]
secret = "reader-token"
capabilities = ["node_read"]

[telemetry]
log_level = "info"

[[cluster.servers]]
server_id = "srv2"
region = "east"

[[cluster.servers]]
server_id = "srv3"
region = "west"

[[cluster.nodes]]
id = "n1"

[[cluster.nodes]]
id = "n2"

[[cluster.connections]]
server_id = "srv1"
node_id = "n1"

[[cluster.connections]]
server_id = "srv2"
node_id = "n2"
"#
}
