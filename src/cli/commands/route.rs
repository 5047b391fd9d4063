//! Route command implementation.
//!
//! Builds the configured cluster in-process and routes one request from the
//! local server, printing the decision trace and the outcome.

use crate::core::config::Config;
use crate::core::runtime::Runtime;
use crate::control::request::NodeTargetedRequest;
use crate::endpoints::{self, OPERATIONS};
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

/// Simulate routing one node-targeted request.
#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Target node id.
    #[arg(long)]
    pub node: String,

    /// Request region (defaults to the local region).
    #[arg(long)]
    pub region: Option<String>,

    /// Auth token.
    #[arg(long, default_value = "")]
    pub token: String,

    /// Operation name.
    #[arg(long, default_value = "ClientStats.Stats")]
    pub operation: String,

    /// Route from this server instead of the configured one.
    #[arg(long)]
    pub from: Option<String>,

    /// Print the outcome as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Run the route command.
pub async fn run_route(args: RouteArgs, config_path: &Path) -> Result<()> {
    let mut config = Config::from_file(config_path)
        .with_context(|| format!("failed to load config from {:?}", config_path))?;
    if let Some(from) = &args.from {
        config.act_as(from)?;
    }

    let operation = endpoints::operation_by_name(&args.operation).with_context(|| {
        let known: Vec<&str> = OPERATIONS.iter().map(|op| op.name).collect();
        format!(
            "unknown operation {}; known operations: {}",
            args.operation,
            known.join(", ")
        )
    })?;

    let runtime = Runtime::new(config)?;
    let region = args
        .region
        .unwrap_or_else(|| runtime.engine().local().region.clone());
    let request = NodeTargetedRequest::new(args.node, region)
        .with_token(args.token)
        .with_allow_stale(true);

    let outcome = runtime.route(&operation, &request).await;

    if args.json {
        let result = match &outcome.result {
            Ok(value) => serde_json::json!({ "ok": value }),
            Err(err) => serde_json::json!({
                "error": err.code().as_str(),
                "message": err.to_string(),
            }),
        };
        let body = serde_json::json!({
            "trace": outcome.trace,
            "target": outcome.target,
            "result": result,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("trace:  {}", outcome.trace);
    if let Some(target) = &outcome.target {
        println!("target: {:?}", target);
    }
    match outcome.result {
        Ok(value) => println!("result: {}", value),
        Err(err) => println!("error:  {} ({})", err, err.code()),
    }
    Ok(())
}
