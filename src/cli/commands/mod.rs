//! CLI command implementations.

mod config;
mod route;
mod start;

pub use config::{run_config, ConfigArgs, ConfigCommand};
pub use route::{run_route, RouteArgs};
pub use start::{init_tracing, run_start, StartArgs};
