//! Configuration parsing and validation.
//!
//! Configuration is loaded from TOML files with CLI overrides. The optional
//! `[cluster]` section describes a static cluster (servers, registered nodes
//! and which server holds which node's connection) used to run the router
//! in-process.

use crate::control::acl::{Capability, PermissionSet, StaticTokenResolver};
use crate::control::forward::{LocalServer, RoutingConfig};
use crate::control::state::{ClusterNodeRecord, NodeStatus};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity of this server.
    pub server: ServerConfig,

    /// Routing behavior.
    #[serde(default)]
    pub routing: RoutingSection,

    /// ACL configuration.
    #[serde(default)]
    pub acl: AclConfig,

    /// Telemetry and logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Static cluster description.
    #[serde(default)]
    pub cluster: ClusterConfig,
}

/// Server identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique server identifier.
    pub server_id: String,

    /// Region this server belongs to.
    #[serde(default = "default_region")]
    pub region: String,
}

/// Routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSection {
    /// Answer node existence checks from possibly stale state.
    #[serde(default = "default_allow_stale")]
    pub allow_stale: bool,

    /// Deadline for one forwarded call, in milliseconds.
    #[serde(default = "default_forward_timeout_ms")]
    pub forward_timeout_ms: u64,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            allow_stale: default_allow_stale(),
            forward_timeout_ms: default_forward_timeout_ms(),
        }
    }
}

/// ACL configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AclConfig {
    /// Enforce token permissions. When false every request is unrestricted.
    #[serde(default)]
    pub enabled: bool,

    /// Known tokens.
    #[serde(default)]
    pub tokens: Vec<AclToken>,
}

/// A configured ACL token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclToken {
    /// Secret presented by callers.
    pub secret: String,

    /// Granted capabilities, e.g. `node_read`.
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Grant every capability.
    #[serde(default)]
    pub management: bool,
}

/// Telemetry and logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Static cluster description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Servers in the cluster. The local server is added if missing.
    #[serde(default)]
    pub servers: Vec<ClusterServer>,

    /// Registered nodes.
    #[serde(default)]
    pub nodes: Vec<ClusterNode>,

    /// Which server currently holds each node's connection.
    #[serde(default)]
    pub connections: Vec<ClusterConnection>,
}

/// A server in the static cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterServer {
    pub server_id: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub addr: String,
}

/// A registered node in the static cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default = "default_node_status")]
    pub status: NodeStatus,
}

impl ClusterNode {
    pub fn to_record(&self) -> ClusterNodeRecord {
        let mut record = ClusterNodeRecord::new(self.id.clone());
        if let Some(ref name) = self.name {
            record.name = name.clone();
        }
        record.datacenter = self.datacenter.clone();
        record.status = self.status;
        record
    }
}

/// A live node connection in the static cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConnection {
    pub server_id: String,
    pub node_id: String,
}

// Default value functions

fn default_region() -> String {
    "global".to_string()
}

fn default_allow_stale() -> bool {
    true
}

fn default_forward_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_node_status() -> NodeStatus {
    NodeStatus::Ready
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref server_id) = overrides.server_id {
            self.server.server_id = server_id.clone();
        }
        if let Some(ref region) = overrides.region {
            self.server.region = region.clone();
        }
        if let Some(timeout) = overrides.forward_timeout_ms {
            self.routing.forward_timeout_ms = timeout;
        }
    }

    /// Identity of the local server.
    pub fn local_server(&self) -> LocalServer {
        LocalServer::new(self.server.server_id.clone(), self.server.region.clone())
    }

    /// Engine tuning derived from the `[routing]` section.
    pub fn routing_config(&self) -> RoutingConfig {
        RoutingConfig {
            forward_timeout: Duration::from_millis(self.routing.forward_timeout_ms),
            allow_stale: self.routing.allow_stale,
        }
    }

    /// Build the token resolver described by the `[acl]` section.
    pub fn token_resolver(&self) -> Result<StaticTokenResolver> {
        if !self.acl.enabled {
            return Ok(StaticTokenResolver::disabled());
        }
        let mut resolver = StaticTokenResolver::enabled();
        for token in &self.acl.tokens {
            let set = if token.management {
                PermissionSet::management()
            } else {
                PermissionSet::new(parse_capabilities(&token.capabilities)?)
            };
            resolver = resolver.with_token(token.secret.clone(), set);
        }
        Ok(resolver)
    }

    /// Cluster servers with the local server included.
    pub fn cluster_servers(&self) -> Vec<ClusterServer> {
        let mut servers = self.cluster.servers.clone();
        if !servers.iter().any(|s| s.server_id == self.server.server_id) {
            servers.insert(
                0,
                ClusterServer {
                    server_id: self.server.server_id.clone(),
                    region: self.server.region.clone(),
                    addr: String::new(),
                },
            );
        }
        servers
    }

    /// Become another server of the static cluster.
    ///
    /// The previous local server stays a cluster member, so connections
    /// configured for it remain valid.
    pub fn act_as(&mut self, server_id: &str) -> Result<()> {
        let servers = self.cluster_servers();
        let target = servers
            .iter()
            .find(|s| s.server_id == server_id)
            .cloned()
            .with_context(|| format!("unknown server {}", server_id))?;
        self.cluster.servers = servers;
        self.server.server_id = target.server_id;
        self.server.region = target.region;
        self.validate()
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_server()?;
        self.validate_routing()?;
        self.validate_acl()?;
        self.validate_telemetry()?;
        self.validate_cluster()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<()> {
        if self.server.server_id.trim().is_empty() {
            anyhow::bail!("server.server_id must not be empty");
        }
        if self.server.region.trim().is_empty() {
            anyhow::bail!("server.region must not be empty");
        }
        Ok(())
    }

    fn validate_routing(&self) -> Result<()> {
        if self.routing.forward_timeout_ms == 0 {
            anyhow::bail!("routing.forward_timeout_ms must be > 0");
        }
        Ok(())
    }

    fn validate_acl(&self) -> Result<()> {
        let mut secrets = HashSet::new();
        for token in &self.acl.tokens {
            if token.secret.is_empty() {
                anyhow::bail!("acl.tokens: secret must not be empty");
            }
            if !secrets.insert(token.secret.as_str()) {
                anyhow::bail!("acl.tokens: duplicate secret");
            }
            parse_capabilities(&token.capabilities)?;
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }

    fn validate_cluster(&self) -> Result<()> {
        let mut server_ids = HashSet::new();
        for server in &self.cluster.servers {
            if server.server_id.is_empty() {
                anyhow::bail!("cluster.servers: server_id must not be empty");
            }
            if !server_ids.insert(server.server_id.as_str()) {
                anyhow::bail!("cluster.servers: duplicate server_id {}", server.server_id);
            }
            if server.server_id == self.server.server_id && server.region != self.server.region {
                anyhow::bail!(
                    "cluster.servers: local server {} listed in region {}, configured in {}",
                    server.server_id,
                    server.region,
                    self.server.region
                );
            }
        }
        server_ids.insert(self.server.server_id.as_str());

        let mut node_ids = HashSet::new();
        for node in &self.cluster.nodes {
            if node.id.is_empty() {
                anyhow::bail!("cluster.nodes: id must not be empty");
            }
            if !node_ids.insert(node.id.as_str()) {
                anyhow::bail!("cluster.nodes: duplicate node id {}", node.id);
            }
        }

        for conn in &self.cluster.connections {
            if !server_ids.contains(conn.server_id.as_str()) {
                anyhow::bail!(
                    "cluster.connections: unknown server {} for node {}",
                    conn.server_id,
                    conn.node_id
                );
            }
            if conn.node_id.is_empty() {
                anyhow::bail!("cluster.connections: node_id must not be empty");
            }
        }
        Ok(())
    }
}

fn parse_capabilities(names: &[String]) -> Result<Vec<Capability>> {
    names
        .iter()
        .map(|name| {
            name.parse::<Capability>()
                .map_err(|err| anyhow::anyhow!("acl.tokens: {}", err))
        })
        .collect()
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override server id.
    pub server_id: Option<String>,
    /// Override region.
    pub region: Option<String>,
    /// Override forward timeout.
    pub forward_timeout_ms: Option<u64>,
}
