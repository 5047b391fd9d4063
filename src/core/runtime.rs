//! Runtime orchestration.
//!
//! The runtime assembles the routing components from configuration:
//! token resolver → static cluster (state, membership, peer transport) →
//! connection registry → forwarding engine → endpoints. It then runs until
//! a shutdown signal arrives.

use crate::control::forward::{ForwardingEngine, RouteOutcome};
use crate::control::memory::InMemoryCluster;
use crate::control::peers::PeerHandle;
use crate::control::request::{NodeTargetedRequest, OperationSpec};
use crate::core::config::Config;
use crate::endpoints::{ClientAllocations, ClientStats};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Runtime holding the routing components of one server.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// Cluster the local server is part of.
    cluster: InMemoryCluster,

    /// Forwarding engine of the local server.
    engine: Arc<ForwardingEngine>,

    /// Whether the runtime is running.
    running: Arc<AtomicBool>,

    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    /// Cancels in-flight routes on shutdown.
    cancel: CancellationToken,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let cluster = build_cluster(&config)?;
        let engine = cluster
            .engine(&config.server.server_id)
            .context("local server missing from cluster")?;
        engine
            .metrics()
            .set_connected_nodes(engine.registry().len());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            cluster,
            engine,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
            cancel: CancellationToken::new(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the cluster.
    pub fn cluster(&self) -> &InMemoryCluster {
        &self.cluster
    }

    /// Get the local forwarding engine.
    pub fn engine(&self) -> &Arc<ForwardingEngine> {
        &self.engine
    }

    /// ClientStats endpoint bound to the local engine.
    pub fn client_stats(&self) -> ClientStats {
        ClientStats::new(Arc::clone(&self.engine))
    }

    /// ClientAllocations endpoint bound to the local engine.
    pub fn client_allocations(&self) -> ClientAllocations {
        ClientAllocations::new(Arc::clone(&self.engine))
    }

    /// Route one request through the local engine.
    pub async fn route(
        &self,
        operation: &OperationSpec,
        request: &NodeTargetedRequest,
    ) -> RouteOutcome {
        self.engine
            .route_traced(operation, request, &self.cancel.child_token())
            .await
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Signal shutdown. In-flight routes are cancelled.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.cancel.cancel();
    }

    /// Run until Ctrl-C or [`Runtime::shutdown`].
    pub async fn run(&mut self) -> Result<()> {
        self.running.store(true, Ordering::Release);
        let local = self.engine.local();
        tracing::info!(
            server_id = %local.server_id,
            region = %local.region,
            connected_nodes = self.engine.registry().len(),
            "node router started"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for shutdown signal")?;
                tracing::info!("received Ctrl-C, shutting down");
                self.shutdown();
            }
            _ = shutdown_rx.wait_for(|stop| *stop) => {
                tracing::info!("shutdown requested");
            }
        }

        self.running.store(false, Ordering::Release);
        tracing::info!("node router stopped");
        Ok(())
    }
}

/// Build the static cluster described by the configuration.
pub fn build_cluster(config: &Config) -> Result<InMemoryCluster> {
    let mut builder = InMemoryCluster::builder()
        .routing_config(config.routing_config())
        .permissions(Arc::new(config.token_resolver()?));

    for server in config.cluster_servers() {
        builder = builder
            .server_handle(PeerHandle::new(server.server_id, server.region).with_addr(server.addr));
    }
    for node in &config.cluster.nodes {
        builder = builder.node(node.to_record());
    }

    let cluster = builder.build();
    for conn in &config.cluster.connections {
        if !cluster.connect(&conn.server_id, &conn.node_id) {
            anyhow::bail!(
                "cannot connect node {} to unknown server {}",
                conn.node_id,
                conn.server_id
            );
        }
    }
    Ok(cluster)
}
