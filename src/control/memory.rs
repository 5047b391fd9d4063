//! In-process cluster.
//!
//! A set of servers sharing one process: each server has its own
//! connection registry and forwarding engine, and the inter-server
//! transport, membership and connection probes are plain method calls.
//! The `route` CLI command simulates routing decisions on it, and tests
//! use it to exercise multi-hop forwarding end to end.
//!
//! Every collaborator call is counted so callers can assert which
//! collaborators a route consulted.

use crate::control::acl::{
    Authorization, PermissionResolver, PermissionSet, StaticTokenResolver,
};
use crate::control::forward::{Collaborators, ForwardingEngine, LocalServer, RoutingConfig};
use crate::control::peers::{
    ConnectionProbe, MembershipPeerLocator, PeerHandle, PeerLocator, ServerMembership,
};
use crate::control::registry::{ConnectionRegistry, ConnectionStatus};
use crate::control::request::NodeTargetedRequest;
use crate::control::rpc::{ForwardTarget, Forwarder, NodeSession};
use crate::control::state::{ClusterNodeRecord, ClusterState, StateStore};
use crate::core::error::{
    CallError, Collaborator, CollaboratorError, TransportError, UpstreamError,
};
use crate::ops::observability::RoutingMetrics;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

/// Counters of collaborator calls.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub permission_resolves: AtomicUsize,
    pub snapshot_reads: AtomicUsize,
    pub peer_lookups: AtomicUsize,
    pub forwards: AtomicUsize,
    pub local_invocations: AtomicUsize,
}

impl CallCounts {
    /// Total collaborator calls of any kind.
    pub fn total(&self) -> usize {
        self.permission_resolves.load(Ordering::Relaxed)
            + self.snapshot_reads.load(Ordering::Relaxed)
            + self.peer_lookups.load(Ordering::Relaxed)
            + self.forwards.load(Ordering::Relaxed)
            + self.local_invocations.load(Ordering::Relaxed)
    }
}

/// Session to a simulated agent. Replies with the method name, node and
/// payload it received, or fails when the agent is marked broken.
#[derive(Debug)]
pub struct SimulatedSession {
    node_id: String,
    server_id: String,
    counts: Arc<CallCounts>,
    broken: bool,
}

#[async_trait]
impl NodeSession for SimulatedSession {
    async fn invoke(
        &self,
        method: &str,
        request: &NodeTargetedRequest,
    ) -> Result<serde_json::Value, CallError> {
        self.counts.local_invocations.fetch_add(1, Ordering::Relaxed);
        if self.broken {
            return Err(TransportError::closed(format!(
                "session to {} closed",
                self.node_id
            ))
            .into());
        }
        if request.payload.get("fail").is_some() {
            return Err(UpstreamError::new("handler", "operation failed on node").into());
        }
        Ok(serde_json::json!({
            "method": method,
            "node_id": self.node_id,
            "served_by": self.server_id,
            "payload": request.payload,
        }))
    }
}

struct ServerEntry {
    handle: PeerHandle,
    engine: Arc<ForwardingEngine>,
    counts: Arc<CallCounts>,
    reachable: bool,
}

/// Shared state of an in-process cluster.
struct ClusterInner {
    servers: RwLock<Vec<ServerEntry>>,
    nodes: StateStore,
    permissions: Arc<dyn PermissionResolver>,
}

/// A handle to one server's collaborator view of the shared cluster.
struct ServerView {
    server_id: String,
    cluster: Weak<ClusterInner>,
    counts: Arc<CallCounts>,
}

impl ServerView {
    fn cluster(&self) -> Result<Arc<ClusterInner>, TransportError> {
        self.cluster
            .upgrade()
            .ok_or_else(|| TransportError::closed("cluster shut down"))
    }
}

#[async_trait]
impl PermissionResolver for ServerView {
    async fn resolve(&self, token: &str) -> Result<Authorization, CollaboratorError> {
        self.counts.permission_resolves.fetch_add(1, Ordering::Relaxed);
        let permissions = self
            .cluster
            .upgrade()
            .map(|c| Arc::clone(&c.permissions))
            .ok_or_else(|| {
                CollaboratorError::new(Collaborator::PermissionResolver, "cluster shut down")
            })?;
        permissions.resolve(token).await
    }
}

#[async_trait]
impl ClusterState for ServerView {
    async fn node_by_id(
        &self,
        node_id: &str,
        _allow_stale: bool,
    ) -> Result<Option<ClusterNodeRecord>, CollaboratorError> {
        self.counts.snapshot_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .cluster
            .upgrade()
            .and_then(|c| c.nodes.snapshot().node_by_id(node_id).cloned()))
    }
}

impl ServerMembership for ServerView {
    fn alive_servers(&self, region: &str) -> Vec<PeerHandle> {
        match self.cluster.upgrade() {
            Some(cluster) => cluster
                .servers
                .read()
                .iter()
                .filter(|s| s.handle.region == region)
                .map(|s| s.handle.clone())
                .collect(),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl ConnectionProbe for ServerView {
    async fn has_node_conn(
        &self,
        server: &PeerHandle,
        node_id: &str,
    ) -> Result<Option<ConnectionStatus>, TransportError> {
        let cluster = self.cluster()?;
        let servers = cluster.servers.read();
        let entry = servers
            .iter()
            .find(|s| s.handle.server_id == server.server_id)
            .ok_or_else(|| TransportError::unreachable(format!("no server {}", server)))?;
        if !entry.reachable {
            return Err(TransportError::unreachable(format!(
                "server {} unreachable",
                server
            )));
        }
        Ok(entry.engine.registry().connection_status(node_id))
    }
}

/// Counts lookups before delegating to the membership locator.
struct CountingLocator {
    inner: MembershipPeerLocator,
    counts: Arc<CallCounts>,
}

#[async_trait]
impl PeerLocator for CountingLocator {
    async fn server_holding_connection(
        &self,
        node_id: &str,
        region: &str,
    ) -> Result<Option<PeerHandle>, CollaboratorError> {
        self.counts.peer_lookups.fetch_add(1, Ordering::Relaxed);
        self.inner.server_holding_connection(node_id, region).await
    }
}

#[async_trait]
impl Forwarder for ServerView {
    async fn forward(
        &self,
        target: &ForwardTarget,
        method: &str,
        request: &NodeTargetedRequest,
    ) -> Result<serde_json::Value, CallError> {
        self.counts.forwards.fetch_add(1, Ordering::Relaxed);
        let cluster = self.cluster()?;

        // Pick the receiving server: the named peer, or the first server of
        // the target region acting as its entry point.
        let (engine, reachable) = {
            let servers = cluster.servers.read();
            let entry = match target {
                ForwardTarget::Peer(peer) => servers
                    .iter()
                    .find(|s| s.handle.server_id == peer.server_id),
                ForwardTarget::Region(region) => {
                    servers.iter().find(|s| &s.handle.region == region)
                }
            };
            match entry {
                Some(entry) => (Arc::clone(&entry.engine), entry.reachable),
                None => {
                    return Err(TransportError::unreachable(format!(
                        "no route to {}",
                        target
                    ))
                    .into())
                }
            }
        };
        if !reachable {
            return Err(TransportError::unreachable(format!("{} unreachable", target)).into());
        }

        let operation = crate::endpoints::operation_by_name(method).ok_or_else(|| {
            UpstreamError::new("unknown_method", format!("unknown method {}", method))
        })?;
        tracing::trace!(from = %self.server_id, to = %target, method, "in-process forward");
        engine
            .route(&operation, request, &CancellationToken::new())
            .await
            .map_err(CallError::Routed)
    }
}

/// Builder for an in-process cluster.
#[derive(Default)]
pub struct InMemoryClusterBuilder {
    servers: Vec<PeerHandle>,
    nodes: Vec<ClusterNodeRecord>,
    resolver: Option<StaticTokenResolver>,
    permissions: Option<Arc<dyn PermissionResolver>>,
    config: RoutingConfig,
}

impl InMemoryClusterBuilder {
    pub fn server(mut self, server_id: &str, region: &str) -> Self {
        self.servers.push(PeerHandle::new(server_id, region));
        self
    }

    /// Add a server with a full handle.
    pub fn server_handle(mut self, handle: PeerHandle) -> Self {
        self.servers.push(handle);
        self
    }

    pub fn node(mut self, record: ClusterNodeRecord) -> Self {
        self.nodes.push(record);
        self
    }

    /// Enable ACLs and register a token.
    pub fn token(mut self, secret: &str, set: PermissionSet) -> Self {
        let resolver = self
            .resolver
            .take()
            .unwrap_or_else(StaticTokenResolver::enabled);
        self.resolver = Some(resolver.with_token(secret, set));
        self
    }

    /// Use a custom permission resolver shared by every server.
    pub fn permissions(mut self, permissions: Arc<dyn PermissionResolver>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn routing_config(mut self, config: RoutingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> InMemoryCluster {
        let inner = Arc::new(ClusterInner {
            servers: RwLock::new(Vec::new()),
            nodes: StateStore::new(),
            permissions: match (self.permissions, self.resolver) {
                (Some(permissions), _) => permissions,
                (None, Some(resolver)) => Arc::new(resolver),
                (None, None) => Arc::new(StaticTokenResolver::disabled()),
            },
        });

        for record in self.nodes {
            inner.nodes.upsert_node(record);
        }

        let mut seen = HashSet::new();
        for handle in self.servers {
            if !seen.insert(handle.server_id.clone()) {
                continue;
            }
            let counts = Arc::new(CallCounts::default());
            let view = Arc::new(ServerView {
                server_id: handle.server_id.clone(),
                cluster: Arc::downgrade(&inner),
                counts: Arc::clone(&counts),
            });
            let locator = CountingLocator {
                inner: MembershipPeerLocator::new(
                    handle.server_id.clone(),
                    view.clone(),
                    view.clone(),
                ),
                counts: Arc::clone(&counts),
            };
            let engine = ForwardingEngine::new(
                LocalServer::new(handle.server_id.clone(), handle.region.clone()),
                self.config.clone(),
                Arc::new(ConnectionRegistry::new()),
                Collaborators {
                    permissions: view.clone(),
                    state: view.clone(),
                    peers: Arc::new(locator),
                    forwarder: view,
                },
                Arc::new(RoutingMetrics::new()),
            );
            inner.servers.write().push(ServerEntry {
                handle,
                engine: Arc::new(engine),
                counts,
                reachable: true,
            });
        }

        InMemoryCluster { inner }
    }
}

/// In-process cluster of servers.
pub struct InMemoryCluster {
    inner: Arc<ClusterInner>,
}

impl InMemoryCluster {
    pub fn builder() -> InMemoryClusterBuilder {
        InMemoryClusterBuilder::default()
    }

    /// Forwarding engine of a server.
    pub fn engine(&self, server_id: &str) -> Option<Arc<ForwardingEngine>> {
        self.inner
            .servers
            .read()
            .iter()
            .find(|s| s.handle.server_id == server_id)
            .map(|s| Arc::clone(&s.engine))
    }

    /// Collaborator call counts of a server.
    pub fn counts(&self, server_id: &str) -> Option<Arc<CallCounts>> {
        self.inner
            .servers
            .read()
            .iter()
            .find(|s| s.handle.server_id == server_id)
            .map(|s| Arc::clone(&s.counts))
    }

    /// Connect a node's agent to a server. Returns `false` if the server is
    /// unknown.
    pub fn connect(&self, server_id: &str, node_id: &str) -> bool {
        self.connect_session(server_id, node_id, false)
    }

    /// Connect a node whose session fails every call at the transport level.
    pub fn connect_broken(&self, server_id: &str, node_id: &str) -> bool {
        self.connect_session(server_id, node_id, true)
    }

    fn connect_session(&self, server_id: &str, node_id: &str, broken: bool) -> bool {
        let servers = self.inner.servers.read();
        let Some(entry) = servers.iter().find(|s| s.handle.server_id == server_id) else {
            return false;
        };
        let session = SimulatedSession {
            node_id: node_id.to_string(),
            server_id: server_id.to_string(),
            counts: Arc::clone(&entry.counts),
            broken,
        };
        entry.engine.registry().register(node_id, Arc::new(session));
        true
    }

    /// Disconnect a node from a server.
    pub fn disconnect(&self, server_id: &str, node_id: &str) -> bool {
        let servers = self.inner.servers.read();
        servers
            .iter()
            .find(|s| s.handle.server_id == server_id)
            .and_then(|entry| {
                let registry = entry.engine.registry();
                registry
                    .lookup(node_id)
                    .map(|conn| registry.remove(node_id, conn.id))
            })
            .unwrap_or(false)
    }

    /// Mark a server unreachable over the inter-server transport.
    pub fn set_reachable(&self, server_id: &str, reachable: bool) {
        let mut servers = self.inner.servers.write();
        if let Some(entry) = servers.iter_mut().find(|s| s.handle.server_id == server_id) {
            entry.reachable = reachable;
        }
    }

    /// Register a node in cluster state.
    pub fn register_node(&self, record: ClusterNodeRecord) {
        self.inner.nodes.upsert_node(record);
    }
}
