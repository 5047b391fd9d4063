//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use async_trait::async_trait;
use nodeplane::control::acl::{Authorization, PermissionResolver};
use nodeplane::control::forward::{Collaborators, ForwardingEngine, LocalServer, RoutingConfig};
use nodeplane::control::peers::{PeerHandle, PeerLocator};
use nodeplane::control::registry::ConnectionRegistry;
use nodeplane::control::request::NodeTargetedRequest;
use nodeplane::control::rpc::{ForwardTarget, Forwarder, NodeSession};
use nodeplane::control::state::{ClusterNodeRecord, ClusterState};
use nodeplane::core::error::{CallError, CollaboratorError};
use nodeplane::ops::observability::RoutingMetrics;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

// ============================================================================
// Config fixtures
// ============================================================================

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    write_config(
        r#"
[server]
server_id = "srv1"
region = "east"
"#,
    )
}

/// Configuration of a three-server cluster across two regions.
pub const CLUSTER_CONFIG: &str = r#"
[server]
server_id = "srv1"
region = "east"

[routing]
forward_timeout_ms = 2000

[acl]
enabled = true

[[acl.tokens]]
secret = "reader"
capabilities = ["node_read"]

[[acl.tokens]]
secret = "operator"
management = true

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

[[cluster.nodes]]
id = "n3"

[[cluster.nodes]]
id = "n9"

[[cluster.connections]]
server_id = "srv1"
node_id = "n1"

[[cluster.connections]]
server_id = "srv2"
node_id = "n2"

[[cluster.connections]]
server_id = "srv3"
node_id = "n3"
"#;

/// Write configuration content to a temp file.
pub fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

// ============================================================================
// Scripted collaborators
// ============================================================================

/// How a scripted call replies.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Echo the method and target back.
    Echo,
    /// Reply with a fixed value.
    Value(serde_json::Value),
    /// Fail with the given error.
    Fail(CallError),
    /// Never reply within any reasonable deadline.
    Hang,
}

impl Reply {
    async fn answer(
        &self,
        source: &str,
        method: &str,
        request: &NodeTargetedRequest,
    ) -> Result<serde_json::Value, CallError> {
        match self {
            Reply::Echo => Ok(serde_json::json!({
                "source": source,
                "method": method,
                "node_id": request.node_id,
            })),
            Reply::Value(value) => Ok(value.clone()),
            Reply::Fail(err) => Err(err.clone()),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(serde_json::Value::Null)
            }
        }
    }
}

/// Collaborator call counters.
#[derive(Debug, Default)]
pub struct Calls {
    pub resolves: AtomicUsize,
    pub snapshot_reads: AtomicUsize,
    pub peer_lookups: AtomicUsize,
    pub forwards: AtomicUsize,
    pub invocations: AtomicUsize,
    pub forwarded_to: Mutex<Vec<ForwardTarget>>,
}

impl Calls {
    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn snapshot_reads(&self) -> usize {
        self.snapshot_reads.load(Ordering::SeqCst)
    }

    pub fn peer_lookups(&self) -> usize {
        self.peer_lookups.load(Ordering::SeqCst)
    }

    pub fn forwards(&self) -> usize {
        self.forwards.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Calls to any collaborator, sessions included.
    pub fn total(&self) -> usize {
        self.resolves()
            + self.snapshot_reads()
            + self.peer_lookups()
            + self.forwards()
            + self.invocations()
    }
}

/// Scripted answers for every collaborator.
pub struct Script {
    pub authorization: Result<Authorization, CollaboratorError>,
    pub nodes: HashSet<String>,
    pub state_error: Option<CollaboratorError>,
    pub peer: Result<Option<PeerHandle>, CollaboratorError>,
    pub forward: Reply,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            authorization: Ok(Authorization::Unrestricted),
            nodes: HashSet::new(),
            state_error: None,
            peer: Ok(None),
            forward: Reply::Echo,
        }
    }
}

/// Implements every engine collaborator from a shared script.
#[derive(Default)]
pub struct ScriptedCollaborators {
    pub script: Mutex<Script>,
    pub calls: Arc<Calls>,
    pub last_allow_stale: Mutex<Option<bool>>,
}

#[async_trait]
impl PermissionResolver for ScriptedCollaborators {
    async fn resolve(&self, _token: &str) -> Result<Authorization, CollaboratorError> {
        self.calls.resolves.fetch_add(1, Ordering::SeqCst);
        self.script.lock().authorization.clone()
    }
}

#[async_trait]
impl ClusterState for ScriptedCollaborators {
    async fn node_by_id(
        &self,
        node_id: &str,
        allow_stale: bool,
    ) -> Result<Option<ClusterNodeRecord>, CollaboratorError> {
        self.calls.snapshot_reads.fetch_add(1, Ordering::SeqCst);
        *self.last_allow_stale.lock() = Some(allow_stale);
        let script = self.script.lock();
        if let Some(err) = &script.state_error {
            return Err(err.clone());
        }
        Ok(script
            .nodes
            .contains(node_id)
            .then(|| ClusterNodeRecord::new(node_id)))
    }
}

#[async_trait]
impl PeerLocator for ScriptedCollaborators {
    async fn server_holding_connection(
        &self,
        _node_id: &str,
        _region: &str,
    ) -> Result<Option<PeerHandle>, CollaboratorError> {
        self.calls.peer_lookups.fetch_add(1, Ordering::SeqCst);
        self.script.lock().peer.clone()
    }
}

#[async_trait]
impl Forwarder for ScriptedCollaborators {
    async fn forward(
        &self,
        target: &ForwardTarget,
        method: &str,
        request: &NodeTargetedRequest,
    ) -> Result<serde_json::Value, CallError> {
        self.calls.forwards.fetch_add(1, Ordering::SeqCst);
        self.calls.forwarded_to.lock().push(target.clone());
        let reply = self.script.lock().forward.clone();
        reply.answer(&target.to_string(), method, request).await
    }
}

/// Node session with a scripted reply.
#[derive(Debug)]
pub struct ScriptedSession {
    pub reply: Reply,
    pub calls: Arc<Calls>,
}

#[async_trait]
impl NodeSession for ScriptedSession {
    async fn invoke(
        &self,
        method: &str,
        request: &NodeTargetedRequest,
    ) -> Result<serde_json::Value, CallError> {
        self.calls.invocations.fetch_add(1, Ordering::SeqCst);
        self.reply.answer("local", method, request).await
    }
}

/// A forwarding engine wired to scripted collaborators.
pub struct TestEngine {
    pub engine: Arc<ForwardingEngine>,
    pub collaborators: Arc<ScriptedCollaborators>,
    pub registry: Arc<ConnectionRegistry>,
}

impl TestEngine {
    /// Engine for server `srv1` in region `east`.
    pub fn new() -> Self {
        Self::with_config(RoutingConfig::default())
    }

    pub fn with_config(config: RoutingConfig) -> Self {
        let collaborators = Arc::new(ScriptedCollaborators::default());
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = ForwardingEngine::new(
            LocalServer::new("srv1", "east"),
            config,
            Arc::clone(&registry),
            Collaborators {
                permissions: collaborators.clone(),
                state: collaborators.clone(),
                peers: collaborators.clone(),
                forwarder: collaborators.clone(),
            },
            Arc::new(RoutingMetrics::new()),
        );
        Self {
            engine: Arc::new(engine),
            collaborators,
            registry,
        }
    }

    pub fn calls(&self) -> &Calls {
        &self.collaborators.calls
    }

    /// Edit the collaborator script.
    pub fn script(&self, edit: impl FnOnce(&mut Script)) {
        edit(&mut self.collaborators.script.lock());
    }

    /// Register a node in cluster state.
    pub fn known_node(&self, node_id: &str) {
        self.script(|s| {
            s.nodes.insert(node_id.to_string());
        });
    }

    /// Hold a session to a node on this server.
    pub fn connect(&self, node_id: &str, reply: Reply) {
        self.registry.register(
            node_id,
            Arc::new(ScriptedSession {
                reply,
                calls: Arc::clone(&self.collaborators.calls),
            }),
        );
    }
}
