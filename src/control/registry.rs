//! Connection registry.
//!
//! Per-server table of the nodes whose agents currently hold a control
//! connection to this server instance. The connection-acceptance subsystem
//! registers and removes entries; the routing core only looks them up.
//!
//! # Concurrency
//!
//! Entries are published as complete `Arc<NodeConnection>` values under a
//! read-mostly lock, so a lookup never observes a partially constructed
//! entry. Lookups take the read lock only for the map probe and never wait
//! on I/O.
//!
//! # Reconnects
//!
//! An agent reconnecting to the same server replaces its entry. The old
//! connection's teardown then calls [`ConnectionRegistry::remove`] with its
//! own connection id and must not evict the newer entry.

use crate::control::rpc::SessionHandle;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Identifier of one accepted connection, unique per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Live connection to a node held by this server.
#[derive(Debug)]
pub struct NodeConnection {
    pub id: ConnectionId,
    pub node_id: String,
    pub session: SessionHandle,
    /// Wall-clock time the agent established the connection.
    pub established_at: SystemTime,
}

/// Answer to "do you hold this node's connection" for peer location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub established_at: SystemTime,
}

/// Node identity to live session table.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    conns: RwLock<HashMap<String, Arc<NodeConnection>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the live connection to a node, if this server holds one.
    pub fn lookup(&self, node_id: &str) -> Option<Arc<NodeConnection>> {
        self.conns.read().get(node_id).cloned()
    }

    /// Whether this server holds a connection to the node, and since when.
    pub fn connection_status(&self, node_id: &str) -> Option<ConnectionStatus> {
        self.lookup(node_id).map(|conn| ConnectionStatus {
            established_at: conn.established_at,
        })
    }

    /// Register a newly accepted connection, replacing any previous one.
    pub fn register(
        &self,
        node_id: impl Into<String>,
        session: SessionHandle,
    ) -> Arc<NodeConnection> {
        self.register_at(node_id, session, SystemTime::now())
    }

    /// Register a connection with an explicit establishment time.
    pub fn register_at(
        &self,
        node_id: impl Into<String>,
        session: SessionHandle,
        established_at: SystemTime,
    ) -> Arc<NodeConnection> {
        let node_id = node_id.into();
        let conn = Arc::new(NodeConnection {
            id: ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            node_id: node_id.clone(),
            session,
            established_at,
        });

        let previous = self.conns.write().insert(node_id.clone(), Arc::clone(&conn));
        match previous {
            Some(old) => tracing::info!(
                node_id = %node_id,
                old = %old.id,
                new = %conn.id,
                "node connection replaced"
            ),
            None => tracing::info!(node_id = %node_id, conn = %conn.id, "node connected"),
        }
        conn
    }

    /// Remove a node's entry if it still belongs to the given connection.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove(&self, node_id: &str, id: ConnectionId) -> bool {
        let mut conns = self.conns.write();
        match conns.get(node_id) {
            Some(current) if current.id == id => {
                conns.remove(node_id);
                tracing::info!(node_id = %node_id, conn = %id, "node disconnected");
                true
            }
            Some(current) => {
                tracing::debug!(
                    node_id = %node_id,
                    stale = %id,
                    current = %current.id,
                    "ignoring teardown of superseded connection"
                );
                false
            }
            None => false,
        }
    }

    /// Node ids with a live connection to this server.
    pub fn connected_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.conns.read().keys().cloned().collect();
        nodes.sort();
        nodes
    }

    pub fn len(&self) -> usize {
        self.conns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.read().is_empty()
    }
}
