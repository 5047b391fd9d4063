//! Cluster state snapshots.
//!
//! The routing core only needs to know whether a node was ever registered.
//! It reads through [`ClusterState`], which may answer from a lagging
//! snapshot when the request allows stale reads.

use crate::core::error::CollaboratorError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Node scheduling status as recorded in cluster state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Initializing,
    Ready,
    Down,
    Disconnected,
}

/// Registration record of a node, independent of connection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNodeRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default = "default_status")]
    pub status: NodeStatus,
    /// State store index at which the record was last modified.
    #[serde(default)]
    pub modify_index: u64,
}

fn default_status() -> NodeStatus {
    NodeStatus::Ready
}

impl ClusterNodeRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            datacenter: String::new(),
            status: NodeStatus::Ready,
            modify_index: 0,
        }
    }
}

/// Stale-read-tolerant view of registered nodes.
#[async_trait]
pub trait ClusterState: Send + Sync {
    /// Look up a node record. `allow_stale` permits answering without a
    /// consistency round trip.
    async fn node_by_id(
        &self,
        node_id: &str,
        allow_stale: bool,
    ) -> Result<Option<ClusterNodeRecord>, CollaboratorError>;
}

/// Point-in-time view of the node table.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    index: u64,
    nodes: Arc<HashMap<String, ClusterNodeRecord>>,
}

impl StateSnapshot {
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn node_by_id(&self, node_id: &str) -> Option<&ClusterNodeRecord> {
        self.nodes.get(node_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// In-process node table with copy-on-write snapshots.
///
/// Writers clone the table only when a snapshot still references it, so
/// snapshots stay valid and cheap while writes continue.
#[derive(Debug, Default)]
pub struct StateStore {
    current: RwLock<StateSnapshot>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a snapshot of the current table.
    pub fn snapshot(&self) -> StateSnapshot {
        self.current.read().clone()
    }

    /// Insert or update a node registration.
    pub fn upsert_node(&self, mut record: ClusterNodeRecord) -> u64 {
        let mut current = self.current.write();
        current.index += 1;
        record.modify_index = current.index;
        let index = current.index;
        Arc::make_mut(&mut current.nodes).insert(record.id.clone(), record);
        index
    }

    /// Deregister a node. Returns `true` if it existed.
    pub fn delete_node(&self, node_id: &str) -> bool {
        let mut current = self.current.write();
        if !current.nodes.contains_key(node_id) {
            return false;
        }
        current.index += 1;
        Arc::make_mut(&mut current.nodes).remove(node_id);
        true
    }
}

#[async_trait]
impl ClusterState for StateStore {
    async fn node_by_id(
        &self,
        node_id: &str,
        _allow_stale: bool,
    ) -> Result<Option<ClusterNodeRecord>, CollaboratorError> {
        // The in-process store is always current, so stale and consistent
        // reads coincide.
        Ok(self.snapshot().node_by_id(node_id).cloned())
    }
}
