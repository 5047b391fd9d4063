//! Peer location.
//!
//! Finds the server in a region that currently holds a node's connection.
//! Ownership is never cached: it can change between two calls, so every
//! lookup asks the servers again.
//!
//! # Migration window
//!
//! While an agent reconnects to a different server, two servers may briefly
//! report a connection. [`MembershipPeerLocator`] picks the one whose
//! connection was established most recently, since the older one is about
//! to be torn down. Zero holders is reported as `None`.

use crate::control::registry::ConnectionStatus;
use crate::core::error::{Collaborator, CollaboratorError, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Address of another server in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerHandle {
    pub server_id: String,
    pub region: String,
    /// RPC address of the server.
    #[serde(default)]
    pub addr: String,
}

impl PeerHandle {
    pub fn new(server_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            region: region.into(),
            addr: String::new(),
        }
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }
}

impl std::fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.server_id, self.region)
    }
}

/// Determines which server holds a live connection to a node.
#[async_trait]
pub trait PeerLocator: Send + Sync {
    async fn server_holding_connection(
        &self,
        node_id: &str,
        region: &str,
    ) -> Result<Option<PeerHandle>, CollaboratorError>;
}

/// Live view of the servers in the cluster, as tracked by membership.
pub trait ServerMembership: Send + Sync {
    /// Servers currently considered alive in a region.
    fn alive_servers(&self, region: &str) -> Vec<PeerHandle>;
}

/// Asks a single server whether it holds a node's connection.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn has_node_conn(
        &self,
        server: &PeerHandle,
        node_id: &str,
    ) -> Result<Option<ConnectionStatus>, TransportError>;
}

/// Peer locator that polls every alive server in the region.
pub struct MembershipPeerLocator {
    local_server_id: String,
    membership: Arc<dyn ServerMembership>,
    probe: Arc<dyn ConnectionProbe>,
}

impl MembershipPeerLocator {
    pub fn new(
        local_server_id: impl Into<String>,
        membership: Arc<dyn ServerMembership>,
        probe: Arc<dyn ConnectionProbe>,
    ) -> Self {
        Self {
            local_server_id: local_server_id.into(),
            membership,
            probe,
        }
    }
}

#[async_trait]
impl PeerLocator for MembershipPeerLocator {
    async fn server_holding_connection(
        &self,
        node_id: &str,
        region: &str,
    ) -> Result<Option<PeerHandle>, CollaboratorError> {
        let mut newest: Option<(PeerHandle, ConnectionStatus)> = None;
        let mut failures = Vec::new();

        for server in self.membership.alive_servers(region) {
            if server.server_id == self.local_server_id {
                continue;
            }

            match self.probe.has_node_conn(&server, node_id).await {
                Ok(Some(status)) => {
                    let newer = newest
                        .as_ref()
                        .map_or(true, |(_, best)| status.established_at > best.established_at);
                    if newer {
                        newest = Some((server, status));
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(
                        server = %server,
                        node_id = %node_id,
                        error = %err,
                        "connection probe failed"
                    );
                    failures.push(format!("{}: {}", server.server_id, err));
                }
            }
        }

        match newest {
            Some((server, _)) => Ok(Some(server)),
            // Only report probe errors when they may have hidden the owner.
            None if !failures.is_empty() => Err(CollaboratorError::new(
                Collaborator::PeerLocator,
                format!(
                    "failed to query servers for node {}: {}",
                    node_id,
                    failures.join("; ")
                ),
            )),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::{Duration, SystemTime};

    struct StaticMembership(Vec<PeerHandle>);

    impl ServerMembership for StaticMembership {
        fn alive_servers(&self, region: &str) -> Vec<PeerHandle> {
            self.0.iter().filter(|s| s.region == region).cloned().collect()
        }
    }

    struct TableProbe(HashMap<String, Result<Option<ConnectionStatus>, TransportError>>);

    #[async_trait]
    impl ConnectionProbe for TableProbe {
        async fn has_node_conn(
            &self,
            server: &PeerHandle,
            _node_id: &str,
        ) -> Result<Option<ConnectionStatus>, TransportError> {
            self.0.get(&server.server_id).cloned().unwrap_or(Ok(None))
        }
    }

    fn at(secs: u64) -> ConnectionStatus {
        ConnectionStatus {
            established_at: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    fn locator(probe: TableProbe) -> MembershipPeerLocator {
        let membership = StaticMembership(vec![
            PeerHandle::new("srv1", "east"),
            PeerHandle::new("srv2", "east"),
            PeerHandle::new("srv3", "east"),
            PeerHandle::new("srv9", "west"),
        ]);
        MembershipPeerLocator::new("srv1", Arc::new(membership), Arc::new(probe))
    }

    #[tokio::test]
    async fn prefers_most_recent_connection() {
        let probe = TableProbe(HashMap::from([
            ("srv2".to_string(), Ok(Some(at(100)))),
            ("srv3".to_string(), Ok(Some(at(200)))),
        ]));
        let peer = locator(probe)
            .server_holding_connection("n1", "east")
            .await
            .unwrap();
        assert_eq!(peer.unwrap().server_id, "srv3");
    }

    #[tokio::test]
    async fn skips_local_server_and_other_regions() {
        let probe = TableProbe(HashMap::from([
            ("srv1".to_string(), Ok(Some(at(500)))),
            ("srv9".to_string(), Ok(Some(at(500)))),
        ]));
        let peer = locator(probe)
            .server_holding_connection("n1", "east")
            .await
            .unwrap();
        assert!(peer.is_none());
    }

    #[tokio::test]
    async fn probe_failures_surface_only_without_owner() {
        let failing = TableProbe(HashMap::from([(
            "srv2".to_string(),
            Err(TransportError::unreachable("connection refused")),
        )]));
        let err = locator(failing)
            .server_holding_connection("n1", "east")
            .await
            .unwrap_err();
        assert_eq!(err.collaborator, Collaborator::PeerLocator);
        assert!(err.message.contains("srv2"));

        let partial = TableProbe(HashMap::from([
            (
                "srv2".to_string(),
                Err(TransportError::unreachable("connection refused")),
            ),
            ("srv3".to_string(), Ok(Some(at(10)))),
        ]));
        let peer = locator(partial)
            .server_holding_connection("n1", "east")
            .await
            .unwrap();
        assert_eq!(peer.unwrap().server_id, "srv3");
    }
}
