//! RPC executor contracts.
//!
//! Two ways to execute a resolved request: over a session this server holds
//! to the node's agent ([`NodeSession`]), or over the inter-server transport
//! to another server ([`Forwarder`]). Both report failures as
//! [`CallError`] so the engine can separate broken hops from handler results.

use crate::control::peers::PeerHandle;
use crate::control::request::NodeTargetedRequest;
use crate::core::error::{CallError, Hop};
use async_trait::async_trait;
use std::sync::Arc;

/// Live multiplexed control connection to a node's agent.
#[async_trait]
pub trait NodeSession: Send + Sync + std::fmt::Debug {
    /// Invoke a named operation on the agent.
    async fn invoke(
        &self,
        method: &str,
        request: &NodeTargetedRequest,
    ) -> Result<serde_json::Value, CallError>;
}

/// Shared handle to a node session.
pub type SessionHandle = Arc<dyn NodeSession>;

/// Where a forwarded request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardTarget {
    /// Entry point (current leader) of another region.
    Region(String),
    /// A specific peer server in the local region.
    Peer(PeerHandle),
}

impl ForwardTarget {
    /// The hop this target represents, for error reporting.
    pub fn hop(&self) -> Hop {
        match self {
            Self::Region(region) => Hop::Region(region.clone()),
            Self::Peer(peer) => Hop::Peer(peer.server_id.clone()),
        }
    }
}

impl std::fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.hop().fmt(f)
    }
}

/// Inter-server transport.
///
/// Implementations resolve a region target to that region's current entry
/// point themselves.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        target: &ForwardTarget,
        method: &str,
        request: &NodeTargetedRequest,
    ) -> Result<serde_json::Value, CallError>;
}
