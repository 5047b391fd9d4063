//! Error types and wire mapping.
//!
//! Routing failures are binary outcomes for the caller: the Forwarding Engine
//! produces them directly and never retries. Error codes returned by
//! [`RoutingError::code`] are stable string constants and part of the RPC
//! contract.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Routing layer error conditions.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum RoutingError {
    /// Malformed request, e.g. missing node identifier. Never retried.
    #[error("{message}")]
    Validation { message: String },

    /// The resolved permission set lacks the operation's capability.
    #[error("Permission denied")]
    PermissionDenied,

    /// The node was never registered in cluster state.
    #[error("Unknown node {node_id:?}")]
    UnknownNode { node_id: String },

    /// The node is registered but no server currently holds its connection.
    #[error("No path to node")]
    NoNodeConnection { node_id: String },

    /// A forwarding hop failed at the transport level.
    #[error("forwarding to {hop} failed: {source}")]
    ForwardingFailure {
        hop: Hop,
        #[source]
        source: TransportError,
    },

    /// Domain failure returned by the handler. Passed through unchanged.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Failure reported by an external collaborator (permission resolver,
    /// state snapshot, peer locator). Propagated verbatim.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// The caller gave up before routing completed.
    #[error("request cancelled")]
    Cancelled,
}

impl RoutingError {
    /// Create a Validation error for a missing required argument.
    pub fn missing_argument(argument: &str) -> Self {
        Self::Validation {
            message: format!("missing {}", argument),
        }
    }

    /// Create an UnknownNode error.
    pub fn unknown_node(node_id: impl Into<String>) -> Self {
        Self::UnknownNode {
            node_id: node_id.into(),
        }
    }

    /// Create a NoNodeConnection error.
    pub fn no_node_connection(node_id: impl Into<String>) -> Self {
        Self::NoNodeConnection {
            node_id: node_id.into(),
        }
    }

    /// Create a ForwardingFailure naming the failed hop.
    pub fn forwarding(hop: Hop, source: TransportError) -> Self {
        Self::ForwardingFailure { hop, source }
    }

    /// Stable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::PermissionDenied => ErrorCode::PermissionDenied,
            Self::UnknownNode { .. } => ErrorCode::UnknownNode,
            Self::NoNodeConnection { .. } => ErrorCode::NoNodeConnection,
            Self::ForwardingFailure { .. } => ErrorCode::ForwardingFailure,
            Self::Upstream(_) => ErrorCode::Upstream,
            Self::Collaborator(_) => ErrorCode::Internal,
            Self::Cancelled => ErrorCode::Cancelled,
        }
    }

    /// Check if a caller may reasonably retry this error with backoff.
    ///
    /// The core never retries on its own.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::NoNodeConnection { .. } | Self::ForwardingFailure { .. }
        )
    }

    /// Check if this error was generated by the routing layer itself, as
    /// opposed to being passed through from a handler or collaborator.
    pub fn is_routing_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::PermissionDenied
                | Self::UnknownNode { .. }
                | Self::NoNodeConnection { .. }
                | Self::ForwardingFailure { .. }
        )
    }
}

/// Result type using RoutingError.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// The hop a forwarded request was sent to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hop {
    /// Entry point (leader) of another region.
    Region(String),
    /// Peer server in the local region.
    Peer(String),
    /// Locally held session to a node.
    Node(String),
}

impl std::fmt::Display for Hop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Region(region) => write!(f, "region {}", region),
            Self::Peer(server) => write!(f, "server {}", server),
            Self::Node(node) => write!(f, "node {}", node),
        }
    }
}

/// Transport-level failure of a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unreachable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Closed, message)
    }
}

/// Transport failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportErrorKind {
    /// The target could not be reached.
    Unreachable,
    /// The call exceeded its deadline.
    Timeout,
    /// The connection or stream closed mid-call.
    Closed,
    /// The peer sent something we could not decode.
    Protocol,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable => write!(f, "unreachable"),
            Self::Timeout => write!(f, "timeout"),
            Self::Closed => write!(f, "closed"),
            Self::Protocol => write!(f, "protocol"),
        }
    }
}

/// Domain failure produced by an operation handler.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct UpstreamError {
    /// Handler-defined error code, opaque to routing.
    pub code: String,
    pub message: String,
}

impl UpstreamError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// External collaborator that reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Collaborator {
    PermissionResolver,
    StateSnapshot,
    PeerLocator,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionResolver => write!(f, "permission resolver"),
            Self::StateSnapshot => write!(f, "state snapshot"),
            Self::PeerLocator => write!(f, "peer locator"),
        }
    }
}

/// Failure reported by an external collaborator.
///
/// Displays as the collaborator's own message so it surfaces verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct CollaboratorError {
    pub collaborator: Collaborator,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: Collaborator, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

/// Failure of a single local or inter-server call.
///
/// RPC executors return this so the engine can tell a broken hop apart
/// from a result the far side produced.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The bytes never made it, or the reply never came back.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The handler ran and returned a domain failure.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The remote server's own routing layer rejected the request.
    #[error(transparent)]
    Routed(RoutingError),
}

// ============================================================================
// Wire error codes
// ============================================================================

/// Stable error identifiers carried on the wire and in metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Validation,
    PermissionDenied,
    UnknownNode,
    NoNodeConnection,
    ForwardingFailure,
    Upstream,
    Internal,
    Cancelled,
}

impl ErrorCode {
    /// Stable string constant for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::PermissionDenied => "permission_denied",
            Self::UnknownNode => "unknown_node",
            Self::NoNodeConnection => "no_node_connection",
            Self::ForwardingFailure => "forwarding_failure",
            Self::Upstream => "upstream",
            Self::Internal => "internal",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_argument_message() {
        let err = RoutingError::missing_argument("NodeID");
        assert_eq!(err.to_string(), "missing NodeID");
        assert_eq!(err.code(), ErrorCode::Validation);
        assert!(!err.is_retriable());
    }

    #[test]
    fn forwarding_failure_names_hop() {
        let err = RoutingError::forwarding(
            Hop::Peer("srv2".to_string()),
            TransportError::timeout("deadline elapsed"),
        );
        let text = err.to_string();
        assert!(text.contains("server srv2"));
        assert!(text.contains("timeout"));
        assert!(err.is_retriable());
    }

    #[test]
    fn collaborator_error_is_verbatim() {
        let err: RoutingError =
            CollaboratorError::new(Collaborator::PermissionResolver, "token lookup failed").into();
        assert_eq!(err.to_string(), "token lookup failed");
        assert!(!err.is_routing_error());
    }

    #[test]
    fn upstream_is_not_a_routing_error() {
        let err: RoutingError = UpstreamError::new("io", "disk full").into();
        assert_eq!(err.code(), ErrorCode::Upstream);
        assert!(!err.is_routing_error());
        assert_eq!(err.to_string(), "disk full");
    }
}
