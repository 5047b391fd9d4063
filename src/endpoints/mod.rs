//! Node-targeted endpoints.
//!
//! Each endpoint names its RPC method and required capability as an
//! [`OperationSpec`] and delegates target resolution to the
//! [`ForwardingEngine`](crate::control::forward::ForwardingEngine).
//! Endpoints only add typing around the routed payload.

pub mod client_allocations;
pub mod client_stats;

use crate::control::request::OperationSpec;
use crate::core::error::{RoutingError, RoutingResult, UpstreamError};
use serde::de::DeserializeOwned;

pub use client_allocations::ClientAllocations;
pub use client_stats::ClientStats;

/// Every node-targeted operation this server routes.
pub const OPERATIONS: &[OperationSpec] = &[
    client_stats::STATS,
    client_allocations::GARBAGE_COLLECT_ALL,
];

/// Look up an operation by its RPC method name.
pub fn operation_by_name(name: &str) -> Option<OperationSpec> {
    OPERATIONS.iter().find(|op| op.name == name).copied()
}

/// Decode a routed reply into the endpoint's response type.
///
/// A reply that does not decode is reported as an upstream failure: the
/// routing itself succeeded.
pub(crate) fn decode_reply<T: DeserializeOwned>(
    operation: &OperationSpec,
    reply: serde_json::Value,
) -> RoutingResult<T> {
    serde_json::from_value(reply).map_err(|err| {
        RoutingError::Upstream(UpstreamError::new(
            "invalid_reply",
            format!("{} returned an invalid reply: {}", operation, err),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::acl::Capability;

    #[test]
    fn operations_resolve_by_name() {
        let stats = operation_by_name("ClientStats.Stats").unwrap();
        assert_eq!(stats.capability, Capability::NodeRead);
        let gc = operation_by_name("ClientAllocations.GarbageCollectAll").unwrap();
        assert_eq!(gc.capability, Capability::NodeWrite);
        assert!(operation_by_name("Job.Register").is_none());
    }
}
