//! Node-targeted request envelope.
//!
//! Every routed RPC carries a [`NodeTargetedRequest`]: the region it belongs
//! to, query options, the caller's auth token, the target node, and an
//! operation-specific payload the routing layer never looks into.

use crate::control::acl::Capability;
use serde::{Deserialize, Serialize};

/// Query options shared by read-style RPCs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Region the request logically belongs to.
    pub region: String,

    /// Whether a possibly-lagging read of cluster state is acceptable.
    #[serde(default)]
    pub allow_stale: bool,

    /// Opaque credential resolved into permissions.
    #[serde(default)]
    pub auth_token: String,
}

/// Request addressed to a specific node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTargetedRequest {
    /// Target node. Required; empty is a validation error.
    pub node_id: String,

    #[serde(flatten)]
    pub options: QueryOptions,

    /// Operation-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl NodeTargetedRequest {
    /// Create a request for a node in a region with an empty payload.
    pub fn new(node_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            options: QueryOptions {
                region: region.into(),
                allow_stale: false,
                auth_token: String::new(),
            },
            payload: serde_json::Value::Null,
        }
    }

    /// Attach an auth token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.options.auth_token = token.into();
        self
    }

    /// Attach an operation payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the stale-read option.
    pub fn with_allow_stale(mut self, allow_stale: bool) -> Self {
        self.options.allow_stale = allow_stale;
        self
    }

    pub fn region(&self) -> &str {
        &self.options.region
    }

    pub fn auth_token(&self) -> &str {
        &self.options.auth_token
    }

    pub fn allow_stale(&self) -> bool {
        self.options.allow_stale
    }
}

/// A node-targeted operation: the RPC method name executed once a target is
/// resolved, and the capability a caller needs to invoke it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationSpec {
    /// RPC method name, e.g. `ClientStats.Stats`.
    pub name: &'static str,

    /// Capability required when an ACL system is configured.
    pub capability: Capability,
}

impl OperationSpec {
    pub const fn new(name: &'static str, capability: Capability) -> Self {
        Self { name, capability }
    }
}

impl std::fmt::Display for OperationSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_flatten_on_the_wire() {
        let request = NodeTargetedRequest::new("n1", "east")
            .with_token("secret")
            .with_allow_stale(true);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["node_id"], "n1");
        assert_eq!(json["region"], "east");
        assert_eq!(json["allow_stale"], true);
        assert_eq!(json["auth_token"], "secret");
    }
}
