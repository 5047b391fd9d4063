//! Authorization: capabilities, permission sets and token resolution.
//!
//! Resolving a token yields an [`Authorization`]. `Unrestricted` means no ACL
//! system is configured and every capability is granted; `Restricted` carries
//! the concrete [`PermissionSet`] the token maps to.

use crate::core::error::{Collaborator, CollaboratorError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Capability a node-targeted operation may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read node data (stats, status, file listings).
    NodeRead,
    /// Mutate node state (garbage collection, drains).
    NodeWrite,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeRead => "node_read",
            Self::NodeWrite => "node_write",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node_read" => Ok(Self::NodeRead),
            "node_write" => Ok(Self::NodeWrite),
            other => Err(format!("unknown capability: {}", other)),
        }
    }
}

/// Resolved capability set of a token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    capabilities: HashSet<Capability>,
    management: bool,
}

impl PermissionSet {
    /// A set granting exactly the given capabilities.
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            capabilities: capabilities.into_iter().collect(),
            management: false,
        }
    }

    /// A management set granting every capability.
    pub fn management() -> Self {
        Self {
            capabilities: HashSet::new(),
            management: true,
        }
    }

    /// A set granting nothing.
    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.management || self.capabilities.contains(&capability)
    }

    pub fn allow_node_read(&self) -> bool {
        // Write implies read.
        self.allows(Capability::NodeRead) || self.allows(Capability::NodeWrite)
    }

    pub fn allow_node_write(&self) -> bool {
        self.allows(Capability::NodeWrite)
    }

    /// Check a capability with the implication rules applied.
    pub fn permits(&self, capability: Capability) -> bool {
        match capability {
            Capability::NodeRead => self.allow_node_read(),
            Capability::NodeWrite => self.allow_node_write(),
        }
    }
}

/// Result of resolving an auth token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// No ACL system configured; everything is allowed.
    Unrestricted,
    /// The token maps to a concrete permission set.
    Restricted(PermissionSet),
}

impl Authorization {
    /// Check whether the authorization grants a capability.
    pub fn permits(&self, capability: Capability) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Restricted(set) => set.permits(capability),
        }
    }
}

/// Maps an opaque auth token to an [`Authorization`].
///
/// Resolution may itself forward across regions, so it is async and may fail
/// for reasons unrelated to policy.
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Authorization, CollaboratorError>;
}

/// Token resolver backed by a static token table.
///
/// When disabled every token resolves to `Unrestricted`. When enabled an
/// empty token is anonymous and resolves to an empty permission set, and an
/// unknown token is a resolver error.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    enabled: bool,
    tokens: HashMap<String, PermissionSet>,
}

impl StaticTokenResolver {
    /// Resolver with ACLs disabled.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Resolver with ACLs enabled and no tokens.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            tokens: HashMap::new(),
        }
    }

    /// Register a token.
    pub fn with_token(mut self, secret: impl Into<String>, set: PermissionSet) -> Self {
        self.tokens.insert(secret.into(), set);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl PermissionResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str) -> Result<Authorization, CollaboratorError> {
        if !self.enabled {
            return Ok(Authorization::Unrestricted);
        }
        if token.is_empty() {
            return Ok(Authorization::Restricted(PermissionSet::deny_all()));
        }
        match self.tokens.get(token) {
            Some(set) => Ok(Authorization::Restricted(set.clone())),
            None => Err(CollaboratorError::new(
                Collaborator::PermissionResolver,
                "ACL token not found",
            )),
        }
    }
}
