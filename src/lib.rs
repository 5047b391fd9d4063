//! nodeplane - node-targeted RPC routing for a cluster control plane.
//!
//! Client nodes keep one long-lived session with one server. Any server may
//! receive a request addressed to a node; nodeplane decides where that
//! request runs and gets it there in a single hop.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Endpoints                             │
//! │       ClientStats.Stats   │   ClientAllocations.GarbageCollectAll│
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Forwarding Engine                         │
//! │   validate → region → authorize → local session → state → peer  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Collaborators                           │
//! │ Connection registry │ Token resolver │ Cluster state │ Peers    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Runtime orchestration
//! - [`core::error`] - Error types and codes
//!
//! ## Control
//! - [`control::forward`] - Routing decision and single-hop execution
//! - [`control::registry`] - Locally held node connections
//! - [`control::acl`] - Permission checks
//! - [`control::peers`] - Peer connection lookup
//! - [`control::memory`] - In-process cluster
//!
//! ## Endpoints
//! - [`endpoints::client_stats`] - Host statistics of a node
//! - [`endpoints::client_allocations`] - Allocation garbage collection
//!
//! ## Operations
//! - [`ops::observability`] - Metrics
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - A request missing its node id never reaches a collaborator
//! - Each server either executes a request or forwards it exactly one hop
//! - Permission is checked before any node resolution in the local region
//! - Errors from a remote hop reach the caller unchanged

pub mod cli;
pub mod control;
pub mod core;
pub mod endpoints;
pub mod ops;

pub use crate::control::acl::{Authorization, Capability, PermissionResolver, PermissionSet};
pub use crate::control::forward::{ForwardingEngine, LocalServer, RouteOutcome, RoutingConfig};
pub use crate::control::registry::ConnectionRegistry;
pub use crate::control::request::{NodeTargetedRequest, OperationSpec};
pub use crate::core::config::Config;
pub use crate::core::error::{ErrorCode, RoutingError, RoutingResult};
