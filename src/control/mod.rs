//! Node-targeted request routing.
//!
//! - [`request`] - Request envelope and operation descriptors
//! - [`acl`] - Capabilities, permission sets and token resolution
//! - [`registry`] - Node connections held by this server
//! - [`state`] - Cluster state snapshots
//! - [`peers`] - Locating the server that holds a node's connection
//! - [`rpc`] - Session and forwarding seams
//! - [`decision`] - Route states and decision traces
//! - [`forward`] - The forwarding engine
//! - [`memory`] - In-process cluster wiring the above together
//!
//! # Routing
//!
//! A request names a node. The server that receives it either executes it on
//! a node session it holds, or forwards it exactly one hop: to the region the
//! request names, or to the peer in this region holding the node's
//! connection. Nothing is retried.

pub mod acl;
pub mod decision;
pub mod forward;
pub mod memory;
pub mod peers;
pub mod registry;
pub mod request;
pub mod rpc;
pub mod state;
