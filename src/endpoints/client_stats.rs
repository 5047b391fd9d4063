//! ClientStats endpoint.
//!
//! Fetches host resource usage from a node's agent. Reads only the node
//! registration from cluster state, so stale reads are always allowed: an
//! extra consistency hop in the forwarding chain costs more than a slightly
//! lagging registration.
//!
//! Latency is recorded only for requests handled in this region; requests
//! for another region are timed by the region that serves them.

use crate::control::acl::Capability;
use crate::control::forward::ForwardingEngine;
use crate::control::request::{NodeTargetedRequest, OperationSpec};
use crate::core::error::RoutingResult;
use crate::endpoints::decode_reply;
use crate::ops::observability::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// `ClientStats.Stats`: host statistics of a node.
pub const STATS: OperationSpec = OperationSpec::new("ClientStats.Stats", Capability::NodeRead);

/// Memory usage in bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
}

/// Per-CPU utilization percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    pub cpu: String,
    pub user: f64,
    pub system: f64,
    pub idle: f64,
    pub total: f64,
}

/// Disk usage of one mountpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskStats {
    pub device: String,
    pub mountpoint: String,
    pub size: u64,
    pub used: u64,
    pub available: u64,
    pub used_percent: f64,
}

/// Host statistics reported by an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostStats {
    /// Collection time, unix nanoseconds.
    pub timestamp: u64,
    /// Host uptime in seconds.
    pub uptime: u64,
    #[serde(default)]
    pub memory: Option<MemoryStats>,
    #[serde(default)]
    pub cpu: Vec<CpuStats>,
    #[serde(default)]
    pub disk_stats: Vec<DiskStats>,
}

/// Reply of `ClientStats.Stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientStatsResponse {
    pub host_stats: Option<HostStats>,
}

/// Routes `ClientStats` RPCs to the server holding the node.
pub struct ClientStats {
    engine: Arc<ForwardingEngine>,
}

impl ClientStats {
    pub fn new(engine: Arc<ForwardingEngine>) -> Self {
        Self { engine }
    }

    /// Fetch host statistics of `request.node_id`.
    pub async fn stats(
        &self,
        mut request: NodeTargetedRequest,
        cancel: &CancellationToken,
    ) -> RoutingResult<ClientStatsResponse> {
        request.options.allow_stale = true;

        let started = Instant::now();
        let reply = self.engine.route(&STATS, &request, cancel).await;
        if self.engine.handles_region(request.region()) {
            self.engine
                .metrics()
                .observe_latency(metrics::CLIENT_STATS_LATENCY, started.elapsed());
        }

        decode_reply(&STATS, reply?)
    }
}
