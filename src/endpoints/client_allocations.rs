//! ClientAllocations endpoint.

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

/// `ClientAllocations.GarbageCollectAll`: collect every terminal allocation
/// on a node.
pub const GARBAGE_COLLECT_ALL: OperationSpec = OperationSpec::new(
    "ClientAllocations.GarbageCollectAll",
    Capability::NodeWrite,
);

/// Reply of `ClientAllocations.GarbageCollectAll`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GarbageCollectResponse {
    /// Allocations removed by the agent.
    #[serde(default)]
    pub collected: Vec<String>,
}

/// Routes `ClientAllocations` RPCs to the server holding the node.
pub struct ClientAllocations {
    engine: Arc<ForwardingEngine>,
}

impl ClientAllocations {
    pub fn new(engine: Arc<ForwardingEngine>) -> Self {
        Self { engine }
    }

    pub async fn garbage_collect_all(
        &self,
        mut request: NodeTargetedRequest,
        cancel: &CancellationToken,
    ) -> RoutingResult<GarbageCollectResponse> {
        request.options.allow_stale = true;

        let started = Instant::now();
        let reply = self
            .engine
            .route(&GARBAGE_COLLECT_ALL, &request, cancel)
            .await;
        // Forwarded regions time the request themselves.
        if self.engine.handles_region(request.region()) {
            self.engine.metrics().observe_latency(
                metrics::CLIENT_ALLOCATIONS_GC_ALL_LATENCY,
                started.elapsed(),
            );
        }

        decode_reply(&GARBAGE_COLLECT_ALL, reply?)
    }
}
