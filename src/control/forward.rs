//! Forwarding engine.
//!
//! Decides, for one node-targeted request, where it must execute and then
//! executes that single hop:
//!
//! 1. Requests for another region go to that region's entry point untouched.
//!    Authorization and node resolution are the target region's job.
//! 2. The auth token is resolved; a restricted set lacking the operation's
//!    capability fails with `PermissionDenied`.
//! 3. A session held by this server runs the request locally.
//! 4. Otherwise the node must exist in cluster state (`UnknownNode`) and some
//!    peer in this region must hold its connection (`NoNodeConnection`);
//!    the request is then forwarded to that peer.
//!
//! A missing node id is rejected before step 1; it is a pure check and never
//! touches a collaborator.
//!
//! The engine never retries and never mutates the connection registry.

use crate::control::acl::{Authorization, PermissionResolver};
use crate::control::decision::{RouteState, RouteTarget, RouteTrace};
use crate::control::peers::PeerLocator;
use crate::control::registry::ConnectionRegistry;
use crate::control::request::{NodeTargetedRequest, OperationSpec};
use crate::control::rpc::{ForwardTarget, Forwarder};
use crate::control::state::ClusterState;
use crate::core::error::{CallError, Hop, RoutingError, RoutingResult, TransportError};
use crate::ops::observability::RoutingMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default deadline for a single forwarded call.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity of the server running the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalServer {
    pub server_id: String,
    pub region: String,
}

impl LocalServer {
    pub fn new(server_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            region: region.into(),
        }
    }
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Deadline for one local or forwarded call.
    pub forward_timeout: Duration,
    /// Read cluster state without a consistency round trip.
    pub allow_stale: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            forward_timeout: DEFAULT_FORWARD_TIMEOUT,
            allow_stale: true,
        }
    }
}

/// Collaborators the engine depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub permissions: Arc<dyn PermissionResolver>,
    pub state: Arc<dyn ClusterState>,
    pub peers: Arc<dyn PeerLocator>,
    pub forwarder: Arc<dyn Forwarder>,
}

/// Result of a route together with the states it passed through.
#[derive(Debug)]
pub struct RouteOutcome {
    pub result: RoutingResult<serde_json::Value>,
    pub trace: RouteTrace,
    /// Where the request executed, when a target was reached.
    pub target: Option<RouteTarget>,
}

/// Routes node-targeted requests to the server holding the node.
pub struct ForwardingEngine {
    local: LocalServer,
    config: RoutingConfig,
    registry: Arc<ConnectionRegistry>,
    collaborators: Collaborators,
    metrics: Arc<RoutingMetrics>,
}

impl ForwardingEngine {
    pub fn new(
        local: LocalServer,
        config: RoutingConfig,
        registry: Arc<ConnectionRegistry>,
        collaborators: Collaborators,
        metrics: Arc<RoutingMetrics>,
    ) -> Self {
        Self {
            local,
            config,
            registry,
            collaborators,
            metrics,
        }
    }

    pub fn local(&self) -> &LocalServer {
        &self.local
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<RoutingMetrics> {
        &self.metrics
    }

    /// Whether requests for `region` are handled in this server's region.
    /// An empty region means the local one.
    pub fn handles_region(&self, region: &str) -> bool {
        region.is_empty() || region == self.local.region
    }

    /// Route a request and execute the operation on the resolved target.
    pub async fn route(
        &self,
        operation: &OperationSpec,
        request: &NodeTargetedRequest,
        cancel: &CancellationToken,
    ) -> RoutingResult<serde_json::Value> {
        self.route_traced(operation, request, cancel).await.result
    }

    /// Route a request, returning the decision trace alongside the result.
    pub async fn route_traced(
        &self,
        operation: &OperationSpec,
        request: &NodeTargetedRequest,
        cancel: &CancellationToken,
    ) -> RouteOutcome {
        self.metrics.set_connected_nodes(self.registry.len());
        let mut trace = RouteTrace::new();
        let mut target = None;
        let result = self.decide(operation, request, cancel, &mut trace, &mut target).await;

        match &result {
            Ok(_) => {
                trace.advance(RouteState::Done);
                if let Some(target) = &target {
                    self.metrics.record_route(target);
                }
            }
            Err(err) => {
                trace.advance(RouteState::Failed);
                self.metrics.record_failure(err.code());
                if err.is_routing_error() {
                    tracing::debug!(
                        operation = %operation,
                        node_id = %request.node_id,
                        error = %err,
                        trace = %trace,
                        "route failed"
                    );
                }
            }
        }

        RouteOutcome {
            result,
            trace,
            target,
        }
    }

    async fn decide(
        &self,
        operation: &OperationSpec,
        request: &NodeTargetedRequest,
        cancel: &CancellationToken,
        trace: &mut RouteTrace,
        target: &mut Option<RouteTarget>,
    ) -> RoutingResult<serde_json::Value> {
        if request.node_id.is_empty() {
            return Err(RoutingError::missing_argument("NodeID"));
        }

        // Region check.
        let region = request.region();
        if !self.handles_region(region) {
            trace.advance(RouteState::RegionForward);
            *target = Some(RouteTarget::Region(region.to_string()));
            tracing::debug!(
                operation = %operation,
                node_id = %request.node_id,
                region = %region,
                "forwarding to region"
            );
            return self
                .execute_remote(
                    ForwardTarget::Region(region.to_string()),
                    operation,
                    request,
                    cancel,
                )
                .await;
        }

        // Authorization.
        let authorization = cancellable(cancel, async {
            self.collaborators
                .permissions
                .resolve(request.auth_token())
                .await
                .map_err(RoutingError::from)
        })
        .await?;
        if let Authorization::Restricted(ref set) = authorization {
            if !set.permits(operation.capability) {
                return Err(RoutingError::PermissionDenied);
            }
        }
        trace.advance(RouteState::AuthChecked);

        // Local resolution.
        if let Some(conn) = self.registry.lookup(&request.node_id) {
            trace.advance(RouteState::LocalHit);
            *target = Some(RouteTarget::Local);
            tracing::debug!(
                operation = %operation,
                node_id = %request.node_id,
                conn = %conn.id,
                "executing on local node session"
            );
            let call = conn.session.invoke(operation.name, request);
            return self
                .call_hop(Hop::Node(request.node_id.clone()), call, cancel)
                .await;
        }

        // Existence check.
        let allow_stale = request.allow_stale() || self.config.allow_stale;
        let record = cancellable(cancel, async {
            self.collaborators
                .state
                .node_by_id(&request.node_id, allow_stale)
                .await
                .map_err(RoutingError::from)
        })
        .await?;
        if record.is_none() {
            return Err(RoutingError::unknown_node(&request.node_id));
        }
        trace.advance(RouteState::SnapshotChecked);

        // Remote resolution.
        let peer = cancellable(cancel, async {
            self.collaborators
                .peers
                .server_holding_connection(&request.node_id, &self.local.region)
                .await
                .map_err(RoutingError::from)
        })
        .await?;
        let Some(peer) = peer else {
            return Err(RoutingError::no_node_connection(&request.node_id));
        };

        trace.advance(RouteState::RemoteForward);
        *target = Some(RouteTarget::Peer(peer.server_id.clone()));
        tracing::debug!(
            operation = %operation,
            node_id = %request.node_id,
            peer = %peer,
            "forwarding to peer holding node connection"
        );
        self.execute_remote(ForwardTarget::Peer(peer), operation, request, cancel)
            .await
    }

    /// Execute a request elsewhere. Region and peer forwarding share this
    /// path and its error handling.
    async fn execute_remote(
        &self,
        target: ForwardTarget,
        operation: &OperationSpec,
        request: &NodeTargetedRequest,
        cancel: &CancellationToken,
    ) -> RoutingResult<serde_json::Value> {
        let call = self
            .collaborators
            .forwarder
            .forward(&target, operation.name, request);
        self.call_hop(target.hop(), call, cancel).await
    }

    /// Drive one call to completion under the deadline and cancellation.
    ///
    /// Transport failures become `ForwardingFailure` naming the hop; handler
    /// failures and remote routing errors pass through unchanged.
    async fn call_hop<F>(
        &self,
        hop: Hop,
        call: F,
        cancel: &CancellationToken,
    ) -> RoutingResult<serde_json::Value>
    where
        F: Future<Output = Result<serde_json::Value, CallError>>,
    {
        let timeout = self.config.forward_timeout;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RoutingError::Cancelled),
            outcome = tokio::time::timeout(timeout, call) => outcome,
        };

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(CallError::Transport(err))) => {
                tracing::warn!(hop = %hop, error = %err, "forwarding hop failed");
                Err(RoutingError::forwarding(hop, err))
            }
            Ok(Err(CallError::Upstream(err))) => Err(RoutingError::Upstream(err)),
            Ok(Err(CallError::Routed(err))) => Err(err),
            Err(_elapsed) => {
                tracing::warn!(hop = %hop, timeout_ms = timeout.as_millis() as u64, "forwarding hop timed out");
                Err(RoutingError::forwarding(
                    hop,
                    TransportError::timeout(format!(
                        "no reply within {}ms",
                        timeout.as_millis()
                    )),
                ))
            }
        }
    }
}

/// Await a collaborator call unless the caller cancels first. The pending
/// future is dropped on cancellation.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> RoutingResult<T>
where
    F: Future<Output = RoutingResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RoutingError::Cancelled),
        result = fut => result,
    }
}
