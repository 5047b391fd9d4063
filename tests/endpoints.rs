//! Endpoint tests.

mod common;

use common::{Reply, TestEngine};
use nodeplane::control::acl::{Authorization, Capability, PermissionSet};
use nodeplane::control::memory::InMemoryCluster;
use nodeplane::control::request::NodeTargetedRequest;
use nodeplane::control::state::ClusterNodeRecord;
use nodeplane::core::error::{ErrorCode, RoutingError};
use nodeplane::endpoints::{ClientAllocations, ClientStats};
use nodeplane::ops::observability::metrics;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn host_stats_reply() -> serde_json::Value {
    json!({
        "host_stats": {
            "timestamp": 1_700_000_000_000_000_000u64,
            "uptime": 3600,
            "memory": { "total": 8192, "available": 4096, "used": 4096, "free": 2048 },
            "cpu": [
                { "cpu": "cpu0", "user": 12.5, "system": 3.0, "idle": 84.5, "total": 15.5 }
            ],
            "disk_stats": [
                {
                    "device": "/dev/sda1",
                    "mountpoint": "/",
                    "size": 100,
                    "used": 40,
                    "available": 60,
                    "used_percent": 40.0
                }
            ]
        }
    })
}

#[tokio::test]
async fn stats_decodes_host_statistics() {
    let t = TestEngine::new();
    t.connect("n1", Reply::Value(host_stats_reply()));
    let endpoint = ClientStats::new(Arc::clone(&t.engine));

    let response = endpoint
        .stats(
            NodeTargetedRequest::new("n1", "east"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let host = response.host_stats.unwrap();
    assert_eq!(host.uptime, 3600);
    assert_eq!(host.memory.unwrap().total, 8192);
    assert_eq!(host.cpu.len(), 1);
    assert_eq!(host.cpu[0].cpu, "cpu0");
    assert_eq!(host.disk_stats[0].mountpoint, "/");
}

#[tokio::test]
async fn stats_always_reads_stale() {
    let t = TestEngine::new();
    t.known_node("n2");
    let endpoint = ClientStats::new(Arc::clone(&t.engine));

    let request = NodeTargetedRequest::new("n2", "east").with_allow_stale(false);
    let err = endpoint
        .stats(request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::NoNodeConnection);
    assert_eq!(*t.collaborators.last_allow_stale.lock(), Some(true));
}

#[tokio::test]
async fn stats_records_latency_on_every_outcome() {
    let t = TestEngine::new();
    t.connect("n1", Reply::Value(host_stats_reply()));
    let endpoint = ClientStats::new(Arc::clone(&t.engine));
    let cancel = CancellationToken::new();

    let _ = endpoint
        .stats(NodeTargetedRequest::new("n1", "east"), &cancel)
        .await;
    let _ = endpoint
        .stats(NodeTargetedRequest::new("", "east"), &cancel)
        .await;

    let histogram = t
        .engine
        .metrics()
        .registry()
        .histogram_get(metrics::CLIENT_STATS_LATENCY)
        .unwrap();
    assert_eq!(histogram.count, 2);
}

#[tokio::test]
async fn stats_for_other_region_is_timed_there() {
    let t = TestEngine::new();
    t.connect("n1", Reply::Value(host_stats_reply()));
    let endpoint = ClientStats::new(Arc::clone(&t.engine));
    let cancel = CancellationToken::new();

    let forwarded = endpoint
        .stats(NodeTargetedRequest::new("n7", "west"), &cancel)
        .await
        .unwrap();
    assert!(forwarded.host_stats.is_none());
    assert_eq!(t.calls().forwards(), 1);
    let registry = t.engine.metrics().registry();
    assert!(registry.histogram_get(metrics::CLIENT_STATS_LATENCY).is_none());

    let _ = endpoint
        .stats(NodeTargetedRequest::new("n1", ""), &cancel)
        .await
        .unwrap();
    let histogram = registry.histogram_get(metrics::CLIENT_STATS_LATENCY).unwrap();
    assert_eq!(histogram.count, 1);
}

#[tokio::test]
async fn malformed_reply_is_upstream_failure() {
    let t = TestEngine::new();
    t.connect("n1", Reply::Value(json!({ "host_stats": "not an object" })));
    let endpoint = ClientStats::new(Arc::clone(&t.engine));

    let err = endpoint
        .stats(
            NodeTargetedRequest::new("n1", "east"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    match err {
        RoutingError::Upstream(upstream) => assert_eq!(upstream.code, "invalid_reply"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn garbage_collect_requires_write() {
    let t = TestEngine::new();
    t.connect("n1", Reply::Value(json!({ "collected": ["a1", "a2"] })));
    t.script(|s| {
        s.authorization = Ok(Authorization::Restricted(PermissionSet::new([
            Capability::NodeRead,
        ])))
    });
    let endpoint = ClientAllocations::new(Arc::clone(&t.engine));
    let cancel = CancellationToken::new();

    let err = endpoint
        .garbage_collect_all(NodeTargetedRequest::new("n1", "east"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RoutingError::PermissionDenied));

    t.script(|s| {
        s.authorization = Ok(Authorization::Restricted(PermissionSet::new([
            Capability::NodeWrite,
        ])))
    });
    let response = endpoint
        .garbage_collect_all(NodeTargetedRequest::new("n1", "east"), &cancel)
        .await
        .unwrap();
    assert_eq!(response.collected, vec!["a1", "a2"]);

    let histogram = t
        .engine
        .metrics()
        .registry()
        .histogram_get(metrics::CLIENT_ALLOCATIONS_GC_ALL_LATENCY)
        .unwrap();
    assert_eq!(histogram.count, 2);
}

#[tokio::test]
async fn endpoints_route_through_cluster() {
    let cluster = InMemoryCluster::builder()
        .server("srv1", "east")
        .server("srv2", "east")
        .node(ClusterNodeRecord::new("n2"))
        .build();
    assert!(cluster.connect("srv2", "n2"));
    let engine = cluster.engine("srv1").unwrap();
    let cancel = CancellationToken::new();

    // Simulated agents reply without host stats.
    let stats = ClientStats::new(Arc::clone(&engine))
        .stats(NodeTargetedRequest::new("n2", "east"), &cancel)
        .await
        .unwrap();
    assert!(stats.host_stats.is_none());

    let gc = ClientAllocations::new(engine)
        .garbage_collect_all(NodeTargetedRequest::new("n2", "east"), &cancel)
        .await
        .unwrap();
    assert!(gc.collected.is_empty());
}
