//! Operations and observability tests.

use nodeplane::control::decision::RouteTarget;
use nodeplane::core::error::ErrorCode;
use nodeplane::ops::observability::{metrics, MetricsRegistry, RoutingMetrics};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn route_counters_by_target() {
    let routing = RoutingMetrics::new();
    routing.record_route(&RouteTarget::Local);
    routing.record_route(&RouteTarget::Local);
    routing.record_route(&RouteTarget::Region("west".to_string()));
    routing.record_route(&RouteTarget::Peer("srv2".to_string()));

    let registry = routing.registry();
    assert_eq!(registry.counter_get(metrics::ROUTE_TOTAL), 4);
    assert_eq!(registry.counter_get(metrics::ROUTE_LOCAL), 2);
    assert_eq!(registry.counter_get(metrics::ROUTE_REGION_FORWARD), 1);
    assert_eq!(registry.counter_get(metrics::ROUTE_PEER_FORWARD), 1);
}

#[test]
fn failures_are_keyed_by_code() {
    let routing = RoutingMetrics::new();
    routing.record_failure(ErrorCode::PermissionDenied);
    routing.record_failure(ErrorCode::PermissionDenied);
    routing.record_failure(ErrorCode::ForwardingFailure);

    assert_eq!(routing.failures(ErrorCode::PermissionDenied), 2);
    assert_eq!(routing.failures(ErrorCode::ForwardingFailure), 1);
    assert_eq!(routing.failures(ErrorCode::UnknownNode), 0);
    assert_eq!(
        routing
            .registry()
            .counter_get("nodeplane.route.failed.permission_denied"),
        2
    );
}

#[test]
fn latency_is_recorded_in_milliseconds() {
    let routing = RoutingMetrics::new();
    routing.observe_latency(metrics::CLIENT_STATS_LATENCY, Duration::from_millis(20));
    routing.observe_latency(metrics::CLIENT_STATS_LATENCY, Duration::from_millis(40));

    let snapshot = routing
        .registry()
        .histogram_get(metrics::CLIENT_STATS_LATENCY)
        .unwrap();
    assert_eq!(snapshot.count, 2);
    assert!((snapshot.mean() - 30.0).abs() < 1e-9);
    assert!((snapshot.min - 20.0).abs() < 1e-9);
    assert!((snapshot.max - 40.0).abs() < 1e-9);
}

#[test]
fn connected_nodes_gauge() {
    let routing = RoutingMetrics::new();
    routing.set_connected_nodes(3);
    routing.set_connected_nodes(2);
    assert_eq!(
        routing.registry().gauge_get(metrics::REGISTRY_CONNECTIONS),
        2
    );
}

#[test]
fn prometheus_export_is_sorted() {
    let registry = MetricsRegistry::new();
    registry.counter_inc("nodeplane.route.total");
    registry.counter_inc("nodeplane.route.local");
    registry.gauge_set(metrics::REGISTRY_CONNECTIONS, 5);
    registry.histogram_observe(metrics::CLIENT_STATS_LATENCY, 1.5);

    let text = registry.export_prometheus();
    let local = text.find("nodeplane_route_local 1").unwrap();
    let total = text.find("nodeplane_route_total 1").unwrap();
    assert!(local < total);
    assert!(text.contains("# TYPE nodeplane_registry_connections gauge"));
    assert!(text.contains("nodeplane_registry_connections 5"));
    assert!(text.contains("nodeplane_client_stats_stats_count 1"));
}

#[test]
fn concurrent_counter_updates() {
    let registry = Arc::new(MetricsRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..1000 {
                    registry.counter_inc(metrics::ROUTE_TOTAL);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(registry.counter_get(metrics::ROUTE_TOTAL), 8000);
}
