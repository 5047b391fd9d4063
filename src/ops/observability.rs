//! Metrics for the routing layer.
//!
//! Metric namespaces:
//! - nodeplane.route.*
//! - nodeplane.registry.*
//! - nodeplane.<endpoint>.* (per-endpoint latency)

use crate::control::decision::RouteTarget;
use crate::core::error::ErrorCode;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metric names.
pub mod metrics {
    /// Routed requests, any outcome.
    pub const ROUTE_TOTAL: &str = "nodeplane.route.total";
    /// Requests executed on a locally held session.
    pub const ROUTE_LOCAL: &str = "nodeplane.route.local";
    /// Requests forwarded to another region.
    pub const ROUTE_REGION_FORWARD: &str = "nodeplane.route.region_forward";
    /// Requests forwarded to a peer server.
    pub const ROUTE_PEER_FORWARD: &str = "nodeplane.route.peer_forward";
    /// Failed routes, suffixed with the error code.
    pub const ROUTE_FAILED: &str = "nodeplane.route.failed";
    /// Node connections held by this server.
    pub const REGISTRY_CONNECTIONS: &str = "nodeplane.registry.connections";
    /// ClientStats.Stats latency in milliseconds.
    pub const CLIENT_STATS_LATENCY: &str = "nodeplane.client_stats.stats";
    /// ClientAllocations.GarbageCollectAll latency in milliseconds.
    pub const CLIENT_ALLOCATIONS_GC_ALL_LATENCY: &str =
        "nodeplane.client_allocations.garbage_collect_all";
}

/// Metrics registry.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: RwLock<HashMap<String, AtomicU64>>,
    gauges: RwLock<HashMap<String, AtomicU64>>,
    histograms: RwLock<HashMap<String, HistogramData>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter.
    pub fn counter_inc(&self, name: &str) {
        self.counter_add(name, 1);
    }

    /// Add to a counter.
    pub fn counter_add(&self, name: &str, value: u64) {
        let counters = self.counters.read();
        if let Some(counter) = counters.get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }
        drop(counters);

        self.counters
            .write()
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Get counter value.
    pub fn counter_get(&self, name: &str) -> u64 {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Set a gauge value.
    pub fn gauge_set(&self, name: &str, value: u64) {
        let gauges = self.gauges.read();
        if let Some(gauge) = gauges.get(name) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }
        drop(gauges);

        self.gauges
            .write()
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .store(value, Ordering::Relaxed);
    }

    /// Get gauge value.
    pub fn gauge_get(&self, name: &str) -> u64 {
        self.gauges
            .read()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Record a histogram observation.
    pub fn histogram_observe(&self, name: &str, value: f64) {
        let histograms = self.histograms.read();
        if let Some(data) = histograms.get(name) {
            data.observe(value);
            return;
        }
        drop(histograms);

        self.histograms
            .write()
            .entry(name.to_string())
            .or_insert_with(HistogramData::new)
            .observe(value);
    }

    /// Get histogram data.
    pub fn histogram_get(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.read().get(name).map(HistogramData::snapshot)
    }

    /// Export metrics in Prometheus text format, sorted by name.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        let counters = self.counters.read();
        let mut names: Vec<&String> = counters.keys().collect();
        names.sort();
        for name in names {
            let prometheus_name = name.replace('.', "_");
            output.push_str(&format!(
                "# TYPE {} counter\n{} {}\n",
                prometheus_name,
                prometheus_name,
                counters[name].load(Ordering::Relaxed)
            ));
        }

        let gauges = self.gauges.read();
        let mut names: Vec<&String> = gauges.keys().collect();
        names.sort();
        for name in names {
            let prometheus_name = name.replace('.', "_");
            output.push_str(&format!(
                "# TYPE {} gauge\n{} {}\n",
                prometheus_name,
                prometheus_name,
                gauges[name].load(Ordering::Relaxed)
            ));
        }

        let histograms = self.histograms.read();
        let mut names: Vec<&String> = histograms.keys().collect();
        names.sort();
        for name in names {
            let prometheus_name = name.replace('.', "_");
            let snapshot = histograms[name].snapshot();
            output.push_str(&format!(
                "# TYPE {} histogram\n{}_count {}\n{}_sum {}\n",
                prometheus_name, prometheus_name, snapshot.count, prometheus_name, snapshot.sum
            ));
        }

        output
    }
}

#[derive(Debug)]
struct HistogramData {
    count: AtomicU64,
    stats: Mutex<(f64, f64, f64)>,
}

impl HistogramData {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            stats: Mutex::new((0.0, f64::MAX, f64::MIN)),
        }
    }

    fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let mut stats = self.stats.lock();
        stats.0 += value;
        stats.1 = stats.1.min(value);
        stats.2 = stats.2.max(value);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let (sum, min, max) = *self.stats.lock();
        HistogramSnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum,
            min,
            max,
        }
    }
}

/// Histogram snapshot.
#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    /// Number of observations.
    pub count: u64,
    /// Sum of all observations.
    pub sum: f64,
    /// Minimum value observed.
    pub min: f64,
    /// Maximum value observed.
    pub max: f64,
}

impl HistogramSnapshot {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Routing metrics collector.
#[derive(Debug, Default)]
pub struct RoutingMetrics {
    registry: MetricsRegistry,
}

impl RoutingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Record a successfully executed route.
    pub fn record_route(&self, target: &RouteTarget) {
        self.registry.counter_inc(metrics::ROUTE_TOTAL);
        let name = match target {
            RouteTarget::Local => metrics::ROUTE_LOCAL,
            RouteTarget::Region(_) => metrics::ROUTE_REGION_FORWARD,
            RouteTarget::Peer(_) => metrics::ROUTE_PEER_FORWARD,
        };
        self.registry.counter_inc(name);
    }

    /// Record a failed route.
    pub fn record_failure(&self, code: ErrorCode) {
        self.registry.counter_inc(metrics::ROUTE_TOTAL);
        let name = format!("{}.{}", metrics::ROUTE_FAILED, code.as_str());
        self.registry.counter_inc(&name);
    }

    /// Number of failed routes with a given code.
    pub fn failures(&self, code: ErrorCode) -> u64 {
        self.registry
            .counter_get(&format!("{}.{}", metrics::ROUTE_FAILED, code.as_str()))
    }

    /// Record endpoint latency.
    pub fn observe_latency(&self, name: &str, elapsed: Duration) {
        self.registry
            .histogram_observe(name, elapsed.as_secs_f64() * 1000.0);
    }

    pub fn set_connected_nodes(&self, count: usize) {
        self.registry
            .gauge_set(metrics::REGISTRY_CONNECTIONS, count as u64);
    }
}
