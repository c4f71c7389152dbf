use crate::build_info;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;
use tokio::sync::OnceCell;

pub static QUEUE_METRICS: OnceCell<QueueMetrics> = OnceCell::const_new();
pub static LIVE_FEED_METRICS: OnceCell<LiveFeedMetrics> = OnceCell::const_new();

/// Registers build identity as a labeled gauge fixed at `1`.
pub fn register_build_info_metric(registry: &mut Registry, prefix: &str) {
    let build_info_metric = Family::<BuildInfoLabels, Gauge>::default();
    build_info_metric
        .get_or_create(&BuildInfoLabels {
            service: "media_queue",
            version: build_info::VERSION,
            commit: build_info::short_commit_hash(),
        })
        .set(1);
    registry.sub_registry_with_prefix(prefix).register(
        "build_info",
        "Build identity labels for this process",
        build_info_metric,
    );
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BuildInfoLabels {
    service: &'static str,
    version: &'static str,
    commit: &'static str,
}

#[derive(Clone, Default)]
pub struct QueueMetrics {
    /// Page fetches that passed the in-flight guard.
    pub fetches_started_total: Counter,
    pub fetches_failed_total: Counter,
    /// Responses dropped because the session was closed while they were in flight.
    pub fetches_discarded_total: Counter,
    pub records_admitted_total: Counter,
    pub duplicates_dropped_total: Counter,
    /// Length of the most recently mutated sequence.
    pub sequence_length: Gauge,
}

impl QueueMetrics {
    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::default();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "fetches_started",
            "Total number of page fetches issued to the record source",
            metrics.fetches_started_total.clone(),
        );
        sub_registry.register(
            "fetches_failed",
            "Total number of page fetches that failed",
            metrics.fetches_failed_total.clone(),
        );
        sub_registry.register(
            "fetches_discarded",
            "Total number of page responses discarded as stale",
            metrics.fetches_discarded_total.clone(),
        );
        sub_registry.register(
            "records_admitted",
            "Total number of records admitted into the queue",
            metrics.records_admitted_total.clone(),
        );
        sub_registry.register(
            "duplicates_dropped",
            "Total number of records dropped because their id was already queued",
            metrics.duplicates_dropped_total.clone(),
        );
        sub_registry.register(
            "sequence_length",
            "Number of records currently held by the queue",
            metrics.sequence_length.clone(),
        );
        metrics
    }
}

#[derive(Clone, Default)]
pub struct LiveFeedMetrics {
    pub events_received_total: Counter,
    pub records_prepended_total: Counter,
    pub records_ignored_total: Counter,
    pub decode_failures_total: Counter,
}

impl LiveFeedMetrics {
    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::default();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "events_received",
            "Total number of record events received from the live feed",
            metrics.events_received_total.clone(),
        );
        sub_registry.register(
            "records_prepended",
            "Total number of live records prepended to the queue",
            metrics.records_prepended_total.clone(),
        );
        sub_registry.register(
            "records_ignored",
            "Total number of live records ignored as already queued",
            metrics.records_ignored_total.clone(),
        );
        sub_registry.register(
            "decode_failures",
            "Total number of live feed events that failed to decode",
            metrics.decode_failures_total.clone(),
        );
        metrics
    }
}
