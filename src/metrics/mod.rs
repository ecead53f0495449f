//! Prometheus metrics for the subscription engine
//!
//! The engine carries metrics as an optional handle: embeddings that do
//! not scrape simply never attach one and pay nothing per operation.

use prometheus::{IntCounter, IntGauge, Opts, Registry};

/// All engine metrics in one place
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Subscription metrics
    pub subscriptions_current: IntGauge,
    pub shared_subscriptions_current: IntGauge,
    pub subscribe_total: IntCounter,
    pub unsubscribe_total: IntCounter,

    // Routing metrics
    pub publishes_total: IntCounter,
    pub deliveries_total: IntCounter,
    pub delivery_failures_total: IntCounter,
    pub match_cache_hits: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let subscriptions_current = IntGauge::with_opts(Opts::new(
            "routemq_subscriptions_current",
            "Current number of live subscriptions",
        ))
        .unwrap();

        let shared_subscriptions_current = IntGauge::with_opts(Opts::new(
            "routemq_shared_subscriptions_current",
            "Current number of live shared subscriptions",
        ))
        .unwrap();

        let subscribe_total = IntCounter::with_opts(Opts::new(
            "routemq_subscribe_total",
            "Total subscribe operations accepted",
        ))
        .unwrap();

        let unsubscribe_total = IntCounter::with_opts(Opts::new(
            "routemq_unsubscribe_total",
            "Total subscriptions removed by unsubscribe",
        ))
        .unwrap();

        let publishes_total = IntCounter::with_opts(Opts::new(
            "routemq_publishes_total",
            "Total publishes routed through the engine",
        ))
        .unwrap();

        let deliveries_total = IntCounter::with_opts(Opts::new(
            "routemq_deliveries_total",
            "Total deliveries handed to the outbound sink",
        ))
        .unwrap();

        let delivery_failures_total = IntCounter::with_opts(Opts::new(
            "routemq_delivery_failures_total",
            "Total deliveries rejected downstream",
        ))
        .unwrap();

        let match_cache_hits = IntCounter::with_opts(Opts::new(
            "routemq_match_cache_hits_total",
            "Publishes served from the match cache",
        ))
        .unwrap();

        registry
            .register(Box::new(subscriptions_current.clone()))
            .unwrap();
        registry
            .register(Box::new(shared_subscriptions_current.clone()))
            .unwrap();
        registry.register(Box::new(subscribe_total.clone())).unwrap();
        registry
            .register(Box::new(unsubscribe_total.clone()))
            .unwrap();
        registry.register(Box::new(publishes_total.clone())).unwrap();
        registry
            .register(Box::new(deliveries_total.clone()))
            .unwrap();
        registry
            .register(Box::new(delivery_failures_total.clone()))
            .unwrap();
        registry
            .register(Box::new(match_cache_hits.clone()))
            .unwrap();

        Self {
            registry,
            subscriptions_current,
            shared_subscriptions_current,
            subscribe_total,
            unsubscribe_total,
            publishes_total,
            deliveries_total,
            delivery_failures_total,
            match_cache_hits,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_cleanly() {
        let metrics = Metrics::new();
        metrics.subscribe_total.inc();
        metrics.subscriptions_current.set(3);

        let families = metrics.registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "routemq_subscribe_total"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "routemq_subscriptions_current"));
    }
}
