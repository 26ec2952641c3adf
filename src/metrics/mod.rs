// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order lifecycle
// ============================================================================
//
// Provides metrics for:
// - Order creation (successes, failures by reason)
// - Status transitions (by command and outcome)
// - Operation latency
// - Read retries
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Creation
    pub orders_created: IntCounter,
    pub order_creation_failures: IntCounterVec,

    // Transitions
    pub order_transitions: IntCounterVec,

    // Latency
    pub operation_duration: HistogramVec,

    // Reads
    pub read_retries: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders created from carts")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_creation_failures = IntCounterVec::new(
            Opts::new("order_creation_failures_total", "Order creations that did not produce an order"),
            &["reason"],
        )?;
        registry.register(Box::new(order_creation_failures.clone()))?;

        let order_transitions = IntCounterVec::new(
            Opts::new("order_transitions_total", "Status transitions requested, by outcome"),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(order_transitions.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("order_operation_duration_seconds", "Lifecycle engine operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let read_retries = IntCounterVec::new(
            Opts::new("read_retries_total", "Order read attempts beyond the first"),
            &["operation"],
        )?;
        registry.register(Box::new(read_retries.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_creation_failures,
            order_transitions,
            operation_duration,
            read_retries,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self, duration_secs: f64) {
        self.orders_created.inc();
        self.observe("create_order", duration_secs);
    }

    pub fn record_creation_failure(&self, reason: &str, duration_secs: f64) {
        self.order_creation_failures.with_label_values(&[reason]).inc();
        self.observe("create_order", duration_secs);
    }

    /// `outcome` is one of applied, illegal, not_found, invalid_input, storage_fault
    pub fn record_transition(&self, command: &str, outcome: &str, duration_secs: f64) {
        self.order_transitions.with_label_values(&[command, outcome]).inc();
        self.observe(command, duration_secs);
    }

    pub fn record_read_retry(&self, operation: &str) {
        self.read_retries.with_label_values(&[operation]).inc();
    }

    fn observe(&self, operation: &str, duration_secs: f64) {
        self.operation_duration.with_label_values(&[operation]).observe(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_order_created() {
        let metrics = Metrics::new().unwrap();
        metrics.record_order_created(0.01);
        metrics.record_order_created(0.02);

        assert_eq!(metrics.orders_created.get(), 2);
        let gathered = metrics.registry.gather();
        assert!(gathered.iter().any(|m| m.name() == "orders_created_total"));
    }

    #[test]
    fn test_record_transitions_by_outcome() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transition("pay", "applied", 0.01);
        metrics.record_transition("pay", "illegal", 0.01);
        metrics.record_transition("pay", "illegal", 0.01);

        assert_eq!(metrics.order_transitions.with_label_values(&["pay", "applied"]).get(), 1);
        assert_eq!(metrics.order_transitions.with_label_values(&["pay", "illegal"]).get(), 2);
    }

    #[test]
    fn test_record_creation_failure() {
        let metrics = Metrics::new().unwrap();
        metrics.record_creation_failure("empty_cart", 0.001);

        assert_eq!(metrics.order_creation_failures.with_label_values(&["empty_cart"]).get(), 1);
        assert_eq!(metrics.orders_created.get(), 0);
    }
}
