//! Prometheus metrics for the execution core.
//!
//! One registry per process, injected through construction (no hidden
//! singletons in the hot path). Families are grouped by concern:
//! execution, risk, reconciliation, resilience, and state.

use prometheus::{
    Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Central registry for all Prometheus metrics
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    execution: Arc<ExecutionMetrics>,
    risk: Arc<RiskMetrics>,
    recon: Arc<ReconMetrics>,
    resilience: Arc<ResilienceMetrics>,
    state: Arc<StateMetrics>,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all metric families
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let execution = Arc::new(ExecutionMetrics::new(&registry)?);
        let risk = Arc::new(RiskMetrics::new(&registry)?);
        let recon = Arc::new(ReconMetrics::new(&registry)?);
        let resilience = Arc::new(ResilienceMetrics::new(&registry)?);
        let state = Arc::new(StateMetrics::new(&registry)?);

        Ok(Self {
            registry,
            execution,
            risk,
            recon,
            resilience,
            state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn execution(&self) -> &ExecutionMetrics {
        &self.execution
    }

    pub fn risk(&self) -> &RiskMetrics {
        &self.risk
    }

    pub fn recon(&self) -> &ReconMetrics {
        &self.recon
    }

    pub fn resilience(&self) -> &ResilienceMetrics {
        &self.resilience
    }

    pub fn state(&self) -> &StateMetrics {
        &self.state
    }

    /// Render the registry as Prometheus exposition text.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families).unwrap_or_default()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        // A fresh registry with fixed metric names cannot collide with itself.
        Self::new().expect("metrics registry construction")
    }
}

/// Order flow metrics
pub struct ExecutionMetrics {
    /// Orders successfully placed on the exchange
    pub orders_placed: IntCounterVec,
    /// Fill events ingested
    pub orders_filled: IntCounterVec,
    /// Orders rejected by the exchange or transport
    pub orders_rejected: IntCounterVec,
    /// Orders canceled locally (freeze cancel-all included)
    pub orders_canceled: IntCounter,
    /// Orders blocked before placement, by reason (risk_limit/min_qty/cross_price)
    pub orders_blocked: IntCounterVec,
    /// Post-only price adjustments applied
    pub post_only_adjustments: IntCounterVec,
    /// Wall-time latency of place_limit_order calls
    pub order_latency_ms: HistogramVec,
    /// Latency between fill timestamp and ingestion
    pub fill_latency_ms: Histogram,
}

impl ExecutionMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let orders_placed = IntCounterVec::new(
            Opts::new("orders_placed_total", "Orders successfully placed").namespace("mm"),
            &["symbol"],
        )?;
        registry.register(Box::new(orders_placed.clone()))?;

        let orders_filled = IntCounterVec::new(
            Opts::new("orders_filled_total", "Fill events ingested").namespace("mm"),
            &["symbol"],
        )?;
        registry.register(Box::new(orders_filled.clone()))?;

        let orders_rejected = IntCounterVec::new(
            Opts::new("orders_rejected_total", "Orders rejected at placement").namespace("mm"),
            &["symbol"],
        )?;
        registry.register(Box::new(orders_rejected.clone()))?;

        let orders_canceled = IntCounter::with_opts(
            Opts::new("orders_canceled_total", "Orders canceled locally").namespace("mm"),
        )?;
        registry.register(Box::new(orders_canceled.clone()))?;

        let orders_blocked = IntCounterVec::new(
            Opts::new("orders_blocked_total", "Orders blocked before placement").namespace("mm"),
            &["symbol", "reason"],
        )?;
        registry.register(Box::new(orders_blocked.clone()))?;

        let post_only_adjustments = IntCounterVec::new(
            Opts::new("post_only_adjustments_total", "Post-only price adjustments")
                .namespace("mm"),
            &["symbol", "side"],
        )?;
        registry.register(Box::new(post_only_adjustments.clone()))?;

        let order_latency_ms = HistogramVec::new(
            HistogramOpts::new("order_latency_ms", "Order placement latency in ms")
                .namespace("mm")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0]),
            &["symbol"],
        )?;
        registry.register(Box::new(order_latency_ms.clone()))?;

        let fill_latency_ms = Histogram::with_opts(
            HistogramOpts::new("fill_latency_ms", "Fill ingestion latency in ms")
                .namespace("mm")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0]),
        )?;
        registry.register(Box::new(fill_latency_ms.clone()))?;

        Ok(Self {
            orders_placed,
            orders_filled,
            orders_rejected,
            orders_canceled,
            orders_blocked,
            post_only_adjustments,
            order_latency_ms,
            fill_latency_ms,
        })
    }
}

/// Risk monitor metrics
pub struct RiskMetrics {
    /// Freeze transitions (incremented once per not-frozen -> frozen edge)
    pub freeze_events: IntCounter,
    /// Last observed edge per symbol, in bps
    pub edge_bps: GaugeVec,
    /// Total notional over the total-notional limit, 0.0-1.0
    pub risk_ratio: Gauge,
}

impl RiskMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let freeze_events = IntCounter::with_opts(
            Opts::new("freeze_events_total", "Risk freeze transitions").namespace("mm"),
        )?;
        registry.register(Box::new(freeze_events.clone()))?;

        let edge_bps = GaugeVec::new(
            Opts::new("edge_bps", "Last observed edge in bps").namespace("mm"),
            &["symbol"],
        )?;
        registry.register(Box::new(edge_bps.clone()))?;

        let risk_ratio = Gauge::with_opts(
            Opts::new("risk_ratio", "Total notional / limit").namespace("mm"),
        )?;
        registry.register(Box::new(risk_ratio.clone()))?;

        Ok(Self {
            freeze_events,
            edge_bps,
            risk_ratio,
        })
    }
}

/// Reconciliation metrics
pub struct ReconMetrics {
    /// Divergences found, labelled by type
    pub divergences: IntCounterVec,
    /// Maker notional / gross notional from the last fees rollup
    pub maker_taker_ratio: Gauge,
    /// Net fee cost in bps of gross from the last fees rollup
    pub net_bps: Gauge,
}

impl ReconMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let divergences = IntCounterVec::new(
            Opts::new("recon_divergence_total", "Reconciliation divergences").namespace("mm"),
            &["type"],
        )?;
        registry.register(Box::new(divergences.clone()))?;

        let maker_taker_ratio = Gauge::with_opts(
            Opts::new("maker_taker_ratio", "Maker share of gross notional").namespace("mm"),
        )?;
        registry.register(Box::new(maker_taker_ratio.clone()))?;

        let net_bps = Gauge::with_opts(
            Opts::new("net_bps", "Net fee cost in bps of gross notional").namespace("mm"),
        )?;
        registry.register(Box::new(net_bps.clone()))?;

        Ok(Self {
            divergences,
            maker_taker_ratio,
            net_bps,
        })
    }
}

/// Circuit breaker / rate limiter / retry metrics
pub struct ResilienceMetrics {
    /// API failures by endpoint and classified code
    pub api_failures: IntCounterVec,
    /// Breaker state by endpoint (0=closed, 1=open, 2=half-open)
    pub circuit_state: IntGaugeVec,
    /// Rate limit hits (first wait on an acquire) by endpoint
    pub rate_limit_hits: IntCounterVec,
    /// Rate limiter wait time in ms
    pub rate_limit_wait_ms: HistogramVec,
    /// Placement attempts consumed per routed order
    pub retry_attempts: Histogram,
}

impl ResilienceMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let api_failures = IntCounterVec::new(
            Opts::new("api_failures_total", "API failures by endpoint and code").namespace("mm"),
            &["endpoint", "code"],
        )?;
        registry.register(Box::new(api_failures.clone()))?;

        let circuit_state = IntGaugeVec::new(
            Opts::new("circuit_state", "Breaker state (0=closed,1=open,2=half_open)")
                .namespace("mm"),
            &["endpoint"],
        )?;
        registry.register(Box::new(circuit_state.clone()))?;

        let rate_limit_hits = IntCounterVec::new(
            Opts::new("rate_limit_hits_total", "Rate limiter waits by endpoint").namespace("mm"),
            &["endpoint"],
        )?;
        registry.register(Box::new(rate_limit_hits.clone()))?;

        let rate_limit_wait_ms = HistogramVec::new(
            HistogramOpts::new("rate_limit_wait_ms", "Rate limiter wait time in ms")
                .namespace("mm")
                .buckets(vec![1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0]),
            &["endpoint"],
        )?;
        registry.register(Box::new(rate_limit_wait_ms.clone()))?;

        let retry_attempts = Histogram::with_opts(
            HistogramOpts::new("retry_attempts", "Placement attempts per routed order")
                .namespace("mm")
                .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
        )?;
        registry.register(Box::new(retry_attempts.clone()))?;

        Ok(Self {
            api_failures,
            circuit_state,
            rate_limit_hits,
            rate_limit_wait_ms,
            retry_attempts,
        })
    }
}

/// State / configuration metrics
pub struct StateMetrics {
    /// Symbol filter lookups by source (cached/fetched/stale/default)
    pub symbol_filters_source: IntCounterVec,
    /// Symbol filter fetch errors
    pub symbol_filters_fetch_errors: IntCounter,
    /// 1.0 when maker-only policy is active
    pub maker_only_enabled: Gauge,
    /// 1.0 when live trading consent is in effect
    pub live_enable: Gauge,
}

impl StateMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let symbol_filters_source = IntCounterVec::new(
            Opts::new("symbol_filters_source_total", "Filter lookups by source").namespace("mm"),
            &["source"],
        )?;
        registry.register(Box::new(symbol_filters_source.clone()))?;

        let symbol_filters_fetch_errors = IntCounter::with_opts(
            Opts::new("symbol_filters_fetch_errors_total", "Filter fetch errors").namespace("mm"),
        )?;
        registry.register(Box::new(symbol_filters_fetch_errors.clone()))?;

        let maker_only_enabled = Gauge::with_opts(
            Opts::new("maker_only_enabled", "Maker-only policy active").namespace("mm"),
        )?;
        registry.register(Box::new(maker_only_enabled.clone()))?;

        let live_enable = Gauge::with_opts(
            Opts::new("live_enable", "Live trading consent active").namespace("mm"),
        )?;
        registry.register(Box::new(live_enable.clone()))?;

        Ok(Self {
            symbol_filters_source,
            symbol_filters_fetch_errors,
            maker_only_enabled,
            live_enable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let metrics = MetricsRegistry::new().unwrap();
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_execution_counters() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.execution().orders_placed.with_label_values(&["BTCUSDT"]).inc();
        metrics
            .execution()
            .orders_blocked
            .with_label_values(&["BTCUSDT", "min_qty"])
            .inc();
        metrics.execution().order_latency_ms.with_label_values(&["BTCUSDT"]).observe(12.0);

        let text = metrics.render();
        assert!(text.contains("mm_orders_placed_total"));
        assert!(text.contains("mm_orders_blocked_total"));
        assert!(text.contains("reason=\"min_qty\""));
    }

    #[test]
    fn test_resilience_labels() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics
            .resilience()
            .api_failures
            .with_label_values(&["place_order", "429"])
            .inc();
        metrics.resilience().circuit_state.with_label_values(&["place_order"]).set(1);

        let text = metrics.render();
        assert!(text.contains("mm_api_failures_total"));
        assert!(text.contains("code=\"429\""));
        assert!(text.contains("mm_circuit_state"));
    }

    #[test]
    fn test_filter_source_labels() {
        let metrics = MetricsRegistry::new().unwrap();
        for source in ["cached", "fetched", "stale", "default"] {
            metrics.state().symbol_filters_source.with_label_values(&[source]).inc();
        }
        let text = metrics.render();
        assert!(text.contains("source=\"cached\""));
        assert!(text.contains("source=\"default\""));
    }
}
