//! Order router: retry, dedup and failure isolation around the adapter.
//!
//! Placement runs through the rate limiter, then the endpoint's circuit
//! breaker, then the adapter, with exponential backoff between transient
//! failures (three attempts by default). Exchange rejections are terminal:
//! they do not retry and do not count against the breaker. Duplicate
//! client order ids return the cached response without touching the wire.

use super::{ExchangeClient, PlaceOrderRequest, PlaceOrderResponse};
use crate::core::errors::ExecError;
use crate::monitoring::MetricsRegistry;
use crate::resilience::{
    BackoffConfig, CircuitBreakerConfig, CircuitBreakerRegistry, ExponentialBackoff, RateLimiter,
    RateLimiterConfig,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const PLACE_ENDPOINT: &str = "place_order";
const CANCEL_ENDPOINT: &str = "cancel_order";

/// Router configuration.
#[derive(Debug, Clone)]
pub struct OrderRouterConfig {
    pub breaker: CircuitBreakerConfig,
    pub rate_limiter: RateLimiterConfig,
    pub backoff: BackoffConfig,
}

impl Default for OrderRouterConfig {
    fn default() -> Self {
        Self {
            breaker: CircuitBreakerConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            backoff: BackoffConfig::router(),
        }
    }
}

/// Routing wrapper over an exchange adapter.
pub struct OrderRouter {
    client: Arc<dyn ExchangeClient>,
    breakers: CircuitBreakerRegistry,
    limiter: RateLimiter,
    backoff: BackoffConfig,
    responses: Mutex<HashMap<String, PlaceOrderResponse>>,
    metrics: Option<MetricsRegistry>,
}

impl OrderRouter {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        config: OrderRouterConfig,
        metrics: Option<MetricsRegistry>,
    ) -> Self {
        Self {
            client,
            breakers: CircuitBreakerRegistry::new(config.breaker, metrics.clone()),
            limiter: RateLimiter::with_metrics(config.rate_limiter, metrics.clone()),
            backoff: config.backoff,
            responses: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    pub fn client(&self) -> &Arc<dyn ExchangeClient> {
        &self.client
    }

    /// Place an order with dedup, pacing, breaker guard and capped retry.
    pub fn place_order(&self, req: &PlaceOrderRequest) -> Result<PlaceOrderResponse, ExecError> {
        if let Some(cached) = self.responses.lock().get(&req.client_order_id) {
            debug!(client_order_id = %req.client_order_id, "duplicate route ignored");
            return Ok(cached.clone());
        }

        self.limiter.acquire(PLACE_ENDPOINT, 1);

        let breaker = self.breakers.breaker(PLACE_ENDPOINT);
        let mut backoff = ExponentialBackoff::new(self.backoff.clone());
        let mut attempts = 0u32;

        let result = loop {
            if !breaker.allow_request(false) {
                break Err(ExecError::BreakerOpen {
                    endpoint: PLACE_ENDPOINT.to_string(),
                });
            }

            attempts += 1;
            match self.client.place_limit_order(req) {
                Ok(resp) => {
                    breaker.record_success();
                    break Ok(resp);
                }
                Err(err) => {
                    if err.is_breaker_failure() {
                        if let ExecError::TransientTransport { code, .. } = &err {
                            breaker.record_failure(*code);
                        }
                    }
                    match backoff.next_delay() {
                        Some(delay) if matches!(err, ExecError::TransientTransport { .. }) => {
                            warn!(
                                client_order_id = %req.client_order_id,
                                attempt = attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "transient placement failure, retrying"
                            );
                            std::thread::sleep(delay);
                        }
                        _ => break Err(err),
                    }
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.resilience().retry_attempts.observe(attempts as f64);
        }

        if let Ok(resp) = &result {
            self.responses
                .lock()
                .insert(req.client_order_id.clone(), resp.clone());
        }
        result
    }

    /// Cancel through the cancel endpoint's breaker; no retry, cancels are
    /// best-effort by contract.
    pub fn cancel_order(&self, client_order_id: &str, symbol: &str) -> Result<bool, ExecError> {
        let breaker = self.breakers.breaker(CANCEL_ENDPOINT);
        if !breaker.allow_request(false) {
            return Err(ExecError::BreakerOpen {
                endpoint: CANCEL_ENDPOINT.to_string(),
            });
        }
        self.limiter.acquire(CANCEL_ENDPOINT, 1);

        match self.client.cancel_order(client_order_id, symbol) {
            Ok(accepted) => {
                breaker.record_success();
                Ok(accepted)
            }
            Err(err) => {
                if let ExecError::TransientTransport { code, .. } = &err {
                    if code.is_breaker_failure() {
                        breaker.record_failure(*code);
                    }
                }
                Err(err)
            }
        }
    }

    /// Breaker state for an endpoint (for readiness probes and tests).
    pub fn breaker_state(&self, endpoint: &str) -> crate::resilience::CircuitState {
        self.breakers.breaker(endpoint).state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Side;
    use crate::exchange::fake::{FakeExchange, FakeExchangeConfig};
    use crate::resilience::CircuitState;
    use crate::utils::Clock;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn request(cid: &str) -> PlaceOrderRequest {
        PlaceOrderRequest {
            client_order_id: cid.to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            qty: dec!(0.01),
            price: dec!(50000),
        }
    }

    fn fake() -> Arc<FakeExchange> {
        Arc::new(FakeExchange::new(
            FakeExchangeConfig {
                fill_rate: 0.0,
                reject_rate: 0.0,
                partial_fill_rate: 0.0,
                latency_ms: 0,
                seed: 42,
            },
            Clock::fixed(1000),
        ))
    }

    fn test_config() -> OrderRouterConfig {
        OrderRouterConfig {
            breaker: CircuitBreakerConfig {
                window: Duration::from_secs(60),
                fail_threshold: 3,
                cooldown: Duration::from_millis(200),
                min_dwell: Duration::from_millis(100),
                probe_count: 1,
            },
            rate_limiter: RateLimiterConfig {
                capacity_per_s: 1000.0,
                burst: 1000,
                endpoint_overrides: HashMap::new(),
            },
            backoff: BackoffConfig {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                multiplier: 2.0,
                max_retries: 3,
                jitter_factor: 0.0,
            },
        }
    }

    #[test]
    fn test_successful_route_cached_for_duplicates() {
        let exchange = fake();
        let router = OrderRouter::new(exchange.clone(), test_config(), None);

        let first = router.place_order(&request("CLI00000001")).unwrap();
        assert!(first.success);

        let second = router.place_order(&request("CLI00000001")).unwrap();
        assert_eq!(first, second);
        // Only one order reached the exchange
        assert_eq!(exchange.get_open_orders(None).unwrap().len(), 1);
    }

    #[test]
    fn test_transient_failure_retries_until_success() {
        let exchange = fake();
        exchange.inject_failures("connection reset", 2);
        let router = OrderRouter::new(exchange.clone(), test_config(), None);

        let resp = router.place_order(&request("CLI00000001")).unwrap();
        assert!(resp.success);
        assert_eq!(exchange.get_open_orders(None).unwrap().len(), 1);
    }

    #[test]
    fn test_retries_exhausted_surfaces_transport_error() {
        let exchange = fake();
        exchange.inject_failures("HTTP 503", 10);
        let router = OrderRouter::new(exchange, test_config(), None);

        let err = router.place_order(&request("CLI00000001")).unwrap_err();
        assert!(matches!(err, ExecError::TransientTransport { .. }));
    }

    #[test]
    fn test_breaker_trips_on_429_and_recovers() {
        // Scenario: three 429s trip the breaker; the next call is rejected
        // without touching the adapter; after cooldown a probe closes it.
        let exchange = fake();
        exchange.inject_failures("HTTP 429", 3);
        let mut config = test_config();
        config.backoff.max_retries = 0; // isolate breaker behavior
        let router = OrderRouter::new(exchange.clone(), config, None);

        for i in 0..3 {
            let err = router.place_order(&request(&format!("CLI0000000{i}"))).unwrap_err();
            assert!(matches!(err, ExecError::TransientTransport { .. }));
        }
        assert_eq!(router.breaker_state(PLACE_ENDPOINT), CircuitState::Open);

        // Fourth placement rejected without invoking the adapter
        let err = router.place_order(&request("CLI00000004")).unwrap_err();
        assert!(matches!(err, ExecError::BreakerOpen { .. }));
        assert!(exchange.get_open_orders(None).unwrap().is_empty());

        // After cooldown + dwell a probe is admitted and closes the circuit
        std::thread::sleep(Duration::from_millis(300));
        let resp = router.place_order(&request("CLI00000005")).unwrap();
        assert!(resp.success);
        assert_eq!(router.breaker_state(PLACE_ENDPOINT), CircuitState::Closed);
    }

    #[test]
    fn test_exchange_reject_is_not_breaker_failure() {
        let exchange = Arc::new(FakeExchange::new(
            FakeExchangeConfig {
                reject_rate: 1.0,
                ..FakeExchangeConfig::default()
            },
            Clock::fixed(1000),
        ));
        let router = OrderRouter::new(exchange, test_config(), None);

        for i in 0..5 {
            let resp = router.place_order(&request(&format!("CLI0000000{i}"))).unwrap();
            assert!(!resp.success);
        }
        assert_eq!(router.breaker_state(PLACE_ENDPOINT), CircuitState::Closed);
    }

    #[test]
    fn test_cancel_routes_through_own_breaker() {
        let exchange = fake();
        let router = OrderRouter::new(exchange.clone(), test_config(), None);
        router.place_order(&request("CLI00000001")).unwrap();

        assert!(router.cancel_order("CLI00000001", "BTCUSDT").unwrap());
        assert_eq!(router.breaker_state(CANCEL_ENDPOINT), CircuitState::Closed);
    }
}
