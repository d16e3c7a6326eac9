//! Deterministic fake exchange for shadow runs and tests.
//!
//! Behavior is shaped by fill/reject/partial-fill rates driven by a seeded
//! RNG, so a fixed seed reproduces an identical order flow. Fills land in a
//! lock-free queue that `next_fill` drains pull-style. Transport failures
//! can be injected for breaker and router tests.

use super::{ExchangeClient, OpenOrder, PlaceOrderRequest, PlaceOrderResponse};
use crate::core::errors::ExecError;
use crate::core::types::{FillEvent, OrderState, Side, SymbolFilters};
use crate::exchange::filters::default_filters;
use crate::utils::Clock;
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Shaping knobs for the fake exchange.
#[derive(Debug, Clone)]
pub struct FakeExchangeConfig {
    /// Probability an accepted order fills, 0.0-1.0
    pub fill_rate: f64,
    /// Probability an order is rejected outright, 0.0-1.0
    pub reject_rate: f64,
    /// Probability a fill is partial (50-90% of qty), 0.0-1.0
    pub partial_fill_rate: f64,
    /// Simulated call latency in ms (0 disables sleeping)
    pub latency_ms: u64,
    /// RNG seed for reproducible runs
    pub seed: u64,
}

impl Default for FakeExchangeConfig {
    fn default() -> Self {
        Self {
            fill_rate: 0.8,
            reject_rate: 0.05,
            partial_fill_rate: 0.1,
            latency_ms: 0,
            seed: 42,
        }
    }
}

struct FakeInner {
    rng: StdRng,
    order_seq: u64,
    fill_seq: u64,
    orders: HashMap<String, OpenOrder>,
    positions: BTreeMap<String, Decimal>,
    injected_failures: VecDeque<String>,
}

/// Deterministic fake exchange client.
pub struct FakeExchange {
    config: FakeExchangeConfig,
    clock: Clock,
    inner: Mutex<FakeInner>,
    pending_fills: SegQueue<FillEvent>,
}

impl FakeExchange {
    pub fn new(config: FakeExchangeConfig, clock: Clock) -> Self {
        let seed = config.seed;
        Self {
            config,
            clock,
            inner: Mutex::new(FakeInner {
                rng: StdRng::seed_from_u64(seed),
                order_seq: 1,
                fill_seq: 1,
                orders: HashMap::new(),
                positions: BTreeMap::new(),
                injected_failures: VecDeque::new(),
            }),
            pending_fills: SegQueue::new(),
        }
    }

    /// Queue `count` transport failures with the given message; the next
    /// placements consume them before normal processing.
    pub fn inject_failures(&self, message: &str, count: usize) {
        let mut inner = self.inner.lock();
        for _ in 0..count {
            inner.injected_failures.push_back(message.to_string());
        }
    }

    fn schedule_fill(
        &self,
        inner: &mut FakeInner,
        req: &PlaceOrderRequest,
        exchange_order_id: &str,
        qty: Decimal,
    ) {
        let fill = FillEvent {
            fill_id: format!("FIL{:06}", inner.fill_seq),
            exchange_order_id: exchange_order_id.to_string(),
            client_order_id: req.client_order_id.clone(),
            symbol: req.symbol.clone(),
            side: req.side,
            qty,
            price: req.price,
            is_maker: true,
            timestamp_ms: self.clock.now_ms(),
        };
        inner.fill_seq += 1;

        let entry = inner
            .positions
            .entry(req.symbol.clone())
            .or_insert(Decimal::ZERO);
        *entry += qty * req.side.sign();

        self.pending_fills.push(fill);
    }

    /// Reset state keeping the configuration (for tests).
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.rng = StdRng::seed_from_u64(self.config.seed);
        inner.order_seq = 1;
        inner.fill_seq = 1;
        inner.orders.clear();
        inner.positions.clear();
        inner.injected_failures.clear();
        while self.pending_fills.pop().is_some() {}
    }
}

impl ExchangeClient for FakeExchange {
    fn place_limit_order(&self, req: &PlaceOrderRequest) -> Result<PlaceOrderResponse, ExecError> {
        if self.config.latency_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(self.config.latency_ms));
        }

        let mut inner = self.inner.lock();

        if let Some(message) = inner.injected_failures.pop_front() {
            return Err(ExecError::transport(message));
        }

        if inner.rng.gen::<f64>() < self.config.reject_rate {
            return Ok(PlaceOrderResponse {
                success: false,
                exchange_order_id: None,
                status: OrderState::Rejected,
                message: Some("Simulated rejection".to_string()),
            });
        }

        let exchange_order_id = format!("ORD{:06}", inner.order_seq);
        inner.order_seq += 1;

        let mut order = OpenOrder {
            exchange_order_id: exchange_order_id.clone(),
            client_order_id: req.client_order_id.clone(),
            symbol: req.symbol.clone(),
            side: req.side,
            qty: req.qty,
            filled_qty: Decimal::ZERO,
            price: req.price,
            status: OrderState::Open,
        };

        if inner.rng.gen::<f64>() < self.config.fill_rate {
            if inner.rng.gen::<f64>() < self.config.partial_fill_rate {
                // Partial fill of 50-90%
                let pct = 0.5 + inner.rng.gen::<f64>() * 0.4;
                let fill_qty = (req.qty
                    * Decimal::from_f64_retain(pct).unwrap_or(Decimal::ONE))
                .round_dp(8);
                self.schedule_fill(&mut inner, req, &exchange_order_id, fill_qty);
                order.filled_qty = fill_qty;
                order.status = OrderState::PartiallyFilled;
            } else {
                self.schedule_fill(&mut inner, req, &exchange_order_id, req.qty);
                order.filled_qty = req.qty;
                order.status = OrderState::Filled;
            }
        }

        let status = order.status;
        inner.orders.insert(exchange_order_id.clone(), order);

        Ok(PlaceOrderResponse {
            success: true,
            exchange_order_id: Some(exchange_order_id),
            status,
            message: None,
        })
    }

    fn cancel_order(&self, client_order_id: &str, _symbol: &str) -> Result<bool, ExecError> {
        let mut inner = self.inner.lock();
        let Some(order) = inner
            .orders
            .values_mut()
            .find(|o| o.client_order_id == client_order_id)
        else {
            return Ok(false);
        };
        if order.status.is_terminal() {
            return Ok(false);
        }
        order.status = OrderState::Canceled;
        Ok(true)
    }

    fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OpenOrder>, ExecError> {
        let inner = self.inner.lock();
        let mut orders: Vec<OpenOrder> = inner
            .orders
            .values()
            .filter(|o| o.status.is_open())
            .filter(|o| symbol.map_or(true, |s| o.symbol == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.exchange_order_id.cmp(&b.exchange_order_id));
        Ok(orders)
    }

    fn get_positions(&self) -> Result<BTreeMap<String, Decimal>, ExecError> {
        let inner = self.inner.lock();
        Ok(inner
            .positions
            .iter()
            .filter(|(_, qty)| !qty.is_zero())
            .map(|(s, q)| (s.clone(), *q))
            .collect())
    }

    fn next_fill(&self) -> Option<FillEvent> {
        self.pending_fills.pop()
    }

    fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, ExecError> {
        Ok(default_filters(symbol))
    }

    fn current_time_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}
