//! The execution loop: quote -> risk -> maker policy -> placement -> fill
//! ingestion -> freeze/cancel-all -> periodic reconciliation.
//!
//! Single-flight per instance: quote, fill and edge handlers are invoked
//! serially by the caller and the loop spawns nothing internally. All
//! state it touches (store, risk monitor, trackers) sits behind its own
//! lock, so the observability server may read through the same `Arc`s.

use crate::core::errors::ExecError;
use crate::core::types::{OrderState, Quote, Side};
use crate::engine::recon::{reconcile, ReconReport};
use crate::exchange::{ExchangeClient, PlaceOrderRequest, SymbolFiltersCache};
use crate::monitoring::MetricsRegistry;
use crate::policy::fees::FeeSchedule;
use crate::policy::maker;
use crate::policy::profiles::FeeProfile;
use crate::resilience::kill_switch::confirm_live_enable;
use crate::risk::{PositionTracker, RiskCheck, RuntimeRiskMonitor};
use crate::store::OrderStore;
use crate::utils::Clock;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Static configuration of one loop instance.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub maker_only: bool,
    pub post_only_offset_bps: Decimal,
    pub min_qty_pad: Decimal,
    /// Durable store + idempotent replay in effect (reporting only; the
    /// store contract is idempotent either way).
    pub durable_state: bool,
    pub network_enabled: bool,
    pub testnet: bool,
    pub recon_interval_s: i64,
    pub filters_ttl_s: i64,
    pub fee_schedule: Option<FeeSchedule>,
    pub profile_map: Option<BTreeMap<String, FeeProfile>>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            maker_only: true,
            post_only_offset_bps: dec!(1.5),
            min_qty_pad: dec!(1.1),
            durable_state: false,
            network_enabled: false,
            testnet: false,
            recon_interval_s: 60,
            filters_ttl_s: 600,
            fee_schedule: None,
            profile_map: None,
        }
    }
}

/// Per-run parameters.
#[derive(Debug, Clone)]
pub struct ExecutionParams {
    pub symbols: Vec<String>,
    pub iterations: u32,
    pub max_inventory_usd_per_symbol: Decimal,
    pub max_total_notional_usd: Decimal,
    pub edge_freeze_threshold_bps: Decimal,
    pub base_qty: Decimal,
    pub spread_bps: Decimal,
}

impl ExecutionParams {
    pub fn new(symbols: Vec<String>, iterations: u32) -> Self {
        Self {
            symbols,
            iterations,
            max_inventory_usd_per_symbol: dec!(10000),
            max_total_notional_usd: dec!(50000),
            edge_freeze_threshold_bps: dec!(1.5),
            base_qty: dec!(0.01),
            spread_bps: dec!(5.0),
        }
    }
}

/// Run counters surfaced in the report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionStats {
    pub orders_placed: u64,
    pub orders_filled: u64,
    pub orders_rejected: u64,
    pub orders_canceled: u64,
    pub risk_blocks: u64,
    pub orders_blocked: u64,
    pub freeze_events: u64,
    pub recoveries: u64,
    pub duplicate_operations: u64,
    pub recon_runs: u64,
}

/// Single-flight execution orchestrator.
pub struct ExecutionLoop {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn OrderStore>,
    risk: Arc<RuntimeRiskMonitor>,
    positions: PositionTracker,
    filters_cache: SymbolFiltersCache,
    clock: Clock,
    config: ExecutionConfig,
    metrics: Option<MetricsRegistry>,
    stats: Mutex<ExecutionStats>,
    freeze_idem_key: Mutex<Option<String>>,
    last_recon_ms: Mutex<i64>,
    last_recon: Mutex<Option<ReconReport>>,
}

impl ExecutionLoop {
    /// Build a loop instance. Fails when live mode is requested without the
    /// kill-switch consent.
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn OrderStore>,
        risk: Arc<RuntimeRiskMonitor>,
        clock: Clock,
        config: ExecutionConfig,
        metrics: Option<MetricsRegistry>,
    ) -> Result<Self, ExecError> {
        confirm_live_enable(
            config.network_enabled,
            config.testnet,
            None,
            metrics.as_ref(),
        )?;

        if let Some(m) = &metrics {
            m.state()
                .maker_only_enabled
                .set(if config.maker_only { 1.0 } else { 0.0 });
        }

        let filters_cache =
            SymbolFiltersCache::new(clock.clone(), config.filters_ttl_s, metrics.clone());

        Ok(Self {
            exchange,
            store,
            risk,
            positions: PositionTracker::new(),
            filters_cache,
            clock,
            config,
            metrics,
            stats: Mutex::new(ExecutionStats::default()),
            freeze_idem_key: Mutex::new(None),
            last_recon_ms: Mutex::new(0),
            last_recon: Mutex::new(None),
        })
    }

    pub fn risk(&self) -> &Arc<RuntimeRiskMonitor> {
        &self.risk
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn stats(&self) -> ExecutionStats {
        self.stats.lock().clone()
    }

    pub fn last_recon_report(&self) -> Option<ReconReport> {
        self.last_recon.lock().clone()
    }

    /// Handle a market quote: derive a symmetric bid/ask pair around the
    /// midpoint and try to place both sides. Silently a no-op when frozen.
    pub fn on_quote(&self, quote: &Quote, params: &ExecutionParams) {
        if self.risk.is_frozen() {
            debug!(symbol = %quote.symbol, "skipping quote: frozen");
            return;
        }

        let mid = quote.mid();
        self.positions.update_mark_price(&quote.symbol, mid);

        let half_spread = mid * params.spread_bps / dec!(10000) / Decimal::TWO;
        let sides = [
            (Side::Buy, mid - half_spread),
            (Side::Sell, mid + half_spread),
        ];

        for (side, price) in sides {
            match self
                .risk
                .check_before_order(&quote.symbol, side, params.base_qty, Some(price))
            {
                RiskCheck::Allowed => {
                    self.place_order(&quote.symbol, side, params.base_qty, price, quote.bid, quote.ask);
                }
                RiskCheck::Blocked(reason) => {
                    self.stats.lock().risk_blocks += 1;
                    warn!(
                        event = "order_blocked",
                        symbol = %quote.symbol,
                        side = %side,
                        qty = %params.base_qty,
                        price = %price,
                        reason = %reason,
                        block = "risk_limit",
                    );
                    if let Some(m) = &self.metrics {
                        m.execution()
                            .orders_blocked
                            .with_label_values(&[quote.symbol.as_str(), "risk_limit"])
                            .inc();
                    }
                }
            }
        }
    }

    /// The placement path: quantize, post-only check, idempotent store
    /// create, exchange call, store transition.
    fn place_order(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal,
        price: Decimal,
        best_bid: Decimal,
        best_ask: Decimal,
    ) {
        let client_order_id = self.store.next_client_order_id();
        let timestamp_ms = self.clock.now_ms();
        let mut qty = qty;
        let mut price = price;

        if self.config.maker_only {
            let (filters, _source) = self
                .filters_cache
                .get(symbol, || self.exchange.get_symbol_filters(symbol));

            qty = maker::round_qty(qty, filters.step_size);
            let min_required = filters.min_qty * self.config.min_qty_pad;
            if !maker::check_min_qty(qty, min_required) {
                self.block_order(symbol, side, &client_order_id, "min_qty");
                return;
            }

            let ref_price = match side {
                Side::Buy => best_bid,
                Side::Sell => best_ask,
            };
            let adjusted = maker::post_only_price(
                side,
                ref_price,
                self.config.post_only_offset_bps,
                filters.tick_size,
            );

            if maker::crosses_market(side, adjusted, best_bid, best_ask) {
                self.block_order(symbol, side, &client_order_id, "cross_price");
                return;
            }

            if adjusted != price {
                if let Some(m) = &self.metrics {
                    m.execution()
                        .post_only_adjustments
                        .with_label_values(&[symbol, &side.to_string()])
                        .inc();
                }
                debug!(symbol, %side, original = %price, adjusted = %adjusted, "post-only adjustment");
                price = adjusted;
            }
        }

        let idem_key = format!("place:{client_order_id}:{symbol}:v1");
        let result = self
            .store
            .place_order(symbol, side, qty, price, &idem_key, timestamp_ms);

        if result.was_duplicate {
            self.stats.lock().duplicate_operations += 1;
            debug!(%idem_key, "duplicate place detected");
            return;
        }
        if !result.success {
            self.stats.lock().orders_rejected += 1;
            warn!(%client_order_id, message = %result.message, "store refused placement");
            return;
        }

        let request = PlaceOrderRequest {
            client_order_id: client_order_id.clone(),
            symbol: symbol.to_string(),
            side,
            qty,
            price,
        };

        let place_start_ms = self.clock.now_ms();
        match self.exchange.place_limit_order(&request) {
            Ok(resp) if resp.success => {
                let latency_ms = (self.clock.now_ms() - place_start_ms).max(0);
                self.stats.lock().orders_placed += 1;
                info!(
                    event = "order_placed",
                    %client_order_id,
                    symbol,
                    side = %side,
                    qty = %qty,
                    price = %price,
                    latency_ms,
                );
                if let Some(m) = &self.metrics {
                    m.execution().orders_placed.with_label_values(&[symbol]).inc();
                    m.execution()
                        .order_latency_ms
                        .with_label_values(&[symbol])
                        .observe(latency_ms as f64);
                }

                self.store.update_order_state(
                    &client_order_id,
                    OrderState::Open,
                    &format!("state:{client_order_id}:open:v1"),
                    self.clock.now_ms(),
                    resp.exchange_order_id.as_deref(),
                    None,
                );
            }
            Ok(resp) => {
                self.stats.lock().orders_rejected += 1;
                warn!(
                    event = "order_rejected",
                    %client_order_id,
                    symbol,
                    side = %side,
                    reason = resp.message.as_deref().unwrap_or("unknown"),
                );
                if let Some(m) = &self.metrics {
                    m.execution().orders_rejected.with_label_values(&[symbol]).inc();
                }
                self.store.update_order_state(
                    &client_order_id,
                    OrderState::Rejected,
                    &format!("state:{client_order_id}:rejected:v1"),
                    self.clock.now_ms(),
                    None,
                    resp.message.as_deref(),
                );
            }
            Err(err) => {
                // Transport failure counts as a local rejection; retry
                // policy belongs to the router, not the loop.
                self.stats.lock().orders_rejected += 1;
                error!(
                    event = "order_placement_error",
                    %client_order_id,
                    symbol,
                    error = %err,
                );
                if let Some(m) = &self.metrics {
                    m.execution().orders_rejected.with_label_values(&[symbol]).inc();
                }
                self.store.update_order_state(
                    &client_order_id,
                    OrderState::Rejected,
                    &format!("state:{client_order_id}:rejected:v1"),
                    self.clock.now_ms(),
                    None,
                    Some(&err.to_string()),
                );
            }
        }
    }

    fn block_order(&self, symbol: &str, side: Side, client_order_id: &str, reason: &str) {
        self.stats.lock().orders_blocked += 1;
        warn!(
            event = "order_blocked",
            %client_order_id,
            symbol,
            side = %side,
            reason,
        );
        if let Some(m) = &self.metrics {
            m.execution()
                .orders_blocked
                .with_label_values(&[symbol, reason])
                .inc();
        }
    }

    /// Drain pending fills from the adapter into positions and the store.
    pub fn on_fill(&self) {
        while let Some(fill) = self.exchange.next_fill() {
            self.risk
                .on_fill(&fill.symbol, fill.side, fill.qty, fill.price);
            self.positions.apply_fill(&fill);
            self.store.record_fill(&fill);

            // Advance the order's lifecycle when we own it and it is in a
            // fillable state (the open ack always precedes its fills).
            if let Some(order) = self.store.get_order(&fill.client_order_id) {
                if order.state.is_open() {
                    let new_filled = order.filled_qty + fill.qty;
                    let new_avg = if order.filled_qty.is_zero() {
                        fill.price
                    } else {
                        (order.avg_fill_price * order.filled_qty + fill.price * fill.qty)
                            / new_filled
                    };
                    let idem_key =
                        format!("fill:{}:{}:v1", fill.client_order_id, fill.fill_id);
                    self.store.update_fill(
                        &fill.client_order_id,
                        new_filled,
                        new_avg,
                        &idem_key,
                        fill.timestamp_ms,
                    );
                }
            }

            self.stats.lock().orders_filled += 1;
            info!(
                event = "order_filled",
                order_id = %fill.exchange_order_id,
                client_order_id = %fill.client_order_id,
                symbol = %fill.symbol,
                qty = %fill.qty,
                price = %fill.price,
            );
            if let Some(m) = &self.metrics {
                m.execution()
                    .orders_filled
                    .with_label_values(&[fill.symbol.as_str()])
                    .inc();
                let latency = (self.clock.now_ms() - fill.timestamp_ms).max(0);
                m.execution().fill_latency_ms.observe(latency as f64);
            }
        }
    }

    /// Process an edge reading; the not-frozen -> frozen transition fires
    /// cancel-all exactly once under a freeze-scoped idempotency key.
    pub fn on_edge_update(&self, symbol: &str, net_bps: Decimal) {
        let was_frozen = self.risk.is_frozen();
        self.risk.on_edge_update(symbol, net_bps);

        if let Some(m) = &self.metrics {
            if let Some(bps) = net_bps.to_f64() {
                m.risk().edge_bps.with_label_values(&[symbol]).set(bps);
            }
        }

        if !was_frozen && self.risk.is_frozen() {
            self.stats.lock().freeze_events += 1;
            warn!(
                event = "freeze_triggered",
                symbol,
                edge_bps = %net_bps,
                threshold_bps = %self.risk.limits().edge_freeze_threshold_bps,
                reason = "edge_below_threshold",
            );
            if let Some(m) = &self.metrics {
                m.risk().freeze_events.inc();
            }
            self.cancel_all_open_orders("edge_below_threshold");
        }
    }

    /// Cancel all open orders. Exchange cancellation is best-effort; the
    /// store's bulk cancel is the source of truth and is idempotent under
    /// the freeze-scoped key.
    fn cancel_all_open_orders(&self, trigger: &str) {
        let idem_key = {
            let mut key = self.freeze_idem_key.lock();
            key.get_or_insert_with(|| format!("cancel_all:freeze_{}", self.clock.utc_compact()))
                .clone()
        };

        for order in self.store.get_open_orders() {
            if let Err(e) = self
                .exchange
                .cancel_order(&order.client_order_id, &order.symbol)
            {
                debug!(client_order_id = %order.client_order_id, error = %e, "exchange cancel failed");
            }
        }

        let result = self.store.cancel_all_open(&idem_key, self.clock.now_ms());
        if result.was_duplicate {
            self.stats.lock().duplicate_operations += 1;
            info!(%idem_key, "freeze cancel_all was duplicate");
            return;
        }

        let canceled = result.count.unwrap_or(0);
        self.stats.lock().orders_canceled += canceled;
        if let Some(m) = &self.metrics {
            m.execution().orders_canceled.inc_by(canceled);
        }
        info!(
            event = "cancel_all_done",
            canceled_count = canceled,
            %idem_key,
            trigger,
        );
    }

    /// Run reconciliation when the configured interval has elapsed.
    pub fn run_recon_if_due(&self, symbols: &[String]) {
        let now_ms = self.clock.now_ms();
        let interval_ms = self.config.recon_interval_s * 1000;
        {
            let last = self.last_recon_ms.lock();
            if now_ms - *last < interval_ms && *last != 0 {
                return;
            }
        }

        let report = reconcile(
            self.exchange.as_ref(),
            self.store.as_ref(),
            &self.clock,
            symbols,
            self.config.fee_schedule.as_ref(),
            self.config.profile_map.as_ref(),
            self.metrics.as_ref(),
        );

        info!(
            event = "recon_complete",
            divergence_count = report.divergence_count,
            orders_local_only = report.orders_local_only.len(),
            orders_remote_only = report.orders_remote_only.len(),
            position_deltas = report.position_deltas.len(),
        );

        *self.last_recon.lock() = Some(report);
        *self.last_recon_ms.lock() = now_ms;
        self.stats.lock().recon_runs += 1;
    }

    /// Drive N synthetic iterations and return the canonical report.
    pub fn run_shadow(&self, params: &ExecutionParams) -> Value {
        info!(iterations = params.iterations, "starting shadow run");

        for iteration in 0..params.iterations {
            for symbol in &params.symbols {
                let base_price = if symbol.contains("BTC") {
                    dec!(50000)
                } else {
                    dec!(3000)
                };
                // Deterministic per-iteration drift of 0..0.9%
                let variation = Decimal::new((iteration % 10) as i64, 3);
                let mid = base_price * (Decimal::ONE + variation);

                let quote = Quote {
                    symbol: symbol.clone(),
                    bid: mid * dec!(0.9995),
                    ask: mid * dec!(1.0005),
                    timestamp_ms: self.clock.now_ms() + (iteration as i64) * 1000,
                };
                self.on_quote(&quote, params);
            }

            self.on_fill();

            // Edge decays from 10 bps toward 2 bps over the run
            let edge_bps = dec!(10)
                - (Decimal::from(iteration) / Decimal::from(params.iterations)) * dec!(8);
            for symbol in &params.symbols {
                self.on_edge_update(symbol, edge_bps);
            }

            self.run_recon_if_due(&params.symbols);
        }

        self.run_recon_if_due(&params.symbols);
        self.store.save_snapshot();

        self.generate_report(params)
    }

    /// Replay the store's journal after a restart.
    pub fn recover_from_restart(&self) -> Value {
        match self.store.recover_from_snapshot() {
            Ok(recovered) => {
                self.stats.lock().recoveries += 1;
                let open_orders = self.store.get_open_orders();
                info!(
                    recovered,
                    open = open_orders.len(),
                    "recovery complete"
                );
                json!({
                    "recovered": true,
                    "total_orders_recovered": recovered,
                    "open_orders_count": open_orders.len(),
                    "open_orders": open_orders
                        .iter()
                        .map(|o| json!({
                            "client_order_id": o.client_order_id,
                            "symbol": o.symbol,
                            "side": o.side,
                            "qty": o.qty,
                            "price": o.price,
                            "state": o.state,
                        }))
                        .collect::<Vec<_>>(),
                })
            }
            Err(e) => {
                warn!(error = %e, "recovery not available");
                json!({"recovered": false, "reason": e.to_string()})
            }
        }
    }

    /// Canonical report: stable structure, sorted keys at render time,
    /// byte-reproducible under a frozen clock.
    fn generate_report(&self, params: &ExecutionParams) -> Value {
        let stats = self.stats();
        let positions = self.risk.positions();

        let mut net_pos_usd = BTreeMap::new();
        let mut total_notional = Decimal::ZERO;
        for (symbol, qty) in &positions {
            let notional = (*qty * self.risk.mark_price(symbol)).abs();
            net_pos_usd.insert(symbol.clone(), notional);
            total_notional += notional;
        }

        let failed = stats.orders_rejected + stats.risk_blocks + stats.orders_blocked;
        let passed = stats.orders_placed + stats.orders_filled;
        let status = if failed == 0 { "pass" } else { "fail" };

        let total_orders = passed + failed;
        let maker_fill_rate = if total_orders > 0 {
            round4(stats.orders_filled as f64 / total_orders as f64)
        } else {
            0.0
        };
        let risk_ratio = if params.max_total_notional_usd > Decimal::ZERO {
            round4(
                (total_notional / params.max_total_notional_usd)
                    .to_f64()
                    .unwrap_or(0.0),
            )
        } else {
            0.0
        };
        if let Some(m) = &self.metrics {
            m.risk().risk_ratio.set(risk_ratio);
        }

        let mut symbols = params.symbols.clone();
        symbols.sort();

        let pnl: BTreeMap<String, Value> = self
            .positions
            .all_positions()
            .into_iter()
            .map(|(symbol, pos)| {
                (
                    symbol,
                    json!({
                        "avg_entry_price": pos.avg_entry_price,
                        "realized": pos.realized_pnl,
                        "unrealized": pos.unrealized_pnl,
                    }),
                )
            })
            .collect();

        let mut report = json!({
            "timestamp_ms": self.clock.now_ms(),
            "params": {
                "network": if self.config.testnet { "testnet" } else { "mainnet" },
                "symbols": symbols,
                "iterations": params.iterations,
                "maker_only": self.config.maker_only,
                "idempotency_enabled": self.config.durable_state,
                "recon_interval_s": self.config.recon_interval_s,
            },
            "summary": {
                "status": status,
                "passed": passed,
                "failed": failed,
                "warnings": stats.freeze_events,
                "maker_fill_rate": maker_fill_rate,
                "risk_ratio_p95": risk_ratio,
                "latency_p95_ms": 0.0,
            },
            "execution": {
                "iterations": params.iterations,
                "symbols": params.symbols.iter().cloned().collect::<std::collections::BTreeSet<_>>(),
                "idempotency_enabled": self.config.durable_state,
                "maker_only": self.config.maker_only,
                "network_enabled": self.config.network_enabled,
                "testnet": self.config.testnet,
                "recon_interval_s": self.config.recon_interval_s,
            },
            "orders": {
                "placed": stats.orders_placed,
                "filled": stats.orders_filled,
                "rejected": stats.orders_rejected,
                "canceled": stats.orders_canceled,
                "risk_blocks": stats.risk_blocks,
                "blocked": stats.orders_blocked,
            },
            "positions": {
                "by_symbol": positions,
                "net_pos_usd": net_pos_usd,
                "total_notional_usd": total_notional,
                "pnl": pnl,
            },
            "risk": {
                "frozen": self.risk.is_frozen(),
                "freeze_events": stats.freeze_events,
                "last_freeze_reason": self.risk.last_freeze_reason(),
                "last_freeze_symbol": self.risk.last_freeze_symbol(),
                "blocks_total": self.risk.blocks_total(),
                "freezes_total": self.risk.freezes_total(),
            },
            "state": {
                "recoveries": stats.recoveries,
                "duplicate_operations": stats.duplicate_operations,
                "recon_runs": stats.recon_runs,
            },
            "runtime": {
                "utc": self.clock.utc_iso(),
            },
        });

        if let Some(recon) = self.last_recon_report() {
            report["recon"] = serde_json::to_value(&recon).unwrap_or(Value::Null);
        }

        report
    }

    /// Reset run state for tests. The store is left untouched; construct a
    /// fresh one for a clean slate.
    pub fn reset(&self) {
        self.risk.reset();
        self.positions.reset();
        *self.stats.lock() = ExecutionStats::default();
        *self.freeze_idem_key.lock() = None;
        *self.last_recon_ms.lock() = 0;
        *self.last_recon.lock() = None;
        if let Some(m) = &self.metrics {
            m.state()
                .maker_only_enabled
                .set(if self.config.maker_only { 1.0 } else { 0.0 });
        }
    }
}

fn round4(x: f64) -> f64 {
    (x * 10000.0).round() / 10000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::fake::{FakeExchange, FakeExchangeConfig};
    use crate::risk::RiskLimits;
    use crate::store::MemoryOrderStore;

    fn build_loop(fill_rate: f64, reject_rate: f64) -> ExecutionLoop {
        let exchange = Arc::new(FakeExchange::new(
            FakeExchangeConfig {
                fill_rate,
                reject_rate,
                partial_fill_rate: 0.0,
                latency_ms: 0,
                seed: 42,
            },
            Clock::fixed(1_700_000_000_000),
        ));
        let store = Arc::new(MemoryOrderStore::new());
        let risk = Arc::new(RuntimeRiskMonitor::new(RiskLimits {
            max_inventory_usd_per_symbol: dec!(10000),
            max_total_notional_usd: dec!(50000),
            edge_freeze_threshold_bps: dec!(1.5),
        }));
        ExecutionLoop::new(
            exchange,
            store,
            risk,
            Clock::fixed(1_700_000_000_000),
            ExecutionConfig::default(),
            None,
        )
        .unwrap()
    }

    fn quote(symbol: &str) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            bid: dec!(49990),
            ask: dec!(50010),
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_quote_places_both_sides() {
        let exec = build_loop(0.0, 0.0);
        let params = ExecutionParams::new(vec!["BTCUSDT".to_string()], 1);

        exec.on_quote(&quote("BTCUSDT"), &params);

        let stats = exec.stats();
        assert_eq!(stats.orders_placed, 2);
        assert_eq!(stats.orders_rejected, 0);
        // Both orders are open in the store with exchange ids attached
        let open = exec.store().get_open_orders();
        assert_eq!(open.len(), 2);
        assert!(open.iter().all(|o| o.exchange_order_id.is_some()));
    }

    #[test]
    fn test_frozen_quote_is_silent_noop() {
        let exec = build_loop(0.0, 0.0);
        let params = ExecutionParams::new(vec!["BTCUSDT".to_string()], 1);
        exec.risk().freeze("manual", None);

        exec.on_quote(&quote("BTCUSDT"), &params);
        assert_eq!(exec.stats().orders_placed, 0);
        assert_eq!(exec.stats().risk_blocks, 0);
    }

    #[test]
    fn test_fills_advance_store_and_positions() {
        let exec = build_loop(1.0, 0.0);
        let params = ExecutionParams::new(vec!["BTCUSDT".to_string()], 1);

        exec.on_quote(&quote("BTCUSDT"), &params);
        exec.on_fill();

        let stats = exec.stats();
        assert_eq!(stats.orders_placed, 2);
        assert_eq!(stats.orders_filled, 2);

        // Buy and sell filled symmetrically: flat position
        let positions = exec.risk().positions();
        assert_eq!(positions.get("BTCUSDT"), Some(&Decimal::ZERO));

        // Store orders reached Filled through the fill path
        let counts = exec.store().count_by_state();
        assert_eq!(counts.get("Filled"), Some(&2));
    }

    #[test]
    fn test_maker_only_blocks_sub_min_qty() {
        let exec = build_loop(0.0, 0.0);
        let mut params = ExecutionParams::new(vec!["BTCUSDT".to_string()], 1);
        // Below min_qty * pad after step rounding
        params.base_qty = dec!(0.000001);

        exec.on_quote(&quote("BTCUSDT"), &params);

        let stats = exec.stats();
        assert_eq!(stats.orders_placed, 0);
        assert_eq!(stats.orders_blocked, 2);
    }

    #[test]
    fn test_transport_error_rejects_locally() {
        let exchange = Arc::new(FakeExchange::new(
            FakeExchangeConfig {
                fill_rate: 0.0,
                reject_rate: 0.0,
                partial_fill_rate: 0.0,
                latency_ms: 0,
                seed: 42,
            },
            Clock::fixed(1_700_000_000_000),
        ));
        exchange.inject_failures("connection reset", 2);
        let store = Arc::new(MemoryOrderStore::new());
        let risk = Arc::new(RuntimeRiskMonitor::new(RiskLimits {
            max_inventory_usd_per_symbol: dec!(10000),
            max_total_notional_usd: dec!(50000),
            edge_freeze_threshold_bps: dec!(1.5),
        }));
        let exec = ExecutionLoop::new(
            exchange,
            store,
            risk,
            Clock::fixed(1_700_000_000_000),
            ExecutionConfig::default(),
            None,
        )
        .unwrap();

        let params = ExecutionParams::new(vec!["BTCUSDT".to_string()], 1);
        exec.on_quote(&quote("BTCUSDT"), &params);

        let stats = exec.stats();
        assert_eq!(stats.orders_rejected, 2);
        let counts = exec.store().count_by_state();
        assert_eq!(counts.get("Rejected"), Some(&2));
    }

    #[test]
    fn test_shadow_report_shape() {
        let exec = build_loop(0.7, 0.05);
        let params = ExecutionParams::new(vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()], 3);

        let report = exec.run_shadow(&params);

        for key in [
            "execution",
            "orders",
            "params",
            "positions",
            "recon",
            "risk",
            "runtime",
            "state",
            "summary",
            "timestamp_ms",
        ] {
            assert!(report.get(key).is_some(), "missing report key {key}");
        }
        assert_eq!(report["params"]["symbols"][0], "BTCUSDT");
        assert_eq!(report["runtime"]["utc"], "2023-11-14T22:13:20Z");
        // Recon ran at least once (first due check) plus the final pass
        assert!(report["state"]["recon_runs"].as_u64().unwrap() >= 1);
    }

    #[test]
    fn test_live_mode_requires_consent() {
        let exchange = Arc::new(FakeExchange::new(
            FakeExchangeConfig::default(),
            Clock::fixed(0),
        ));
        let store = Arc::new(MemoryOrderStore::new());
        let risk = Arc::new(RuntimeRiskMonitor::new(RiskLimits {
            max_inventory_usd_per_symbol: dec!(1),
            max_total_notional_usd: dec!(1),
            edge_freeze_threshold_bps: dec!(1),
        }));
        let config = ExecutionConfig {
            network_enabled: true,
            testnet: false,
            ..ExecutionConfig::default()
        };
        // MM_LIVE_ENABLE unset in the test environment
        std::env::remove_var(crate::resilience::LIVE_ENABLE_ENV);
        let result = ExecutionLoop::new(exchange, store, risk, Clock::fixed(0), config, None);
        assert!(matches!(result, Err(ExecError::LiveModeNotEnabled(_))));
    }
}
