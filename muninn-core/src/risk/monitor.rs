//! Runtime risk monitor: pre-trade limits and edge-based auto-freeze.
//!
//! Two ceilings apply before any order leaves the process: per-symbol
//! absolute notional of the hypothetical resulting position (shorting
//! consumes budget too), and total notional across all symbols priced at
//! mark for consistent cross-symbol addition. An edge reading below the
//! freeze threshold trips the frozen flag exactly once; `reset()` clears
//! positions and the flag but counters keep the run's history.

use crate::core::types::Side;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Mark-price resolver injected at construction.
pub type MarkPriceFn = Arc<dyn Fn(&str) -> Decimal + Send + Sync>;

/// Risk limit configuration.
#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub max_inventory_usd_per_symbol: Decimal,
    pub max_total_notional_usd: Decimal,
    pub edge_freeze_threshold_bps: Decimal,
}

/// Outcome of a pre-trade check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskCheck {
    Allowed,
    Blocked(BlockReason),
}

impl RiskCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskCheck::Allowed)
    }
}

/// Why a pre-trade check refused the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// The monitor is frozen; no orders until an explicit reset.
    Frozen,
    /// Resulting per-symbol notional would exceed the inventory ceiling.
    SymbolInventory { symbol: String },
    /// Resulting total notional would exceed the portfolio ceiling.
    TotalNotional,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Frozen => write!(f, "frozen"),
            BlockReason::SymbolInventory { symbol } => {
                write!(f, "inventory limit exceeded for {symbol}")
            }
            BlockReason::TotalNotional => write!(f, "total notional limit exceeded"),
        }
    }
}

struct MonitorState {
    positions: BTreeMap<String, Decimal>,
    last_freeze_reason: Option<String>,
    last_freeze_symbol: Option<String>,
}

/// Runtime risk monitor.
pub struct RuntimeRiskMonitor {
    limits: RiskLimits,
    mark_price: MarkPriceFn,
    state: Mutex<MonitorState>,
    frozen: AtomicBool,
    blocks_total: AtomicU64,
    freezes_total: AtomicU64,
}

impl RuntimeRiskMonitor {
    pub fn new(limits: RiskLimits) -> Self {
        Self::with_mark_price(limits, Arc::new(|_| Decimal::ONE))
    }

    pub fn with_mark_price(limits: RiskLimits, mark_price: MarkPriceFn) -> Self {
        Self {
            limits,
            mark_price,
            state: Mutex::new(MonitorState {
                positions: BTreeMap::new(),
                last_freeze_reason: None,
                last_freeze_symbol: None,
            }),
            frozen: AtomicBool::new(false),
            blocks_total: AtomicU64::new(0),
            freezes_total: AtomicU64::new(0),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn mark_price(&self, symbol: &str) -> Decimal {
        (self.mark_price)(symbol)
    }

    /// Pre-trade check against the frozen flag and both notional ceilings.
    pub fn check_before_order(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal,
        price: Option<Decimal>,
    ) -> RiskCheck {
        if self.is_frozen() {
            self.blocks_total.fetch_add(1, Ordering::Relaxed);
            return RiskCheck::Blocked(BlockReason::Frozen);
        }

        let effective_price = price.unwrap_or_else(|| self.mark_price(symbol));
        let qty_signed = qty * side.sign();

        let state = self.state.lock();
        let current = state.positions.get(symbol).copied().unwrap_or(Decimal::ZERO);
        let new_position = current + qty_signed;

        // Per-symbol ceiling on the ABSOLUTE notional of the resulting
        // position: shorting consumes budget the same way longs do.
        let new_notional = (new_position * effective_price).abs();
        if new_notional > self.limits.max_inventory_usd_per_symbol {
            drop(state);
            self.blocks_total.fetch_add(1, Ordering::Relaxed);
            return RiskCheck::Blocked(BlockReason::SymbolInventory {
                symbol: symbol.to_string(),
            });
        }

        // Total ceiling uses mark prices everywhere so symbols add
        // consistently, the hypothetical position for this one.
        let mut total = (new_position * self.mark_price(symbol)).abs();
        for (sym, pos) in state.positions.iter() {
            if sym != symbol {
                total += (*pos * self.mark_price(sym)).abs();
            }
        }
        drop(state);

        if total > self.limits.max_total_notional_usd {
            self.blocks_total.fetch_add(1, Ordering::Relaxed);
            return RiskCheck::Blocked(BlockReason::TotalNotional);
        }

        RiskCheck::Allowed
    }

    /// Fold a fill into the per-symbol signed position.
    pub fn on_fill(&self, symbol: &str, side: Side, qty: Decimal, _price: Decimal) {
        let mut state = self.state.lock();
        let entry = state
            .positions
            .entry(symbol.to_string())
            .or_insert(Decimal::ZERO);
        *entry += qty * side.sign();
    }

    /// Process an edge reading; freeze when it degrades below threshold.
    pub fn on_edge_update(&self, symbol: &str, net_bps: Decimal) {
        if net_bps < self.limits.edge_freeze_threshold_bps {
            let reason = format!(
                "Edge degradation: {net_bps} BPS < {} BPS",
                self.limits.edge_freeze_threshold_bps
            );
            self.freeze(&reason, Some(symbol));
        }
    }

    /// Freeze trading. The transition fires once: repeated freezes keep the
    /// flag set without re-incrementing the counter, though the recorded
    /// reason tracks the latest trigger.
    pub fn freeze(&self, reason: &str, symbol: Option<&str>) {
        if !self.frozen.swap(true, Ordering::SeqCst) {
            self.freezes_total.fetch_add(1, Ordering::Relaxed);
            warn!(reason, symbol, "risk monitor frozen");
        }
        let mut state = self.state.lock();
        state.last_freeze_reason = Some(reason.to_string());
        state.last_freeze_symbol = symbol.map(str::to_string);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    pub fn positions(&self) -> BTreeMap<String, Decimal> {
        self.state.lock().positions.clone()
    }

    /// Total portfolio notional at mark prices.
    pub fn total_notional(&self) -> Decimal {
        let state = self.state.lock();
        state
            .positions
            .iter()
            .map(|(sym, pos)| (*pos * self.mark_price(sym)).abs())
            .sum()
    }

    pub fn blocks_total(&self) -> u64 {
        self.blocks_total.load(Ordering::Relaxed)
    }

    pub fn freezes_total(&self) -> u64 {
        self.freezes_total.load(Ordering::Relaxed)
    }

    pub fn last_freeze_reason(&self) -> Option<String> {
        self.state.lock().last_freeze_reason.clone()
    }

    pub fn last_freeze_symbol(&self) -> Option<String> {
        self.state.lock().last_freeze_symbol.clone()
    }

    /// Clear positions and the frozen flag. Counters survive: they reflect
    /// the run's history.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.positions.clear();
        state.last_freeze_reason = None;
        state.last_freeze_symbol = None;
        self.frozen.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn monitor() -> RuntimeRiskMonitor {
        RuntimeRiskMonitor::with_mark_price(
            RiskLimits {
                max_inventory_usd_per_symbol: dec!(10000),
                max_total_notional_usd: dec!(15000),
                edge_freeze_threshold_bps: dec!(1.5),
            },
            Arc::new(|symbol| {
                if symbol.contains("BTC") {
                    dec!(50000)
                } else {
                    dec!(3000)
                }
            }),
        )
    }

    #[test]
    fn test_allows_within_limits() {
        let m = monitor();
        let check = m.check_before_order("BTCUSDT", Side::Buy, dec!(0.1), Some(dec!(50000)));
        assert!(check.is_allowed());
        assert_eq!(m.blocks_total(), 0);
    }

    #[test]
    fn test_symbol_inventory_ceiling() {
        let m = monitor();
        // 0.3 BTC * 50000 = 15000 > 10000
        let check = m.check_before_order("BTCUSDT", Side::Buy, dec!(0.3), Some(dec!(50000)));
        assert_eq!(
            check,
            RiskCheck::Blocked(BlockReason::SymbolInventory {
                symbol: "BTCUSDT".to_string()
            })
        );
        assert_eq!(m.blocks_total(), 1);
    }

    #[test]
    fn test_short_consumes_budget() {
        let m = monitor();
        // Selling 0.3 BTC from flat -> |-0.3 * 50000| = 15000 > 10000
        let check = m.check_before_order("BTCUSDT", Side::Sell, dec!(0.3), Some(dec!(50000)));
        assert!(!check.is_allowed());
    }

    #[test]
    fn test_total_notional_across_symbols() {
        let m = monitor();
        m.on_fill("BTCUSDT", Side::Buy, dec!(0.19), dec!(50000)); // 9500 notional

        // ETH order itself within per-symbol limit but total 9500 + 6000 > 15000
        let check = m.check_before_order("ETHUSDT", Side::Buy, dec!(2), Some(dec!(3000)));
        assert_eq!(check, RiskCheck::Blocked(BlockReason::TotalNotional));
    }

    #[test]
    fn test_position_netting_allows_reduction() {
        let m = monitor();
        m.on_fill("BTCUSDT", Side::Buy, dec!(0.19), dec!(50000));
        // Selling reduces the position, so the hypothetical is smaller
        let check = m.check_before_order("BTCUSDT", Side::Sell, dec!(0.1), Some(dec!(50000)));
        assert!(check.is_allowed());
    }

    #[test]
    fn test_edge_freeze_fires_once() {
        let m = monitor();
        assert!(!m.is_frozen());

        m.on_edge_update("BTCUSDT", dec!(1.2));
        assert!(m.is_frozen());
        assert_eq!(m.freezes_total(), 1);
        let reason = m.last_freeze_reason().unwrap();
        assert!(reason.contains("1.2"));
        assert!(reason.contains("1.5"));
        assert_eq!(m.last_freeze_symbol().as_deref(), Some("BTCUSDT"));

        // Second degradation does not re-increment
        m.on_edge_update("ETHUSDT", dec!(0.5));
        assert!(m.is_frozen());
        assert_eq!(m.freezes_total(), 1);
        assert_eq!(m.last_freeze_symbol().as_deref(), Some("ETHUSDT"));
    }

    #[test]
    fn test_edge_at_threshold_does_not_freeze() {
        let m = monitor();
        m.on_edge_update("BTCUSDT", dec!(1.5));
        assert!(!m.is_frozen());
    }

    #[test]
    fn test_frozen_blocks_everything() {
        let m = monitor();
        m.freeze("manual", None);

        let check = m.check_before_order("BTCUSDT", Side::Buy, dec!(0.001), Some(dec!(50000)));
        assert_eq!(check, RiskCheck::Blocked(BlockReason::Frozen));
        assert_eq!(m.blocks_total(), 1);
    }

    #[test]
    fn test_reset_preserves_counters() {
        let m = monitor();
        m.on_fill("BTCUSDT", Side::Buy, dec!(0.1), dec!(50000));
        m.freeze("manual", Some("BTCUSDT"));
        let _ = m.check_before_order("BTCUSDT", Side::Buy, dec!(0.1), None);
        assert_eq!(m.blocks_total(), 1);
        assert_eq!(m.freezes_total(), 1);

        m.reset();
        assert!(!m.is_frozen());
        assert!(m.positions().is_empty());
        assert!(m.last_freeze_reason().is_none());
        // History preserved
        assert_eq!(m.blocks_total(), 1);
        assert_eq!(m.freezes_total(), 1);
    }

    #[test]
    fn test_mark_price_used_when_no_price_given() {
        let m = monitor();
        // 0.3 BTC at mark 50000 = 15000 > 10000, no explicit price passed
        let check = m.check_before_order("BTCUSDT", Side::Buy, dec!(0.3), None);
        assert!(!check.is_allowed());
    }
}
