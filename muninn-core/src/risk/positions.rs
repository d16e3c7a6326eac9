//! Position tracking with VWAP entry and realized/unrealized PnL.
//!
//! Positions are derived exclusively from fills. Buys that extend a long
//! (or sells that extend a short) re-average the entry price; fills that
//! reduce the position realize PnL on the closed portion; fills that flip
//! through zero realize the whole closed side and re-open at the fill
//! price. Unrealized PnL is recomputed on mark updates.

use crate::core::types::{FillEvent, Side};
use parking_lot::Mutex;
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position record for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Net signed quantity; positive = long.
    pub qty: Decimal,
    /// Volume-weighted average entry price of the open position.
    pub avg_entry_price: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_buy_qty: Decimal,
    pub total_sell_qty: Decimal,
    pub total_buy_notional: Decimal,
    pub total_sell_notional: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_mark_price: Option<Decimal>,
    pub updated_at_ms: i64,
}

impl Position {
    fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            qty: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            total_buy_qty: Decimal::ZERO,
            total_sell_qty: Decimal::ZERO,
            total_buy_notional: Decimal::ZERO,
            total_sell_notional: Decimal::ZERO,
            last_mark_price: None,
            updated_at_ms: 0,
        }
    }

    fn mark(&mut self, mark_price: Decimal) {
        self.last_mark_price = Some(mark_price);
        self.unrealized_pnl = if self.qty.is_zero() {
            Decimal::ZERO
        } else {
            (mark_price - self.avg_entry_price) * self.qty
        };
    }
}

/// Multi-symbol position tracker.
pub struct PositionTracker {
    positions: Mutex<BTreeMap<String, Position>>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            positions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Apply a fill and return the updated position.
    pub fn apply_fill(&self, fill: &FillEvent) -> Position {
        let mut positions = self.positions.lock();
        let pos = positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| Position::new(&fill.symbol));

        match fill.side {
            Side::Buy => {
                pos.total_buy_qty += fill.qty;
                pos.total_buy_notional += fill.notional();
            }
            Side::Sell => {
                pos.total_sell_qty += fill.qty;
                pos.total_sell_notional += fill.notional();
            }
        }

        let old_qty = pos.qty;
        let old_avg = pos.avg_entry_price;
        let signed = fill.signed_qty();
        let new_qty = old_qty + signed;

        let same_direction = old_qty.is_zero() || (old_qty.signum() == signed.signum());
        if same_direction {
            // Extending (or opening): re-average the entry price.
            pos.avg_entry_price = if new_qty.is_zero() {
                Decimal::ZERO
            } else {
                (old_qty.abs() * old_avg + fill.qty * fill.price) / new_qty.abs()
            };
        } else if signed.abs() <= old_qty.abs() {
            // Reducing: realize PnL on the closed portion, entry unchanged.
            let closed = fill.qty.min(old_qty.abs());
            pos.realized_pnl += (fill.price - old_avg) * closed * old_qty.signum();
            if new_qty.is_zero() {
                pos.avg_entry_price = Decimal::ZERO;
            }
        } else {
            // Flipping through zero: realize the whole old side, open the
            // remainder at the fill price.
            pos.realized_pnl += (fill.price - old_avg) * old_qty.abs() * old_qty.signum();
            pos.avg_entry_price = fill.price;
        }

        pos.qty = new_qty;
        pos.updated_at_ms = fill.timestamp_ms;
        if let Some(mark) = pos.last_mark_price {
            pos.mark(mark);
        }
        pos.clone()
    }

    /// Recompute unrealized PnL against a new mark price.
    pub fn update_mark_price(&self, symbol: &str, mark_price: Decimal) -> Option<Position> {
        let mut positions = self.positions.lock();
        let pos = positions.get_mut(symbol)?;
        pos.mark(mark_price);
        Some(pos.clone())
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.positions.lock().get(symbol).cloned()
    }

    pub fn all_positions(&self) -> BTreeMap<String, Position> {
        self.positions.lock().clone()
    }

    pub fn reset(&self) {
        self.positions.lock().clear();
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(side: Side, qty: Decimal, price: Decimal) -> FillEvent {
        FillEvent {
            fill_id: "F".to_string(),
            exchange_order_id: "ORD".to_string(),
            client_order_id: "CLI".to_string(),
            symbol: "BTCUSDT".to_string(),
            side,
            qty,
            price,
            is_maker: true,
            timestamp_ms: 1000,
        }
    }

    #[test]
    fn test_open_long_and_average_up() {
        let tracker = PositionTracker::new();
        tracker.apply_fill(&fill(Side::Buy, dec!(1), dec!(50000)));
        let pos = tracker.apply_fill(&fill(Side::Buy, dec!(1), dec!(52000)));

        assert_eq!(pos.qty, dec!(2));
        assert_eq!(pos.avg_entry_price, dec!(51000));
        assert_eq!(pos.realized_pnl, Decimal::ZERO);
        assert_eq!(pos.total_buy_qty, dec!(2));
        assert_eq!(pos.total_buy_notional, dec!(102000));
    }

    #[test]
    fn test_partial_close_realizes_pnl() {
        let tracker = PositionTracker::new();
        tracker.apply_fill(&fill(Side::Buy, dec!(2), dec!(50000)));
        let pos = tracker.apply_fill(&fill(Side::Sell, dec!(1), dec!(51000)));

        assert_eq!(pos.qty, dec!(1));
        // Entry price of the remaining long is unchanged
        assert_eq!(pos.avg_entry_price, dec!(50000));
        assert_eq!(pos.realized_pnl, dec!(1000));
    }

    #[test]
    fn test_full_close_zeroes_entry() {
        let tracker = PositionTracker::new();
        tracker.apply_fill(&fill(Side::Buy, dec!(1), dec!(50000)));
        let pos = tracker.apply_fill(&fill(Side::Sell, dec!(1), dec!(49000)));

        assert_eq!(pos.qty, Decimal::ZERO);
        assert_eq!(pos.avg_entry_price, Decimal::ZERO);
        assert_eq!(pos.realized_pnl, dec!(-1000));
    }

    #[test]
    fn test_flip_long_to_short() {
        let tracker = PositionTracker::new();
        tracker.apply_fill(&fill(Side::Buy, dec!(1), dec!(50000)));
        let pos = tracker.apply_fill(&fill(Side::Sell, dec!(3), dec!(51000)));

        // Realized on the closed 1.0 long, short 2.0 opened at 51000
        assert_eq!(pos.qty, dec!(-2));
        assert_eq!(pos.avg_entry_price, dec!(51000));
        assert_eq!(pos.realized_pnl, dec!(1000));
    }

    #[test]
    fn test_short_side_pnl() {
        let tracker = PositionTracker::new();
        tracker.apply_fill(&fill(Side::Sell, dec!(2), dec!(50000)));
        let pos = tracker.position("BTCUSDT").unwrap();
        assert_eq!(pos.qty, dec!(-2));
        assert_eq!(pos.avg_entry_price, dec!(50000));

        // Buying back below entry profits a short
        let pos = tracker.apply_fill(&fill(Side::Buy, dec!(1), dec!(49000)));
        assert_eq!(pos.qty, dec!(-1));
        assert_eq!(pos.realized_pnl, dec!(1000));
    }

    #[test]
    fn test_unrealized_pnl_on_mark() {
        let tracker = PositionTracker::new();
        tracker.apply_fill(&fill(Side::Buy, dec!(2), dec!(50000)));

        let pos = tracker.update_mark_price("BTCUSDT", dec!(50500)).unwrap();
        assert_eq!(pos.unrealized_pnl, dec!(1000));

        let pos = tracker.update_mark_price("BTCUSDT", dec!(49500)).unwrap();
        assert_eq!(pos.unrealized_pnl, dec!(-1000));

        assert!(tracker.update_mark_price("ETHUSDT", dec!(3000)).is_none());
    }

    #[test]
    fn test_position_matches_signed_fill_sum() {
        let tracker = PositionTracker::new();
        let fills = [
            fill(Side::Buy, dec!(0.5), dec!(50000)),
            fill(Side::Sell, dec!(0.2), dec!(50100)),
            fill(Side::Buy, dec!(0.1), dec!(49900)),
            fill(Side::Sell, dec!(0.7), dec!(50050)),
        ];
        let mut expected = Decimal::ZERO;
        for f in &fills {
            tracker.apply_fill(f);
            expected += f.signed_qty();
        }
        assert_eq!(tracker.position("BTCUSDT").unwrap().qty, expected);
    }
}
