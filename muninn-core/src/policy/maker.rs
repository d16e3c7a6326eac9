//! Maker-only pricing policy.
//!
//! Pure functions over exact decimal arithmetic. The post-only price is
//! biased away from the opposite side of the book and snapped onto the
//! exchange tick grid: BUY rounds down, SELL rounds up, so quantization can
//! never push a price across the book.

use crate::core::types::Side;
use rust_decimal::Decimal;

const BPS_DENOMINATOR: Decimal = Decimal::from_parts(10000, 0, 0, false, 0);

/// Compute the post-only price: `ref_price -/+ ref_price * offset_bps/10000`,
/// quantized to `tick_size` (BUY down, SELL up).
pub fn post_only_price(
    side: Side,
    ref_price: Decimal,
    offset_bps: Decimal,
    tick_size: Decimal,
) -> Decimal {
    let adjustment = ref_price * offset_bps / BPS_DENOMINATOR;
    match side {
        Side::Buy => {
            let price = ref_price - adjustment;
            (price / tick_size).floor() * tick_size
        }
        Side::Sell => {
            let price = ref_price + adjustment;
            (price / tick_size).ceil() * tick_size
        }
    }
}

/// Floor-quantize a quantity to the exchange step size.
pub fn round_qty(qty: Decimal, step_size: Decimal) -> Decimal {
    (qty / step_size).floor() * step_size
}

/// Minimum-quantity gate.
pub fn check_min_qty(qty: Decimal, min_qty: Decimal) -> bool {
    qty >= min_qty
}

/// Whether a price would take liquidity at placement time.
///
/// Equality counts as crossing: a BUY at exactly best_ask or a SELL at
/// exactly best_bid would execute, which strict maker discipline forbids.
pub fn crosses_market(side: Side, price: Decimal, best_bid: Decimal, best_ask: Decimal) -> bool {
    match side {
        Side::Buy => price >= best_ask,
        Side::Sell => price <= best_bid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_post_only_price_buy_rounds_down() {
        // 50000 - 50000 * 1.5/10000 = 49992.5 -> down to 49992.50 on 0.01 grid
        let price = post_only_price(Side::Buy, dec!(50000), dec!(1.5), dec!(0.01));
        assert_eq!(price, dec!(49992.50));

        // Off-grid result rounds toward zero
        let price = post_only_price(Side::Buy, dec!(100), dec!(3), dec!(0.25));
        // 100 - 0.03 = 99.97 -> 99.75
        assert_eq!(price, dec!(99.75));
    }

    #[test]
    fn test_post_only_price_sell_rounds_up() {
        // 50000 + 7.5 = 50007.5 -> exactly on grid
        let price = post_only_price(Side::Sell, dec!(50000), dec!(1.5), dec!(0.01));
        assert_eq!(price, dec!(50007.50));

        // 100 + 0.03 = 100.03 -> up to 100.25
        let price = post_only_price(Side::Sell, dec!(100), dec!(3), dec!(0.25));
        assert_eq!(price, dec!(100.25));
    }

    #[test]
    fn test_post_only_zero_offset_stays_on_side() {
        let price = post_only_price(Side::Buy, dec!(50000.004), Decimal::ZERO, dec!(0.01));
        assert_eq!(price, dec!(50000.00));
        let price = post_only_price(Side::Sell, dec!(50000.004), Decimal::ZERO, dec!(0.01));
        assert_eq!(price, dec!(50000.01));
    }

    #[test]
    fn test_round_qty_floors() {
        assert_eq!(round_qty(dec!(0.0123456), dec!(0.001)), dec!(0.012));
        assert_eq!(round_qty(dec!(1.5555), dec!(0.01)), dec!(1.55));
        assert_eq!(round_qty(dec!(0.0009), dec!(0.001)), dec!(0.000));
    }

    #[test]
    fn test_check_min_qty() {
        assert!(check_min_qty(dec!(0.01), dec!(0.001)));
        assert!(check_min_qty(dec!(0.001), dec!(0.001)));
        assert!(!check_min_qty(dec!(0.0005), dec!(0.001)));
    }

    #[test]
    fn test_crosses_market_equality_counts() {
        // BUY crosses iff price >= best_ask
        assert!(crosses_market(Side::Buy, dec!(50010), dec!(49990), dec!(50010)));
        assert!(crosses_market(Side::Buy, dec!(50011), dec!(49990), dec!(50010)));
        assert!(!crosses_market(Side::Buy, dec!(50009.99), dec!(49990), dec!(50010)));

        // SELL crosses iff price <= best_bid
        assert!(crosses_market(Side::Sell, dec!(49990), dec!(49990), dec!(50010)));
        assert!(crosses_market(Side::Sell, dec!(49989), dec!(49990), dec!(50010)));
        assert!(!crosses_market(Side::Sell, dec!(49990.01), dec!(49990), dec!(50010)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn decimal_in(lo: i64, hi: i64, scale: u32) -> impl Strategy<Value = Decimal> {
            (lo..hi).prop_map(move |raw| Decimal::new(raw, scale))
        }

        proptest! {
            // Quantized prices are always exact multiples of the tick.
            #[test]
            fn post_only_price_is_on_grid(
                raw_price in decimal_in(1_000_000, 9_000_000_000, 2),
                offset in decimal_in(0, 500, 1),
            ) {
                let tick = Decimal::new(1, 2); // 0.01
                for side in [Side::Buy, Side::Sell] {
                    let price = post_only_price(side, raw_price, offset, tick);
                    prop_assert_eq!(price % tick, Decimal::ZERO);
                }
            }

            // BUY quantization never raises the price, SELL never lowers it.
            #[test]
            fn post_only_bias_is_away_from_opposite_side(
                raw_price in decimal_in(1_000_000, 9_000_000_000, 2),
                offset in decimal_in(0, 500, 1),
            ) {
                let tick = Decimal::new(1, 2);
                let buy = post_only_price(Side::Buy, raw_price, offset, tick);
                let sell = post_only_price(Side::Sell, raw_price, offset, tick);
                prop_assert!(buy <= raw_price);
                prop_assert!(sell >= raw_price);
            }

            // round_qty output is a step multiple and never exceeds the input.
            #[test]
            fn round_qty_is_step_multiple(
                qty in decimal_in(0, 10_000_000, 6),
            ) {
                let step = Decimal::new(1, 3); // 0.001
                let rounded = round_qty(qty, step);
                prop_assert_eq!(rounded % step, Decimal::ZERO);
                prop_assert!(rounded <= qty);
                prop_assert!(qty - rounded < step);
            }
        }
    }
}
