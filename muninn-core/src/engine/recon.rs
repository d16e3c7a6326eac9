//! Reconciliation of local orders, fills and positions against exchange
//! truth.
//!
//! Purely observational: the report feeds dashboards and the end-of-run
//! summary, it never mutates store state. Local positions are derived from
//! the store's ingested fills; remote positions come straight from the
//! adapter.

use crate::core::types::FillEvent;
use crate::exchange::ExchangeClient;
use crate::monitoring::MetricsRegistry;
use crate::policy::fees::{calc_fees_and_rebates, FeeSchedule, FeesReport};
use crate::policy::profiles::FeeProfile;
use crate::store::OrderStore;
use crate::utils::Clock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Per-symbol position divergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDelta {
    pub local: Decimal,
    pub remote: Decimal,
    pub delta: Decimal,
}

/// Canonical reconciliation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconReport {
    pub timestamp_ms: i64,
    pub symbols: Vec<String>,
    pub orders_local_only: Vec<String>,
    pub orders_remote_only: Vec<String>,
    pub position_deltas: BTreeMap<String, PositionDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fees_report: Option<FeesReport>,
    pub divergence_count: u64,
}

/// Sum signed fill quantities per symbol.
fn positions_from_fills(fills: &[FillEvent]) -> BTreeMap<String, Decimal> {
    let mut positions: BTreeMap<String, Decimal> = BTreeMap::new();
    for fill in fills {
        *positions.entry(fill.symbol.clone()).or_insert(Decimal::ZERO) += fill.signed_qty();
    }
    positions
}

/// Compare local store state against exchange truth.
pub fn reconcile(
    exchange: &dyn ExchangeClient,
    store: &dyn OrderStore,
    clock: &Clock,
    symbols: &[String],
    fee_schedule: Option<&FeeSchedule>,
    profile_map: Option<&BTreeMap<String, FeeProfile>>,
    metrics: Option<&MetricsRegistry>,
) -> ReconReport {
    let timestamp_ms = clock.now_ms();

    // Order presence: local open set vs exchange-reported open set
    let local_ids: BTreeSet<String> = store
        .get_open_orders()
        .into_iter()
        .map(|o| o.client_order_id)
        .collect();

    let mut remote_ids: BTreeSet<String> = BTreeSet::new();
    for symbol in symbols {
        // A symbol that errors is skipped; presence checks for the others
        // still stand.
        if let Ok(orders) = exchange.get_open_orders(Some(symbol)) {
            remote_ids.extend(orders.into_iter().map(|o| o.client_order_id));
        }
    }

    let orders_local_only: Vec<String> = local_ids.difference(&remote_ids).cloned().collect();
    let orders_remote_only: Vec<String> = remote_ids.difference(&local_ids).cloned().collect();

    // Position deltas: local fills vs exchange positions
    let fills = store.all_fills();
    let local_positions = positions_from_fills(&fills);
    let remote_positions = exchange.get_positions().unwrap_or_default();

    let mut position_deltas = BTreeMap::new();
    let all_symbols: BTreeSet<&String> = local_positions
        .keys()
        .chain(remote_positions.keys())
        .collect();
    for symbol in all_symbols {
        let local = local_positions.get(symbol).copied().unwrap_or(Decimal::ZERO);
        let remote = remote_positions
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if local != remote {
            position_deltas.insert(
                symbol.clone(),
                PositionDelta {
                    local,
                    remote,
                    delta: remote - local,
                },
            );
        }
    }

    // Fees rollup when a schedule is configured
    let fees_report =
        fee_schedule.map(|schedule| calc_fees_and_rebates(&fills, schedule, profile_map));

    let divergence_count =
        (orders_local_only.len() + orders_remote_only.len() + position_deltas.len()) as u64;

    if let Some(metrics) = metrics {
        if !orders_local_only.is_empty() {
            metrics
                .recon()
                .divergences
                .with_label_values(&["orders_local_only"])
                .inc_by(orders_local_only.len() as u64);
        }
        if !orders_remote_only.is_empty() {
            metrics
                .recon()
                .divergences
                .with_label_values(&["orders_remote_only"])
                .inc_by(orders_remote_only.len() as u64);
        }
        if !position_deltas.is_empty() {
            metrics
                .recon()
                .divergences
                .with_label_values(&["position_delta"])
                .inc_by(position_deltas.len() as u64);
        }
        if let Some(fees) = &fees_report {
            if let Some(ratio) = fees.maker_taker_ratio.to_f64() {
                metrics.recon().maker_taker_ratio.set(ratio);
            }
            if let Some(net) = fees.net_bps.to_f64() {
                metrics.recon().net_bps.set(net);
            }
        }
    }

    debug!(divergence_count, "reconciliation complete");

    let mut symbols: Vec<String> = symbols.to_vec();
    symbols.sort();

    ReconReport {
        timestamp_ms,
        symbols,
        orders_local_only,
        orders_remote_only,
        position_deltas,
        fees_report,
        divergence_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderState, Side};
    use crate::exchange::fake::{FakeExchange, FakeExchangeConfig};
    use crate::exchange::PlaceOrderRequest;
    use crate::store::{MemoryOrderStore, OrderStore};
    use rust_decimal_macros::dec;

    fn fill(symbol: &str, side: Side, qty: Decimal) -> FillEvent {
        FillEvent {
            fill_id: "F1".to_string(),
            exchange_order_id: "ORD1".to_string(),
            client_order_id: "CLI00000001".to_string(),
            symbol: symbol.to_string(),
            side,
            qty,
            price: dec!(50000),
            is_maker: true,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_scenario_recon_divergence() {
        // Local store has an open order the exchange does not know; the
        // exchange has an open order and a position the store does not.
        let store = MemoryOrderStore::new();
        let placed = store
            .place_order("BTCUSDT", Side::Buy, dec!(0.01), dec!(50000), "p1", 1000)
            .order
            .unwrap();
        store.update_order_state(
            &placed.client_order_id,
            OrderState::Open,
            "s1",
            1001,
            None,
            None,
        );

        let exchange = FakeExchange::new(
            FakeExchangeConfig {
                fill_rate: 1.0,
                reject_rate: 0.0,
                partial_fill_rate: 0.0,
                latency_ms: 0,
                seed: 42,
            },
            Clock::fixed(1000),
        );
        // Remote BTC position of 0.49 via a filled order the store never saw
        let btc_req = PlaceOrderRequest {
            client_order_id: "remote_fill".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            qty: dec!(0.49),
            price: dec!(50000),
        };
        exchange.place_limit_order(&btc_req).unwrap();
        // Drain the fill so it stays exchange-side only
        while exchange.next_fill().is_some() {}

        let symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
        let report = reconcile(
            &exchange,
            &store,
            &Clock::fixed(2000),
            &symbols,
            None,
            None,
            None,
        );

        assert_eq!(report.orders_local_only, vec![placed.client_order_id]);
        assert!(report.position_deltas.contains_key("BTCUSDT"));
        let delta = &report.position_deltas["BTCUSDT"];
        assert_eq!(delta.local, Decimal::ZERO);
        assert_eq!(delta.remote, dec!(0.49));
        assert_eq!(delta.delta, dec!(0.49));
        assert!(report.divergence_count >= 2);
    }

    #[test]
    fn test_agreement_is_empty_report() {
        let store = MemoryOrderStore::new();
        let exchange = FakeExchange::new(
            FakeExchangeConfig {
                fill_rate: 0.0,
                reject_rate: 0.0,
                ..FakeExchangeConfig::default()
            },
            Clock::fixed(1000),
        );

        let symbols = vec!["BTCUSDT".to_string()];
        let report = reconcile(
            &exchange,
            &store,
            &Clock::fixed(2000),
            &symbols,
            None,
            None,
            None,
        );
        assert_eq!(report.divergence_count, 0);
        assert!(report.orders_local_only.is_empty());
        assert!(report.orders_remote_only.is_empty());
        assert!(report.position_deltas.is_empty());
        assert!(report.fees_report.is_none());
    }

    #[test]
    fn test_matching_fills_produce_no_delta() {
        let store = MemoryOrderStore::new();
        let exchange = FakeExchange::new(
            FakeExchangeConfig {
                fill_rate: 1.0,
                reject_rate: 0.0,
                partial_fill_rate: 0.0,
                latency_ms: 0,
                seed: 42,
            },
            Clock::fixed(1000),
        );
        let req = PlaceOrderRequest {
            client_order_id: "CLI00000001".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            qty: dec!(0.01),
            price: dec!(50000),
        };
        exchange.place_limit_order(&req).unwrap();
        // Store ingests the same fill the exchange produced
        let fill = exchange.next_fill().unwrap();
        store.record_fill(&fill);

        let symbols = vec!["BTCUSDT".to_string()];
        let report = reconcile(
            &exchange,
            &store,
            &Clock::fixed(2000),
            &symbols,
            None,
            None,
            None,
        );
        assert!(report.position_deltas.is_empty());
    }

    #[test]
    fn test_fees_report_attached_when_schedule_given() {
        let store = MemoryOrderStore::new();
        store.record_fill(&fill("BTCUSDT", Side::Buy, dec!(0.1)));
        let exchange = FakeExchange::new(
            FakeExchangeConfig {
                fill_rate: 0.0,
                ..FakeExchangeConfig::default()
            },
            Clock::fixed(1000),
        );

        let schedule = FeeSchedule::new(dec!(1.0), dec!(7.0), dec!(2.0));
        let symbols = vec!["BTCUSDT".to_string()];
        let report = reconcile(
            &exchange,
            &store,
            &Clock::fixed(2000),
            &symbols,
            Some(&schedule),
            None,
            None,
        );

        let fees = report.fees_report.unwrap();
        assert_eq!(fees.gross_notional, dec!(5000));
        assert_eq!(fees.maker_count, 1);
    }

    #[test]
    fn test_divergence_metrics_labelled_by_type() {
        let metrics = MetricsRegistry::new().unwrap();
        let store = MemoryOrderStore::new();
        store.record_fill(&fill("BTCUSDT", Side::Buy, dec!(0.5)));
        let exchange = FakeExchange::new(
            FakeExchangeConfig {
                fill_rate: 0.0,
                ..FakeExchangeConfig::default()
            },
            Clock::fixed(1000),
        );

        let symbols = vec!["BTCUSDT".to_string()];
        let report = reconcile(
            &exchange,
            &store,
            &Clock::fixed(2000),
            &symbols,
            None,
            None,
            Some(&metrics),
        );
        assert_eq!(report.divergence_count, 1);

        let text = metrics.render();
        assert!(text.contains("type=\"position_delta\""));
    }
}
