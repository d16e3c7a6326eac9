//! In-memory order store for tests and shadow runs without durability.
//!
//! Shares the idempotent contract with the durable store; the idem cache
//! lives in the same process map as the orders, so duplicate detection
//! behaves identically, it just does not survive a restart.

use super::{IdempotentResult, OrderStore};
use crate::core::order_fsm;
use crate::core::types::{EventType, FillEvent, Order, OrderEvent, OrderState, Side};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

#[derive(Default)]
struct MemoryInner {
    orders: BTreeMap<String, Order>,
    open: BTreeSet<String>,
    by_symbol: HashMap<String, BTreeSet<String>>,
    idem: HashMap<String, IdempotentResult>,
    fills: Vec<FillEvent>,
    seq: u64,
}

impl MemoryInner {
    fn sync_open_index(&mut self, order: &Order) {
        if order.state.is_open() {
            self.open.insert(order.client_order_id.clone());
        } else {
            self.open.remove(&order.client_order_id);
        }
    }
}

/// In-memory order store.
pub struct MemoryOrderStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                seq: 1,
                ..MemoryInner::default()
            }),
        }
    }

    /// Clear all state including the idempotency cache (for tests).
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        *inner = MemoryInner {
            seq: 1,
            ..MemoryInner::default()
        };
    }
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderStore for MemoryOrderStore {
    fn next_client_order_id(&self) -> String {
        let inner = self.inner.lock();
        format!("CLI{:08}", inner.seq)
    }

    fn place_order(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal,
        price: Decimal,
        idem_key: &str,
        timestamp_ms: i64,
    ) -> IdempotentResult {
        let mut inner = self.inner.lock();
        if let Some(cached) = inner.idem.get(idem_key) {
            debug!(idem_key, "duplicate place_order");
            return cached.as_duplicate();
        }

        let client_order_id = format!("CLI{:08}", inner.seq);
        inner.seq += 1;

        let order = Order::new(client_order_id.clone(), symbol, side, qty, price, timestamp_ms);
        inner.orders.insert(client_order_id.clone(), order.clone());
        inner
            .by_symbol
            .entry(symbol.to_string())
            .or_default()
            .insert(client_order_id.clone());

        let result =
            IdempotentResult::ok(Some(order), format!("Order placed: {client_order_id}"));
        inner.idem.insert(idem_key.to_string(), result.clone());
        result
    }

    fn update_order_state(
        &self,
        client_order_id: &str,
        state: OrderState,
        idem_key: &str,
        timestamp_ms: i64,
        exchange_order_id: Option<&str>,
        message: Option<&str>,
    ) -> IdempotentResult {
        let mut inner = self.inner.lock();
        if let Some(cached) = inner.idem.get(idem_key) {
            return cached.as_duplicate();
        }

        let Some(mut order) = inner.orders.get(client_order_id).cloned() else {
            let result = IdempotentResult::failed(format!("Order not found: {client_order_id}"));
            inner.idem.insert(idem_key.to_string(), result.clone());
            return result;
        };

        let Some(event_type) = order_fsm::event_for(order.state, state) else {
            let result = IdempotentResult::failed(format!(
                "invalid_transition: {client_order_id} {} -> {state}",
                order.state
            ));
            inner.idem.insert(idem_key.to_string(), result.clone());
            return result;
        };

        let mut event = OrderEvent::new(event_type, timestamp_ms);
        event.exchange_order_id = exchange_order_id.map(str::to_string);
        event.reason = message.map(str::to_string);
        if let Err(e) = order_fsm::apply_event(&mut order, event) {
            let result = IdempotentResult::failed(e.to_string());
            inner.idem.insert(idem_key.to_string(), result.clone());
            return result;
        }
        if let Some(msg) = message {
            order.message = Some(msg.to_string());
        }

        inner.sync_open_index(&order);
        inner.orders.insert(client_order_id.to_string(), order.clone());

        let result = IdempotentResult::ok(
            Some(order),
            format!("Order state updated: {client_order_id} -> {state}"),
        );
        inner.idem.insert(idem_key.to_string(), result.clone());
        result
    }

    fn update_fill(
        &self,
        client_order_id: &str,
        filled_qty: Decimal,
        avg_fill_price: Decimal,
        idem_key: &str,
        timestamp_ms: i64,
    ) -> IdempotentResult {
        let mut inner = self.inner.lock();
        if let Some(cached) = inner.idem.get(idem_key) {
            return cached.as_duplicate();
        }

        let Some(mut order) = inner.orders.get(client_order_id).cloned() else {
            let result = IdempotentResult::failed(format!("Order not found: {client_order_id}"));
            inner.idem.insert(idem_key.to_string(), result.clone());
            return result;
        };

        let result = apply_cumulative_fill(
            &mut order,
            filled_qty,
            avg_fill_price,
            timestamp_ms,
        );
        let result = match result {
            Ok(()) => {
                inner.sync_open_index(&order);
                inner.orders.insert(client_order_id.to_string(), order.clone());
                IdempotentResult::ok(
                    Some(order),
                    format!("Fill updated: {client_order_id} {filled_qty}@{avg_fill_price}"),
                )
            }
            Err(message) => IdempotentResult::failed(message),
        };
        inner.idem.insert(idem_key.to_string(), result.clone());
        result
    }

    fn cancel_all_open(&self, idem_key: &str, timestamp_ms: i64) -> IdempotentResult {
        let mut inner = self.inner.lock();
        if let Some(cached) = inner.idem.get(idem_key) {
            return cached.as_duplicate();
        }

        let open_ids: Vec<String> = inner.open.iter().cloned().collect();
        let mut canceled = 0u64;
        for client_order_id in open_ids {
            if let Some(mut order) = inner.orders.get(&client_order_id).cloned() {
                let event = OrderEvent::new(EventType::CancelAck, timestamp_ms);
                if order_fsm::apply_event(&mut order, event).is_ok() {
                    inner.sync_open_index(&order);
                    inner.orders.insert(client_order_id, order);
                    canceled += 1;
                }
            }
        }

        let mut result =
            IdempotentResult::ok(None, format!("Canceled {canceled} open orders"));
        result.count = Some(canceled);
        inner.idem.insert(idem_key.to_string(), result.clone());
        result
    }

    fn get_order(&self, client_order_id: &str) -> Option<Order> {
        self.inner.lock().orders.get(client_order_id).cloned()
    }

    fn get_open_orders(&self) -> Vec<Order> {
        let inner = self.inner.lock();
        inner
            .open
            .iter()
            .filter_map(|id| inner.orders.get(id).cloned())
            .collect()
    }

    fn get_orders_by_symbol(&self, symbol: &str) -> Vec<Order> {
        let inner = self.inner.lock();
        inner
            .by_symbol
            .get(symbol)
            .map(|ids| ids.iter().filter_map(|id| inner.orders.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    fn count_by_state(&self) -> BTreeMap<String, u64> {
        let inner = self.inner.lock();
        let mut counts = BTreeMap::new();
        for order in inner.orders.values() {
            *counts.entry(order.state.as_str().to_string()).or_insert(0) += 1;
        }
        counts
    }

    fn record_fill(&self, fill: &FillEvent) {
        self.inner.lock().fills.push(fill.clone());
    }

    fn all_fills(&self) -> Vec<FillEvent> {
        self.inner.lock().fills.clone()
    }
}

/// Apply a cumulative fill (total filled qty + running average) to an order.
///
/// Shared by both store implementations. Fill progress is only valid on an
/// order in {Open, PartiallyFilled} and may never shrink or overrun `qty`.
pub(crate) fn apply_cumulative_fill(
    order: &mut Order,
    filled_qty: Decimal,
    avg_fill_price: Decimal,
    timestamp_ms: i64,
) -> Result<(), String> {
    if !order.state.is_open() {
        return Err(format!(
            "invalid_transition: {} {} cannot accept fills",
            order.client_order_id, order.state
        ));
    }
    if filled_qty > order.qty {
        return Err(format!(
            "fill {filled_qty} exceeds order qty {} on {}",
            order.qty, order.client_order_id
        ));
    }
    if filled_qty < order.filled_qty {
        return Err(format!(
            "fill progress cannot shrink: {filled_qty} < {} on {}",
            order.filled_qty, order.client_order_id
        ));
    }

    let delta = filled_qty - order.filled_qty;
    let event_type = if filled_qty >= order.qty {
        EventType::FullFill
    } else {
        EventType::PartialFill
    };

    let mut event = OrderEvent::new(event_type, timestamp_ms);
    event.fill_qty = Some(delta);
    event.fill_price = Some(avg_fill_price);

    // State transition is table-driven; fill totals are caller-computed so
    // they are written directly rather than re-derived from the delta.
    let next = order_fsm::next_state(order.state, event_type)
        .ok_or_else(|| format!("invalid_transition: {} {}", order.client_order_id, order.state))?;
    order.state = next;
    order.filled_qty = filled_qty;
    order.avg_fill_price = avg_fill_price;
    order.updated_at_ms = timestamp_ms;
    order.events.push(event);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn place(store: &MemoryOrderStore, idem: &str) -> IdempotentResult {
        store.place_order("BTCUSDT", Side::Buy, dec!(0.01), dec!(50000), idem, 1000)
    }

    #[test]
    fn test_idempotent_place() {
        let store = MemoryOrderStore::new();

        let first = place(&store, "place_001");
        assert!(first.success);
        assert!(!first.was_duplicate);
        assert_eq!(
            first.order.as_ref().unwrap().client_order_id,
            "CLI00000001"
        );

        let second = place(&store, "place_001");
        assert!(second.success);
        assert!(second.was_duplicate);
        assert_eq!(
            second.order.as_ref().unwrap().client_order_id,
            "CLI00000001"
        );

        // Exactly one order exists and the sequence did not advance
        assert_eq!(store.count_by_state().get("Pending"), Some(&1));
        assert_eq!(store.next_client_order_id(), "CLI00000002");
    }

    #[test]
    fn test_ids_are_dense_and_monotonic() {
        let store = MemoryOrderStore::new();
        for i in 1..=3 {
            let result = place(&store, &format!("place_{i:03}"));
            assert_eq!(
                result.order.unwrap().client_order_id,
                format!("CLI{i:08}")
            );
        }
    }

    #[test]
    fn test_update_state_maintains_open_index() {
        let store = MemoryOrderStore::new();
        let cid = place(&store, "p1").order.unwrap().client_order_id;

        assert!(store.get_open_orders().is_empty());

        let result =
            store.update_order_state(&cid, OrderState::Open, "s1", 1001, Some("ORD1"), None);
        assert!(result.success);
        assert_eq!(store.get_open_orders().len(), 1);
        assert_eq!(
            store.get_order(&cid).unwrap().exchange_order_id.as_deref(),
            Some("ORD1")
        );

        let result = store.update_order_state(&cid, OrderState::Canceled, "s2", 1002, None, None);
        assert!(result.success);
        assert!(store.get_open_orders().is_empty());
    }

    #[test]
    fn test_invalid_transition_is_failure_and_idempotent() {
        let store = MemoryOrderStore::new();
        let cid = place(&store, "p1").order.unwrap().client_order_id;

        // Pending -> Filled is not in the table
        let result = store.update_order_state(&cid, OrderState::Filled, "s1", 1001, None, None);
        assert!(!result.success);
        assert!(result.message.contains("invalid_transition"));

        let replay = store.update_order_state(&cid, OrderState::Filled, "s1", 1001, None, None);
        assert!(replay.was_duplicate);
        assert!(!replay.success);
        assert_eq!(store.get_order(&cid).unwrap().state, OrderState::Pending);
    }

    #[test]
    fn test_unknown_order_negative_result_cached() {
        let store = MemoryOrderStore::new();
        let result = store.update_fill("CLI00009999", dec!(1), dec!(50000), "f1", 1000);
        assert!(!result.success);
        assert!(result.message.contains("not found"));

        let replay = store.update_fill("CLI00009999", dec!(1), dec!(50000), "f1", 1000);
        assert!(replay.was_duplicate);
    }

    #[test]
    fn test_fill_progression() {
        let store = MemoryOrderStore::new();
        let cid = place(&store, "p1").order.unwrap().client_order_id;
        store.update_order_state(&cid, OrderState::Open, "s1", 1001, Some("ORD1"), None);

        let result = store.update_fill(&cid, dec!(0.004), dec!(50000), "f1", 1002);
        assert!(result.success);
        let order = result.order.unwrap();
        assert_eq!(order.state, OrderState::PartiallyFilled);
        assert_eq!(order.filled_qty, dec!(0.004));
        // Still open
        assert_eq!(store.get_open_orders().len(), 1);

        let result = store.update_fill(&cid, dec!(0.01), dec!(50100), "f2", 1003);
        assert!(result.success);
        let order = result.order.unwrap();
        assert_eq!(order.state, OrderState::Filled);
        assert_eq!(order.avg_fill_price, dec!(50100));
        assert!(store.get_open_orders().is_empty());
    }

    #[test]
    fn test_overfill_rejected() {
        let store = MemoryOrderStore::new();
        let cid = place(&store, "p1").order.unwrap().client_order_id;
        store.update_order_state(&cid, OrderState::Open, "s1", 1001, None, None);

        let result = store.update_fill(&cid, dec!(0.02), dec!(50000), "f1", 1002);
        assert!(!result.success);
        assert_eq!(store.get_order(&cid).unwrap().filled_qty, Decimal::ZERO);
    }

    #[test]
    fn test_cancel_all_open_idempotent() {
        let store = MemoryOrderStore::new();
        for i in 0..3 {
            let cid = place(&store, &format!("p{i}")).order.unwrap().client_order_id;
            store.update_order_state(&cid, OrderState::Open, &format!("s{i}"), 1001, None, None);
        }
        // One order already terminal
        let cid = place(&store, "p_rejected").order.unwrap().client_order_id;
        store.update_order_state(&cid, OrderState::Rejected, "s_rej", 1001, None, None);

        let result = store.cancel_all_open("cancel_all:freeze_20240101_000000", 1002);
        assert!(result.success);
        assert_eq!(result.count, Some(3));
        assert!(store.get_open_orders().is_empty());
        assert_eq!(store.count_by_state().get("Canceled"), Some(&3));

        let replay = store.cancel_all_open("cancel_all:freeze_20240101_000000", 1003);
        assert!(replay.was_duplicate);
        assert_eq!(replay.count, Some(3));
    }

    #[test]
    fn test_orders_by_symbol() {
        let store = MemoryOrderStore::new();
        place(&store, "p1");
        store.place_order("ETHUSDT", Side::Sell, dec!(1), dec!(3000), "p2", 1000);

        assert_eq!(store.get_orders_by_symbol("BTCUSDT").len(), 1);
        assert_eq!(store.get_orders_by_symbol("ETHUSDT").len(), 1);
        assert!(store.get_orders_by_symbol("SOLUSDT").is_empty());
    }

    #[test]
    fn test_fills_recorded_in_order() {
        let store = MemoryOrderStore::new();
        for i in 0..3 {
            store.record_fill(&FillEvent {
                fill_id: format!("F{i}"),
                exchange_order_id: "ORD1".to_string(),
                client_order_id: "CLI00000001".to_string(),
                symbol: "BTCUSDT".to_string(),
                side: Side::Buy,
                qty: dec!(0.01),
                price: dec!(50000),
                is_maker: true,
                timestamp_ms: i,
            });
        }
        let fills = store.all_fills();
        assert_eq!(fills.len(), 3);
        assert_eq!(fills[0].fill_id, "F0");
        assert_eq!(fills[2].fill_id, "F2");
    }
}
