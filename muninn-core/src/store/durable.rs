//! Durable order store: KV-backed state with an append-only disk journal.
//!
//! Layout in the KV layer:
//! - `orders:{cid}`          -> canonical order JSON
//! - `orders:open`           -> set of open order ids
//! - `orders:by_symbol:{s}`  -> set of order ids for symbol
//! - `idem:{key}`            -> cached operation result (24h TTL)
//!
//! Every successful mutation appends the full order as one canonical JSON
//! line to `orders.jsonl` and flushes before the result is returned. On
//! restart `recover_from_snapshot` replays the journal line by line,
//! rebuilds the open and per-symbol indexes, and advances the id sequence
//! past the highest id observed.

use super::memory::apply_cumulative_fill;
use super::{IdempotentResult, OrderStore, IDEM_TTL_S};
use crate::core::errors::ExecError;
use crate::core::order_fsm;
use crate::core::types::{EventType, FillEvent, Order, OrderEvent, OrderState, Side};
use crate::state::kv::MemoryKv;
use crate::state::snapshot::{replay_journal, write_full_snapshot, JournalWriter};
use crate::utils::Clock;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const OPEN_SET: &str = "orders:open";

struct DurableInner {
    seq: u64,
    fills: Vec<FillEvent>,
}

/// Order store backed by a KV layer plus an on-disk journal.
pub struct DurableOrderStore {
    kv: Arc<MemoryKv>,
    journal: JournalWriter,
    snapshot_dir: PathBuf,
    clock: Clock,
    inner: Mutex<DurableInner>,
}

impl DurableOrderStore {
    pub fn new(
        kv: Arc<MemoryKv>,
        snapshot_dir: impl AsRef<Path>,
        clock: Clock,
    ) -> Result<Self, ExecError> {
        let snapshot_dir = snapshot_dir.as_ref().to_path_buf();
        let journal = JournalWriter::open(&snapshot_dir)?;
        Ok(Self {
            kv,
            journal,
            snapshot_dir,
            clock,
            inner: Mutex::new(DurableInner {
                seq: 1,
                fills: Vec::new(),
            }),
        })
    }

    fn order_key(client_order_id: &str) -> String {
        format!("orders:{client_order_id}")
    }

    fn symbol_key(symbol: &str) -> String {
        format!("orders:by_symbol:{symbol}")
    }

    fn idem_key(key: &str) -> String {
        format!("idem:{key}")
    }

    fn cached(&self, idem_key: &str) -> Option<IdempotentResult> {
        self.kv
            .get_json::<IdempotentResult>(&Self::idem_key(idem_key))
            .map(|cached| cached.as_duplicate())
    }

    fn cache_result(&self, idem_key: &str, result: &IdempotentResult) {
        self.kv
            .set(&Self::idem_key(idem_key), result, Some(IDEM_TTL_S));
    }

    fn load_order(&self, client_order_id: &str) -> Option<Order> {
        self.kv.get_json::<Order>(&Self::order_key(client_order_id))
    }

    fn store_order(&self, order: &Order) {
        self.kv.set(&Self::order_key(&order.client_order_id), order, None);
        if order.state.is_open() {
            self.kv.sadd(OPEN_SET, &order.client_order_id);
        } else {
            self.kv.srem(OPEN_SET, &order.client_order_id);
        }
    }

    /// Persist a mutated order: KV write, index sync, journal line. The
    /// journal append must succeed before the mutation is acknowledged.
    fn commit_order(&self, order: &Order) -> Result<(), ExecError> {
        self.store_order(order);
        self.journal.append(order)
    }

    fn all_orders(&self) -> BTreeMap<String, Order> {
        let mut orders = BTreeMap::new();
        let mut cursor = 0;
        loop {
            let (next, keys) = self.kv.scan(cursor, Some("orders:CLI*"), 100);
            for key in keys {
                if let Some(order) = self.kv.get_json::<Order>(&key) {
                    orders.insert(order.client_order_id.clone(), order);
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        orders
    }
}

impl OrderStore for DurableOrderStore {
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
        if let Some(duplicate) = self.cached(idem_key) {
            debug!(idem_key, "duplicate place_order");
            return duplicate;
        }

        let mut inner = self.inner.lock();
        let client_order_id = format!("CLI{:08}", inner.seq);
        inner.seq += 1;

        let order = Order::new(client_order_id.clone(), symbol, side, qty, price, timestamp_ms);
        self.kv
            .sadd(&Self::symbol_key(symbol), &client_order_id);
        if let Err(e) = self.commit_order(&order) {
            // Journal failure: do not cache, the caller may retry.
            warn!(error = %e, client_order_id, "place_order journal append failed");
            return IdempotentResult::failed(e.to_string());
        }

        let result =
            IdempotentResult::ok(Some(order), format!("Order placed: {client_order_id}"));
        self.cache_result(idem_key, &result);
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
        if let Some(duplicate) = self.cached(idem_key) {
            return duplicate;
        }
        let _guard = self.inner.lock();

        let Some(mut order) = self.load_order(client_order_id) else {
            let result = IdempotentResult::failed(format!("Order not found: {client_order_id}"));
            self.cache_result(idem_key, &result);
            return result;
        };

        let Some(event_type) = order_fsm::event_for(order.state, state) else {
            let result = IdempotentResult::failed(format!(
                "invalid_transition: {client_order_id} {} -> {state}",
                order.state
            ));
            self.cache_result(idem_key, &result);
            return result;
        };

        let mut event = OrderEvent::new(event_type, timestamp_ms);
        event.exchange_order_id = exchange_order_id.map(str::to_string);
        event.reason = message.map(str::to_string);
        if let Err(e) = order_fsm::apply_event(&mut order, event) {
            let result = IdempotentResult::failed(e.to_string());
            self.cache_result(idem_key, &result);
            return result;
        }
        if let Some(msg) = message {
            order.message = Some(msg.to_string());
        }

        if let Err(e) = self.commit_order(&order) {
            warn!(error = %e, client_order_id, "update_order_state journal append failed");
            return IdempotentResult::failed(e.to_string());
        }

        let result = IdempotentResult::ok(
            Some(order),
            format!("Order state updated: {client_order_id} -> {state}"),
        );
        self.cache_result(idem_key, &result);
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
        if let Some(duplicate) = self.cached(idem_key) {
            return duplicate;
        }
        let _guard = self.inner.lock();

        let Some(mut order) = self.load_order(client_order_id) else {
            let result = IdempotentResult::failed(format!("Order not found: {client_order_id}"));
            self.cache_result(idem_key, &result);
            return result;
        };

        let result = match apply_cumulative_fill(&mut order, filled_qty, avg_fill_price, timestamp_ms)
        {
            Ok(()) => match self.commit_order(&order) {
                Ok(()) => IdempotentResult::ok(
                    Some(order),
                    format!("Fill updated: {client_order_id} {filled_qty}@{avg_fill_price}"),
                ),
                Err(e) => {
                    warn!(error = %e, client_order_id, "update_fill journal append failed");
                    return IdempotentResult::failed(e.to_string());
                }
            },
            Err(message) => IdempotentResult::failed(message),
        };
        self.cache_result(idem_key, &result);
        result
    }

    fn cancel_all_open(&self, idem_key: &str, timestamp_ms: i64) -> IdempotentResult {
        if let Some(duplicate) = self.cached(idem_key) {
            return duplicate;
        }
        let _guard = self.inner.lock();

        let open_ids = self.kv.smembers(OPEN_SET);
        let mut canceled = 0u64;
        for client_order_id in open_ids {
            let Some(mut order) = self.load_order(&client_order_id) else {
                continue;
            };
            let event = OrderEvent::new(EventType::CancelAck, timestamp_ms);
            if order_fsm::apply_event(&mut order, event).is_err() {
                continue;
            }
            if let Err(e) = self.commit_order(&order) {
                warn!(error = %e, client_order_id, "cancel_all journal append failed");
                return IdempotentResult::failed(e.to_string());
            }
            canceled += 1;
        }

        let mut result = IdempotentResult::ok(None, format!("Canceled {canceled} open orders"));
        result.count = Some(canceled);
        self.cache_result(idem_key, &result);
        result
    }

    fn get_order(&self, client_order_id: &str) -> Option<Order> {
        self.load_order(client_order_id)
    }

    fn get_open_orders(&self) -> Vec<Order> {
        self.kv
            .smembers(OPEN_SET)
            .iter()
            .filter_map(|id| self.load_order(id))
            .collect()
    }

    fn get_orders_by_symbol(&self, symbol: &str) -> Vec<Order> {
        self.kv
            .smembers(&Self::symbol_key(symbol))
            .iter()
            .filter_map(|id| self.load_order(id))
            .collect()
    }

    fn count_by_state(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for order in self.all_orders().values() {
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

    fn recover_from_snapshot(&self) -> Result<u64, ExecError> {
        let lines = replay_journal(&self.snapshot_dir)?;
        let mut inner = self.inner.lock();
        let mut recovered = 0u64;

        for order in lines {
            // Later lines overwrite earlier ones; index membership tracks
            // the line's state so replay reproduces final state in order.
            self.kv
                .sadd(&Self::symbol_key(&order.symbol), &order.client_order_id);
            self.store_order(&order);

            if let Some(raw) = order.client_order_id.strip_prefix("CLI") {
                if let Ok(num) = raw.parse::<u64>() {
                    inner.seq = inner.seq.max(num + 1);
                }
            }
            recovered += 1;
        }

        info!(
            recovered,
            open = self.kv.smembers(OPEN_SET).len(),
            "journal replay complete"
        );
        Ok(recovered)
    }

    fn save_snapshot(&self) {
        write_full_snapshot(&self.snapshot_dir, self.clock.now_ms(), &self.all_orders());
    }
}
