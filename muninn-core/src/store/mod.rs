//! Order stores: the idempotent lifecycle contract plus in-memory and
//! durable implementations.
//!
//! Every mutating operation takes a caller-supplied idempotency key and
//! follows a two-phase discipline: check the idem cache, then apply and
//! cache atomically under the store's lock. Replaying any operation with
//! the same key returns the cached result flagged `was_duplicate` and
//! mutates nothing.

pub mod durable;
pub mod memory;

use crate::core::types::{FillEvent, Order, OrderState, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use durable::DurableOrderStore;
pub use memory::MemoryOrderStore;

/// Idempotency cache TTL: repeated keys are recognized for 24 hours.
pub const IDEM_TTL_S: i64 = 86_400;

/// Result of an idempotent store operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotentResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    pub was_duplicate: bool,
    pub message: String,
    /// Set by `cancel_all_open`: number of orders canceled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl IdempotentResult {
    pub fn ok(order: Option<Order>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            order,
            was_duplicate: false,
            message: message.into(),
            count: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            order: None,
            was_duplicate: false,
            message: message.into(),
            count: None,
        }
    }

    /// The cached form returned on a duplicate key.
    pub fn as_duplicate(&self) -> Self {
        let mut result = self.clone();
        result.was_duplicate = true;
        result.message = format!("{} (cached)", self.message);
        result
    }
}

/// Lifecycle store contract shared by the in-memory and durable stores.
///
/// The store exclusively owns order lifecycle: the execution loop and
/// reconciliation read and issue commands through it, never mutate orders
/// directly.
pub trait OrderStore: Send + Sync {
    /// Peek the id the next `place_order` will mint (`CLI{seq:08}`).
    ///
    /// The execution loop is single-flight, so the peeked id is the minted
    /// id; a duplicate `place_order` does not consume it.
    fn next_client_order_id(&self) -> String;

    /// Create an order in `Pending` state.
    fn place_order(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal,
        price: Decimal,
        idem_key: &str,
        timestamp_ms: i64,
    ) -> IdempotentResult;

    /// Transition an order to `state`, validated against the FSM table.
    fn update_order_state(
        &self,
        client_order_id: &str,
        state: OrderState,
        idem_key: &str,
        timestamp_ms: i64,
        exchange_order_id: Option<&str>,
        message: Option<&str>,
    ) -> IdempotentResult;

    /// Record cumulative fill progress (`filled_qty` and `avg_fill_price`
    /// are totals, not deltas).
    fn update_fill(
        &self,
        client_order_id: &str,
        filled_qty: Decimal,
        avg_fill_price: Decimal,
        idem_key: &str,
        timestamp_ms: i64,
    ) -> IdempotentResult;

    /// Cancel every order in {Open, PartiallyFilled}; `count` reports how
    /// many were transitioned.
    fn cancel_all_open(&self, idem_key: &str, timestamp_ms: i64) -> IdempotentResult;

    fn get_order(&self, client_order_id: &str) -> Option<Order>;

    /// Orders whose state is in {Open, PartiallyFilled}, sorted by id.
    fn get_open_orders(&self) -> Vec<Order>;

    fn get_orders_by_symbol(&self, symbol: &str) -> Vec<Order>;

    fn count_by_state(&self) -> BTreeMap<String, u64>;

    /// Record an ingested fill for reconciliation.
    fn record_fill(&self, fill: &FillEvent);

    /// All fills ingested this run, in arrival order.
    fn all_fills(&self) -> Vec<FillEvent>;

    /// Replay the journal into live state. Only the durable store supports
    /// this; returns the number of journal lines applied.
    fn recover_from_snapshot(&self) -> Result<u64, crate::core::errors::ExecError> {
        Err(crate::core::errors::ExecError::Validation(
            "recovery requires the durable store".to_string(),
        ))
    }

    /// Dump a consolidated snapshot. Best-effort, never fails.
    fn save_snapshot(&self) {}
}
