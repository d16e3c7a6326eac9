//! Exchange adapters: the narrow client contract the core depends on, a
//! deterministic fake for shadow runs, a dry-run adapter that signs but
//! never sends, a TTL'd symbol-filters cache, and the retrying order
//! router.

pub mod dryrun;
pub mod fake;
pub mod filters;
pub mod router;

use crate::core::errors::ExecError;
use crate::core::types::{FillEvent, OrderState, Side, SymbolFilters};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use dryrun::{DryRunConfig, DryRunExchange};
pub use fake::{FakeExchange, FakeExchangeConfig};
pub use filters::{default_filters, SymbolFiltersCache};
pub use router::{OrderRouter, OrderRouterConfig};

/// Request to place a limit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
}

/// Response from placing an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_order_id: Option<String>,
    pub status: OrderState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// An open order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub exchange_order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub filled_qty: Decimal,
    pub price: Decimal,
    pub status: OrderState,
}

/// The exchange client contract.
///
/// Implementations use interior mutability: the loop, the router and the
/// reconciler all share one adapter behind an `Arc`.
pub trait ExchangeClient: Send + Sync {
    /// Place a limit order. `Err` means transport-level failure; an
    /// exchange-side rejection is an `Ok` response with `success == false`.
    fn place_limit_order(&self, req: &PlaceOrderRequest) -> Result<PlaceOrderResponse, ExecError>;

    /// Cancel an order. Returns whether the exchange accepted the cancel.
    fn cancel_order(&self, client_order_id: &str, symbol: &str) -> Result<bool, ExecError>;

    /// Open orders, optionally filtered by symbol.
    fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OpenOrder>, ExecError>;

    /// Net signed position per symbol.
    fn get_positions(&self) -> Result<BTreeMap<String, Decimal>, ExecError>;

    /// Pull the next pending fill, if any.
    fn next_fill(&self) -> Option<FillEvent>;

    /// Quantization rules for a symbol.
    fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, ExecError>;

    /// Exchange clock in epoch milliseconds.
    fn current_time_ms(&self) -> i64;
}
