//! Core domain types shared across the execution stack.
//!
//! Everything money-valued is `rust_decimal::Decimal`. Values that enter the
//! system as floats (CLI flags, exchange payloads) are converted through
//! their string form so binary representation artefacts never leak into
//! price or quantity arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Sign applied to fill quantities when aggregating positions.
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(format!("invalid side: {other}")),
        }
    }
}

/// Order lifecycle states.
///
/// `Open` is the exchange's "New" state: acknowledged and resting in the
/// book. Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderState {
    /// Whether the order can still receive fills or cancels.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderState::Open | OrderState::PartiallyFilled)
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Canceled | OrderState::Rejected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Pending => "Pending",
            OrderState::Open => "Open",
            OrderState::PartiallyFilled => "PartiallyFilled",
            OrderState::Filled => "Filled",
            OrderState::Canceled => "Canceled",
            OrderState::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle events that drive state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    OrderAck,
    OrderReject,
    PartialFill,
    FullFill,
    CancelAck,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::OrderAck => "OrderAck",
            EventType::OrderReject => "OrderReject",
            EventType::PartialFill => "PartialFill",
            EventType::FullFill => "FullFill",
            EventType::CancelAck => "CancelAck",
        };
        f.write_str(s)
    }
}

/// One entry in an order's append-only event history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_type: EventType,
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_qty: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_order_id: Option<String>,
}

impl OrderEvent {
    pub fn new(event_type: EventType, timestamp_ms: i64) -> Self {
        Self {
            event_type,
            timestamp_ms,
            fill_qty: None,
            fill_price: None,
            reason: None,
            exchange_order_id: None,
        }
    }
}

/// An order tracked by the store.
///
/// Identified by a locally-minted `client_order_id` (dense `CLI{seq:08}`
/// sequence, stable across restarts via the journal). The exchange id is
/// attached on ack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub state: OrderState,
    pub filled_qty: Decimal,
    pub avg_fill_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_order_id: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub events: Vec<OrderEvent>,
}

impl Order {
    pub fn new(
        client_order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        qty: Decimal,
        price: Decimal,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            symbol: symbol.into(),
            side,
            qty,
            price,
            state: OrderState::Pending,
            filled_qty: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            exchange_order_id: None,
            created_at_ms: timestamp_ms,
            updated_at_ms: timestamp_ms,
            message: None,
            events: Vec::new(),
        }
    }

    pub fn remaining_qty(&self) -> Decimal {
        self.qty - self.filled_qty
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled_qty >= self.qty
    }
}

/// Market quote used by the execution loop to derive a bid/ask pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp_ms: i64,
}

impl Quote {
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

/// Fill event as delivered by an exchange adapter (pull-style).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    /// Exchange-assigned fill id.
    pub fill_id: String,
    /// Exchange-assigned order id.
    pub exchange_order_id: String,
    /// Locally-minted order id, carried so the store can be advanced
    /// without a side mapping table.
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub is_maker: bool,
    pub timestamp_ms: i64,
}

impl FillEvent {
    pub fn notional(&self) -> Decimal {
        self.qty * self.price
    }

    /// Signed position change (positive for buys).
    pub fn signed_qty(&self) -> Decimal {
        self.qty * self.side.sign()
    }
}

/// Exchange quantization rules for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub symbol: String,
    pub tick_size: Decimal,
    pub step_size: Decimal,
    pub min_qty: Decimal,
    pub price_precision: u32,
    pub qty_precision: u32,
}

/// Where a filters lookup was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSource {
    Cached,
    Fetched,
    Stale,
    Default,
}

impl FilterSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterSource::Cached => "cached",
            FilterSource::Fetched => "fetched",
            FilterSource::Stale => "stale",
            FilterSource::Default => "default",
        }
    }
}
