//! Muninn Core - Market-Making Execution Engine
//!
//! Muninn is the execution core of a market-making bot: it turns quotes and
//! edge updates into maker-only limit orders, tracks every order through a
//! lifecycle state machine backed by a durable idempotent store, enforces
//! pre-trade risk limits with edge-based auto-freeze, guards exchange calls
//! behind a circuit breaker and token-bucket rate limiter, and periodically
//! reconciles local truth against exchange truth.
//!
//! ## Core Modules
//! - `core`: domain types, the order FSM, error kinds
//! - `policy`: maker-only pricing, fee/rebate accounting, VIP profiles
//! - `risk`: pre-trade limits, auto-freeze, position/PnL tracking
//! - `resilience`: circuit breaker, rate limiter, backoff, kill switch
//! - `state`: KV store, Redlock lease lock, journal/snapshot writers
//! - `store`: idempotent order stores (in-memory and durable)
//! - `exchange`: adapter contract, fake and dry-run clients, order router
//! - `engine`: the execution loop and reconciliation
//! - `monitoring`: metrics registry and health/ready/metrics server
//!
//! ## Design
//! - Exact decimal arithmetic (`rust_decimal`) for every price, quantity
//!   and bps value; floats cross the boundary through strings only
//! - Every durable artifact is canonical JSON: sorted keys, compact
//!   separators, one trailing newline
//! - Blocked orders and invalid transitions are values, not panics; the
//!   only fatal path is the live-mode kill switch

pub mod config;
pub mod core;
pub mod engine;
pub mod exchange;
pub mod monitoring;
pub mod policy;
pub mod resilience;
pub mod risk;
pub mod state;
pub mod store;
pub mod utils;

// Re-export the types most callers touch
pub use crate::core::{ExecError, FillEvent, Order, OrderState, Quote, Side, SymbolFilters};
pub use engine::{ExecutionConfig, ExecutionLoop, ExecutionParams, ReconReport};
pub use monitoring::MetricsRegistry;
pub use risk::{RiskLimits, RuntimeRiskMonitor};
pub use store::{DurableOrderStore, MemoryOrderStore, OrderStore};
pub use utils::Clock;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::core::{ExecError, FillEvent, Order, OrderState, Quote, Side};
    pub use crate::engine::{ExecutionConfig, ExecutionLoop, ExecutionParams};
    pub use crate::exchange::{ExchangeClient, FakeExchange, FakeExchangeConfig};
    pub use crate::monitoring::MetricsRegistry;
    pub use crate::risk::{RiskLimits, RuntimeRiskMonitor};
    pub use crate::store::{DurableOrderStore, MemoryOrderStore, OrderStore};
    pub use crate::utils::Clock;
}
