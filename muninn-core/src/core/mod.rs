//! Core domain types, the order lifecycle FSM, and error kinds.

pub mod errors;
pub mod order_fsm;
pub mod types;

pub use errors::{classify_error, ErrorCode, ExecError};
pub use types::{
    EventType, FillEvent, FilterSource, Order, OrderEvent, OrderState, Quote, Side, SymbolFilters,
};
