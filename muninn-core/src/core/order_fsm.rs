//! Order lifecycle state machine.
//!
//! # State Diagram
//!
//! ```text
//!                 ┌─────────┐
//!                 │ Pending │
//!                 └────┬────┘
//!            OrderAck  │  OrderReject
//!          ┌───────────┼───────────┐
//!          ▼                       ▼
//!     ┌────────┐             ┌──────────┐
//!     │  Open  │             │ Rejected │
//!     └───┬────┘             └──────────┘
//!         │                   (terminal)
//!   ┌─────┼──────────────┐
//!   │     │              │
//!   ▼     ▼              ▼
//! ┌──────────────┐  ┌────────┐  ┌──────────┐
//! │PartiallyFill.│  │ Filled │  │ Canceled │
//! └───┬──────────┘  └────────┘  └──────────┘
//!     │ PartialFill  (terminal)  (terminal)
//!     │ FullFill → Filled
//!     │ CancelAck → Canceled
//! ```
//!
//! Invalid transitions are values, not panics: every entry point returns a
//! `Result` so callers can record the failure and keep the order untouched.
//! Partial and full fills update `filled_qty` and recompute
//! `avg_fill_price` as the volume-weighted mean over all fills.

use super::types::{EventType, Order, OrderEvent, OrderState};
use crate::core::errors::ExecError;
use rust_decimal::Decimal;

/// Look up the successor state for `(current, event)`.
///
/// Returns `None` when the transition is not in the table (including every
/// event applied to a terminal state).
pub fn next_state(current: OrderState, event: EventType) -> Option<OrderState> {
    use EventType::*;
    use OrderState::*;
    match (current, event) {
        (Pending, OrderAck) => Some(Open),
        (Pending, OrderReject) => Some(Rejected),
        (Open, PartialFill) => Some(PartiallyFilled),
        (Open, FullFill) => Some(Filled),
        (Open, CancelAck) => Some(Canceled),
        (PartiallyFilled, PartialFill) => Some(PartiallyFilled),
        (PartiallyFilled, FullFill) => Some(Filled),
        (PartiallyFilled, CancelAck) => Some(Canceled),
        _ => None,
    }
}

/// Infer the event that carries `from` to `to`, if any.
///
/// This is how callers that think in target states (the durable store's
/// `update_order_state`) are validated against the same table.
pub fn event_for(from: OrderState, to: OrderState) -> Option<EventType> {
    use EventType::*;
    let candidates = [OrderAck, OrderReject, PartialFill, FullFill, CancelAck];
    candidates
        .into_iter()
        .find(|event| next_state(from, *event) == Some(to))
}

/// Apply an event to an order: validate the transition, advance the state,
/// fold fill quantities into the VWAP, and append to the event history.
pub fn apply_event(order: &mut Order, event: OrderEvent) -> Result<(), ExecError> {
    let new_state = next_state(order.state, event.event_type).ok_or_else(|| {
        ExecError::InvalidTransition {
            client_order_id: order.client_order_id.clone(),
            from: order.state,
            event: event.event_type,
        }
    })?;

    match event.event_type {
        EventType::OrderAck => {
            if let Some(eid) = &event.exchange_order_id {
                order.exchange_order_id = Some(eid.clone());
            }
        }
        EventType::OrderReject => {
            if let Some(reason) = &event.reason {
                order.message = Some(reason.clone());
            }
        }
        EventType::PartialFill | EventType::FullFill => {
            if let (Some(fill_qty), Some(fill_price)) = (event.fill_qty, event.fill_price) {
                apply_fill_to_vwap(order, fill_qty, fill_price)?;
            }
        }
        EventType::CancelAck => {}
    }

    order.state = new_state;
    order.updated_at_ms = event.timestamp_ms;
    order.events.push(event);
    Ok(())
}

/// Fold one fill into cumulative `filled_qty` / `avg_fill_price`.
fn apply_fill_to_vwap(
    order: &mut Order,
    fill_qty: Decimal,
    fill_price: Decimal,
) -> Result<(), ExecError> {
    if fill_qty <= Decimal::ZERO {
        return Err(ExecError::Validation(format!(
            "fill qty must be positive, got {fill_qty}"
        )));
    }
    let new_filled = order.filled_qty + fill_qty;
    if new_filled > order.qty {
        return Err(ExecError::Validation(format!(
            "fill {fill_qty} exceeds remaining {} on {}",
            order.remaining_qty(),
            order.client_order_id
        )));
    }
    order.avg_fill_price = if order.filled_qty.is_zero() {
        fill_price
    } else {
        (order.avg_fill_price * order.filled_qty + fill_price * fill_qty) / new_filled
    };
    order.filled_qty = new_filled;
    Ok(())
}
