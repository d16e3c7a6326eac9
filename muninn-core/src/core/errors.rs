//! Tagged error kinds for the execution core.
//!
//! Control flow never relies on panics: blocked orders, invalid transitions
//! and transport failures are all values. Only the live-mode kill switch is
//! fatal, and even that surfaces as a variant that the binary turns into an
//! abort at startup.

use crate::core::types::{EventType, OrderState};
use std::fmt;
use thiserror::Error;

/// Classified transport/API error codes, used as the circuit breaker's
/// failure label and the `mm_api_failures_total{code}` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Http429,
    Http500,
    Http502,
    Http503,
    Http504,
    Timeout,
    Refused,
    Reset,
    Connection,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Http429 => "429",
            ErrorCode::Http500 => "500",
            ErrorCode::Http502 => "502",
            ErrorCode::Http503 => "503",
            ErrorCode::Http504 => "504",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Refused => "refused",
            ErrorCode::Reset => "reset",
            ErrorCode::Connection => "connection",
            ErrorCode::Unknown => "unknown",
        }
    }

    /// Whether this code counts as a circuit-breaker failure.
    ///
    /// HTTP 429, 5xx and network-level errors count; plain 4xx rejections
    /// and validation errors do not.
    pub fn is_breaker_failure(&self) -> bool {
        !matches!(self, ErrorCode::Unknown)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an error message into an [`ErrorCode`].
///
/// Ordering matters: more specific substrings are matched first so
/// "connection timed out" classifies as a timeout, not a generic
/// connection error.
pub fn classify_error(message: &str) -> ErrorCode {
    let lower = message.to_lowercase();

    for (needle, code) in [
        ("429", ErrorCode::Http429),
        ("rate limit", ErrorCode::Http429),
        ("500", ErrorCode::Http500),
        ("502", ErrorCode::Http502),
        ("503", ErrorCode::Http503),
        ("504", ErrorCode::Http504),
    ] {
        if lower.contains(needle) {
            return code;
        }
    }

    if lower.contains("timeout") || lower.contains("timed out") {
        ErrorCode::Timeout
    } else if lower.contains("refused") {
        ErrorCode::Refused
    } else if lower.contains("reset") {
        ErrorCode::Reset
    } else if lower.contains("connection") || lower.contains("network") {
        ErrorCode::Connection
    } else {
        ErrorCode::Unknown
    }
}

/// Error kinds surfaced by the execution core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    /// Bad input to a core API. Returned to the caller, never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// FSM transition not in the table.
    #[error("invalid_transition: {client_order_id} {from} + {event}")]
    InvalidTransition {
        client_order_id: String,
        from: OrderState,
        event: EventType,
    },

    /// Pre-trade risk check refused the order.
    #[error("risk blocked: {reason}")]
    RiskBlocked { reason: String },

    /// Maker-only policy refused the order (min_qty / cross_price).
    #[error("policy blocked: {reason}")]
    PolicyBlocked { reason: String },

    /// The exchange acknowledged and rejected the order.
    #[error("exchange reject: {message}")]
    ExchangeReject { message: String },

    /// Timeout / connection error / HTTP 429 / 5xx. Counted by the breaker;
    /// retried only under the router's backoff policy.
    #[error("transient transport error ({code}): {message}")]
    TransientTransport { code: ErrorCode, message: String },

    /// The circuit breaker refused the call outright.
    #[error("circuit open for endpoint {endpoint}")]
    BreakerOpen { endpoint: String },

    /// `try_acquire` on the rate limiter was starved.
    #[error("rate limited on endpoint {endpoint}")]
    RateLimited { endpoint: String },

    /// Order id unknown to the store.
    #[error("order not found: {client_order_id}")]
    StateNotFound { client_order_id: String },

    /// Live-mode kill switch unsatisfied. Aborts startup.
    #[error("live mode not enabled: {0}")]
    LiveModeNotEnabled(String),

    /// Durability layer failure (journal/snapshot IO).
    #[error("state error: {0}")]
    State(String),
}

impl ExecError {
    /// Build a transport error from a raw message, classifying the code.
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        ExecError::TransientTransport {
            code: classify_error(&message),
            message,
        }
    }

    /// Whether the breaker should record this error as a failure.
    pub fn is_breaker_failure(&self) -> bool {
        match self {
            ExecError::TransientTransport { code, .. } => code.is_breaker_failure(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_http_codes() {
        assert_eq!(classify_error("HTTP 429 Too Many Requests"), ErrorCode::Http429);
        assert_eq!(classify_error("rate limit exceeded"), ErrorCode::Http429);
        assert_eq!(classify_error("HTTP 500 Internal Server Error"), ErrorCode::Http500);
        assert_eq!(classify_error("got 502 from upstream"), ErrorCode::Http502);
        assert_eq!(classify_error("503 service unavailable"), ErrorCode::Http503);
        assert_eq!(classify_error("504 gateway timeout"), ErrorCode::Http504);
    }

    #[test]
    fn test_classify_network_errors() {
        assert_eq!(classify_error("request timed out"), ErrorCode::Timeout);
        assert_eq!(classify_error("connection refused"), ErrorCode::Refused);
        assert_eq!(classify_error("connection reset by peer"), ErrorCode::Reset);
        assert_eq!(classify_error("connection closed"), ErrorCode::Connection);
        assert_eq!(classify_error("network unreachable"), ErrorCode::Connection);
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(classify_error("insufficient balance"), ErrorCode::Unknown);
        assert_eq!(classify_error("invalid symbol"), ErrorCode::Unknown);
    }

    #[test]
    fn test_transport_constructor_is_breaker_failure() {
        let err = ExecError::transport("HTTP 429");
        assert!(err.is_breaker_failure());

        let err = ExecError::transport("invalid price");
        // Unknown codes do not trip the breaker
        assert!(!err.is_breaker_failure());

        let err = ExecError::ExchangeReject {
            message: "min notional".to_string(),
        };
        assert!(!err.is_breaker_failure());
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = ExecError::InvalidTransition {
            client_order_id: "CLI00000001".to_string(),
            from: OrderState::Filled,
            event: EventType::CancelAck,
        };
        let msg = err.to_string();
        assert!(msg.contains("invalid_transition"));
        assert!(msg.contains("Filled"));
        assert!(msg.contains("CancelAck"));
    }
}
