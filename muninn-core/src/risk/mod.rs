//! Runtime risk: pre-trade limits, edge-based auto-freeze, and position
//! tracking with realized/unrealized PnL.

pub mod monitor;
pub mod positions;

pub use monitor::{BlockReason, MarkPriceFn, RiskCheck, RiskLimits, RuntimeRiskMonitor};
pub use positions::{Position, PositionTracker};
