//! Pure pricing and fee policy: post-only quantization, fee/rebate rollups,
//! and per-symbol VIP profiles. No IO, no state, exact decimal arithmetic.

pub mod fees;
pub mod maker;
pub mod profiles;

pub use fees::{calc_fees_and_rebates, FeeSchedule, FeesReport};
pub use profiles::{profile_for_symbol, FeeProfile, FeeTier};
