//! Maker/taker fee and rebate accounting.
//!
//! All figures are exact `Decimal`. Fees are positive (cost), rebates are
//! positive (income), net = fees - rebates. The bps figures are relative to
//! gross notional.

use crate::core::types::FillEvent;
use crate::policy::profiles::{profile_for_symbol, FeeProfile};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const BPS_DENOMINATOR: Decimal = Decimal::from_parts(10000, 0, 0, false, 0);

/// Fee schedule in basis points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker_bps: Decimal,
    pub taker_bps: Decimal,
    pub maker_rebate_bps: Decimal,
}

impl FeeSchedule {
    pub fn new(maker_bps: Decimal, taker_bps: Decimal, maker_rebate_bps: Decimal) -> Self {
        Self {
            maker_bps,
            taker_bps,
            maker_rebate_bps,
        }
    }
}

/// Aggregated fee/rebate rollup over a set of fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeesReport {
    pub gross_notional: Decimal,
    pub maker_notional: Decimal,
    pub taker_notional: Decimal,
    pub maker_count: u64,
    pub taker_count: u64,
    pub fees_absolute: Decimal,
    pub rebates_absolute: Decimal,
    pub net_absolute: Decimal,
    pub fees_bps: Decimal,
    pub rebates_bps: Decimal,
    pub net_bps: Decimal,
    pub maker_taker_ratio: Decimal,
}

impl FeesReport {
    pub fn empty() -> Self {
        Self {
            gross_notional: Decimal::ZERO,
            maker_notional: Decimal::ZERO,
            taker_notional: Decimal::ZERO,
            maker_count: 0,
            taker_count: 0,
            fees_absolute: Decimal::ZERO,
            rebates_absolute: Decimal::ZERO,
            net_absolute: Decimal::ZERO,
            fees_bps: Decimal::ZERO,
            rebates_bps: Decimal::ZERO,
            net_bps: Decimal::ZERO,
            maker_taker_ratio: Decimal::ZERO,
        }
    }
}

/// Roll fills up into a [`FeesReport`].
///
/// Per-symbol profiles win over the global schedule when a `profile_map` is
/// provided; the `*` wildcard is the profile-level fallback, and the global
/// schedule covers symbols no profile matches.
pub fn calc_fees_and_rebates(
    fills: &[FillEvent],
    schedule: &FeeSchedule,
    profile_map: Option<&BTreeMap<String, FeeProfile>>,
) -> FeesReport {
    if fills.is_empty() {
        return FeesReport::empty();
    }

    let mut maker_notional = Decimal::ZERO;
    let mut taker_notional = Decimal::ZERO;
    let mut maker_count = 0u64;
    let mut taker_count = 0u64;
    let mut maker_fees = Decimal::ZERO;
    let mut taker_fees = Decimal::ZERO;
    let mut maker_rebates = Decimal::ZERO;

    for fill in fills {
        let notional = fill.notional();
        if fill.is_maker {
            maker_notional += notional;
            maker_count += 1;
        } else {
            taker_notional += notional;
            taker_count += 1;
        }

        let (maker_bps, taker_bps, rebate_bps) = match profile_map
            .and_then(|map| profile_for_symbol(&fill.symbol, map))
        {
            Some(profile) => (profile.maker_bps, profile.taker_bps, profile.maker_rebate_bps),
            None => (
                schedule.maker_bps,
                schedule.taker_bps,
                schedule.maker_rebate_bps,
            ),
        };

        if fill.is_maker {
            maker_fees += notional * maker_bps / BPS_DENOMINATOR;
            maker_rebates += notional * rebate_bps / BPS_DENOMINATOR;
        } else {
            taker_fees += notional * taker_bps / BPS_DENOMINATOR;
        }
    }

    let gross_notional = maker_notional + taker_notional;
    let fees_absolute = maker_fees + taker_fees;
    let rebates_absolute = maker_rebates;
    let net_absolute = fees_absolute - rebates_absolute;

    let (fees_bps, rebates_bps, net_bps, maker_taker_ratio) = if gross_notional > Decimal::ZERO {
        (
            fees_absolute / gross_notional * BPS_DENOMINATOR,
            rebates_absolute / gross_notional * BPS_DENOMINATOR,
            net_absolute / gross_notional * BPS_DENOMINATOR,
            maker_notional / gross_notional,
        )
    } else {
        (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
    };

    FeesReport {
        gross_notional,
        maker_notional,
        taker_notional,
        maker_count,
        taker_count,
        fees_absolute,
        rebates_absolute,
        net_absolute,
        fees_bps,
        rebates_bps,
        net_bps,
        maker_taker_ratio,
    }
}
