//! Per-symbol VIP fee profiles.
//!
//! Profiles map symbol -> schedule with a `*` wildcard fallback. The tier
//! tables mirror Bybit-style VIP tiering; the computation that consumes them
//! lives in [`crate::policy::fees`].

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Per-symbol fee profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeProfile {
    pub symbol: String,
    pub maker_bps: Decimal,
    pub taker_bps: Decimal,
    pub maker_rebate_bps: Decimal,
    pub tier_name: String,
}

/// Built-in fee tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeTier {
    Vip0,
    Vip1,
    Vip2,
    Vip3,
    MmTierA,
}

impl FeeTier {
    pub fn name(&self) -> &'static str {
        match self {
            FeeTier::Vip0 => "VIP0",
            FeeTier::Vip1 => "VIP1",
            FeeTier::Vip2 => "VIP2",
            FeeTier::Vip3 => "VIP3",
            FeeTier::MmTierA => "MM_Tier_A",
        }
    }

    /// The tier's wildcard profile.
    pub fn profile(&self) -> FeeProfile {
        let (maker_bps, taker_bps, maker_rebate_bps) = match self {
            FeeTier::Vip0 => (dec!(1.0), dec!(7.0), dec!(0.0)),
            FeeTier::Vip1 => (dec!(0.8), dec!(6.5), dec!(1.0)),
            FeeTier::Vip2 => (dec!(0.5), dec!(5.0), dec!(2.5)),
            FeeTier::Vip3 => (dec!(0.2), dec!(4.0), dec!(3.0)),
            FeeTier::MmTierA => (dec!(0.0), dec!(3.0), dec!(5.0)),
        };
        FeeProfile {
            symbol: "*".to_string(),
            maker_bps,
            taker_bps,
            maker_rebate_bps,
            tier_name: self.name().to_string(),
        }
    }

    /// Convenience map `{"*": profile}` for this tier.
    pub fn profile_map(&self) -> BTreeMap<String, FeeProfile> {
        let mut map = BTreeMap::new();
        map.insert("*".to_string(), self.profile());
        map
    }
}

impl FromStr for FeeTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VIP0" => Ok(FeeTier::Vip0),
            "VIP1" => Ok(FeeTier::Vip1),
            "VIP2" => Ok(FeeTier::Vip2),
            "VIP3" => Ok(FeeTier::Vip3),
            "MM_Tier_A" => Ok(FeeTier::MmTierA),
            other => Err(format!(
                "unknown tier: {other} (valid: VIP0, VIP1, VIP2, VIP3, MM_Tier_A)"
            )),
        }
    }
}

/// Resolve the profile for a symbol: exact match first, `*` wildcard second,
/// `None` when neither exists (the caller falls back to its global schedule).
pub fn profile_for_symbol<'a>(
    symbol: &str,
    profiles: &'a BTreeMap<String, FeeProfile>,
) -> Option<&'a FeeProfile> {
    profiles.get(symbol).or_else(|| profiles.get("*"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_priority() {
        let mut profiles = FeeTier::Vip1.profile_map();
        profiles.insert("BTCUSDT".to_string(), FeeTier::Vip2.profile());

        let hit = profile_for_symbol("BTCUSDT", &profiles).unwrap();
        assert_eq!(hit.tier_name, "VIP2");

        let fallback = profile_for_symbol("ETHUSDT", &profiles).unwrap();
        assert_eq!(fallback.tier_name, "VIP1");
    }

    #[test]
    fn test_no_match_returns_none() {
        let profiles = BTreeMap::new();
        assert!(profile_for_symbol("BTCUSDT", &profiles).is_none());
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("VIP2".parse::<FeeTier>().unwrap(), FeeTier::Vip2);
        assert_eq!("MM_Tier_A".parse::<FeeTier>().unwrap(), FeeTier::MmTierA);
        assert!("VIP9".parse::<FeeTier>().is_err());
    }

    #[test]
    fn test_mm_tier_has_no_maker_fee() {
        let profile = FeeTier::MmTierA.profile();
        assert_eq!(profile.maker_bps, dec!(0.0));
        assert_eq!(profile.maker_rebate_bps, dec!(5.0));
    }
}
