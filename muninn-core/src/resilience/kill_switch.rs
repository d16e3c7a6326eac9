//! Live-trading kill switch.
//!
//! Live mode requires dual consent: the `--live` (or `--network` without
//! `--testnet`) flag AND `MM_LIVE_ENABLE=1` in the environment. Shadow and
//! testnet modes always pass. Startup aborts on a failed check; there is no
//! recovery path by design.

use crate::core::errors::ExecError;
use crate::monitoring::MetricsRegistry;

/// Environment variable carrying live-trading consent.
pub const LIVE_ENABLE_ENV: &str = "MM_LIVE_ENABLE";

/// Verify live-mode consent.
///
/// `env_live_enable` overrides the environment lookup for tests.
pub fn confirm_live_enable(
    network_enabled: bool,
    testnet: bool,
    env_live_enable: Option<&str>,
    metrics: Option<&MetricsRegistry>,
) -> Result<(), ExecError> {
    // Shadow and testnet are always safe
    if !network_enabled || testnet {
        if let Some(metrics) = metrics {
            metrics.state().live_enable.set(0.0);
        }
        return Ok(());
    }

    let value = match env_live_enable {
        Some(v) => v.to_string(),
        None => std::env::var(LIVE_ENABLE_ENV).unwrap_or_else(|_| "0".to_string()),
    };

    if value != "1" {
        if let Some(metrics) = metrics {
            metrics.state().live_enable.set(0.0);
        }
        return Err(ExecError::LiveModeNotEnabled(format!(
            "live mode requires {LIVE_ENABLE_ENV}=1; current value: {LIVE_ENABLE_ENV}={value}"
        )));
    }

    if let Some(metrics) = metrics {
        metrics.state().live_enable.set(1.0);
    }
    Ok(())
}

/// Human-readable description of the current trading mode.
pub fn mode_description(network_enabled: bool, testnet: bool) -> &'static str {
    if !network_enabled {
        "shadow (no-network, dry-run)"
    } else if testnet {
        "testnet (network enabled, testnet endpoints)"
    } else {
        "LIVE (network enabled, production endpoints)"
    }
}
