//! Common initialization and parsing helpers for the binaries.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
pub fn init_logging(level: &str, json_logs: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

/// Split a comma-separated symbols list, applying an optional substring
/// filter.
pub fn parse_symbols(raw: &str, filter: Option<&str>) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| filter.map_or(true, |f| s.contains(f)))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbols() {
        assert_eq!(
            parse_symbols("BTCUSDT,ETHUSDT, SOLUSDT", None),
            vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]
        );
        assert_eq!(
            parse_symbols("BTCUSDT,ETHUSDT,SOLUSDT", Some("BTC")),
            vec!["BTCUSDT"]
        );
        assert!(parse_symbols("", None).is_empty());
    }
}
