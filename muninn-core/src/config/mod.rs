//! Runtime mode and environment selection.

use std::fmt;
use std::str::FromStr;

/// Execution mode for the demo entrypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// No network, fake exchange, synthetic quotes.
    Shadow,
    /// Requests built and signed but never sent.
    DryRun,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shadow" => Ok(ExecutionMode::Shadow),
            "dryrun" | "dry-run" => Ok(ExecutionMode::DryRun),
            other => Err(format!("invalid mode: {other} (shadow, dryrun)")),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Shadow => write!(f, "shadow"),
            ExecutionMode::DryRun => write!(f, "dryrun"),
        }
    }
}

/// API environment flavor for configuration profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiEnv {
    Dev,
    Shadow,
    Soak,
    Prod,
}

impl FromStr for ApiEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(ApiEnv::Dev),
            "shadow" => Ok(ApiEnv::Shadow),
            "soak" => Ok(ApiEnv::Soak),
            "prod" => Ok(ApiEnv::Prod),
            other => Err(format!("invalid api env: {other} (dev, shadow, soak, prod)")),
        }
    }
}

/// `EXCHANGE_ENV` selection, mapped onto the secret environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeEnv {
    Shadow,
    Testnet,
    Live,
}

impl ExchangeEnv {
    /// Read `EXCHANGE_ENV`, defaulting to shadow.
    pub fn from_env() -> Self {
        std::env::var("EXCHANGE_ENV")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(ExchangeEnv::Shadow)
    }

    /// Which secret environment this exchange environment maps onto.
    pub fn secret_env(&self) -> &'static str {
        match self {
            ExchangeEnv::Shadow => "dev",
            ExchangeEnv::Testnet => "testnet",
            ExchangeEnv::Live => "prod",
        }
    }
}

impl FromStr for ExchangeEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shadow" => Ok(ExchangeEnv::Shadow),
            "testnet" => Ok(ExchangeEnv::Testnet),
            "live" => Ok(ExchangeEnv::Live),
            other => Err(format!(
                "invalid exchange env: {other} (shadow, testnet, live)"
            )),
        }
    }
}
