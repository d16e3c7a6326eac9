//! Execution demo entrypoint.
//!
//! Drives the execution loop against a fake or dry-run exchange, with
//! optional durable state, recovery and an observability server. Stdout
//! carries exactly one line: the canonical JSON report. Everything else
//! goes to stderr via tracing.

use anyhow::{bail, Context, Result};
use clap::Parser;
use muninn_bins::common::{init_logging, parse_symbols};
use muninn_core::config::{ApiEnv, ExchangeEnv, ExecutionMode};
use muninn_core::engine::{ExecutionConfig, ExecutionLoop, ExecutionParams};
use muninn_core::exchange::{
    DryRunConfig, DryRunExchange, ExchangeClient, FakeExchange, FakeExchangeConfig,
};
use muninn_core::monitoring::{MetricsRegistry, ObsServer, ObsServerConfig, ReadinessProbes};
use muninn_core::policy::FeeSchedule;
use muninn_core::risk::{MarkPriceFn, RiskLimits, RuntimeRiskMonitor};
use muninn_core::state::MemoryKv;
use muninn_core::store::{DurableOrderStore, MemoryOrderStore, OrderStore};
use muninn_core::utils::canonical::to_canonical_line;
use muninn_core::utils::Clock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;


#[derive(Parser, Debug)]
#[command(name = "muninn-exec-shadow", about = "Market-making execution demo")]
struct Args {
    /// Required gate: refuse to run without explicit shadow intent
    #[arg(long)]
    shadow: bool,

    /// Exchange backend
    #[arg(long, default_value = "fake", value_parser = ["fake", "bybit"])]
    exchange: String,

    /// Execution mode
    #[arg(long, default_value = "shadow")]
    mode: ExecutionMode,

    /// Enable network calls (with --testnet: testnet; alone: live)
    #[arg(long)]
    network: bool,

    /// Use testnet endpoints
    #[arg(long)]
    testnet: bool,

    /// Alias for --network without --testnet; requires MM_LIVE_ENABLE=1
    #[arg(long)]
    live: bool,

    /// API environment profile
    #[arg(long, default_value = "shadow")]
    api_env: ApiEnv,

    /// Enforce the maker-only policy
    #[arg(long, overrides_with = "no_maker_only")]
    maker_only: bool,

    /// Disable the maker-only policy
    #[arg(long)]
    no_maker_only: bool,

    /// Post-only price offset in bps
    #[arg(long, default_value = "1.5")]
    post_only_offset_bps: Decimal,

    /// Multiplier over the exchange min_qty
    #[arg(long, default_value = "1.1")]
    min_qty_pad: Decimal,

    /// Substring filter over --symbols
    #[arg(long)]
    symbol_filter: Option<String>,

    /// Comma-separated symbols
    #[arg(long, default_value = "BTCUSDT,ETHUSDT")]
    symbols: String,

    /// Shadow iterations
    #[arg(long, default_value_t = 10)]
    iterations: u32,

    /// Max USD notional per symbol
    #[arg(long = "max-inv", default_value = "10000")]
    max_inventory_usd: Decimal,

    /// Max total USD notional
    #[arg(long = "max-total", default_value = "50000")]
    max_total_usd: Decimal,

    /// Edge freeze threshold in bps
    #[arg(long = "edge-threshold", default_value = "1.5")]
    edge_threshold_bps: Decimal,

    /// Fake exchange fill probability
    #[arg(long, default_value_t = 0.7)]
    fill_rate: f64,

    /// Fake exchange reject probability
    #[arg(long, default_value_t = 0.05)]
    reject_rate: f64,

    /// Fake exchange simulated latency
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    /// Durable order store with journal + idempotency replay
    #[arg(long)]
    durable_state: bool,

    /// Snapshot directory for the durable store
    #[arg(long, default_value = "artifacts/state")]
    state_dir: String,

    /// Replay the journal before running
    #[arg(long)]
    recover: bool,

    /// Reconciliation interval in seconds
    #[arg(long, default_value_t = 60)]
    recon_interval_s: i64,

    /// Maker fee in bps (enables the fees report)
    #[arg(long)]
    fee_maker_bps: Option<Decimal>,

    /// Taker fee in bps
    #[arg(long)]
    fee_taker_bps: Option<Decimal>,

    /// Maker rebate in bps
    #[arg(long)]
    rebate_maker_bps: Option<Decimal>,

    /// Prefetch symbol filters before the run
    #[arg(long)]
    warmup_filters: bool,

    /// Serve /health, /ready and /metrics
    #[arg(long)]
    obs: bool,

    #[arg(long, default_value = "127.0.0.1")]
    obs_host: String,

    #[arg(long, default_value_t = 18993)]
    obs_port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

fn main() {
    let code = match run() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs)?;

    if !args.shadow {
        bail!("refusing to run without --shadow (explicit demo gate)");
    }

    // --live is --network without --testnet
    let network_enabled = args.network || args.live;
    let testnet = args.testnet && !args.live;
    let maker_only = !args.no_maker_only || args.maker_only;

    let symbols = parse_symbols(&args.symbols, args.symbol_filter.as_deref());
    if symbols.is_empty() {
        bail!("no symbols selected");
    }

    let exchange_env = ExchangeEnv::from_env();
    tracing::info!(
        mode = %args.mode,
        api_env = ?args.api_env,
        exchange = %args.exchange,
        exchange_env = ?exchange_env,
        secret_env = exchange_env.secret_env(),
        symbols = ?symbols,
        "starting execution demo"
    );

    let clock = Clock::system();
    let metrics = MetricsRegistry::new().context("metrics registry")?;

    // Exchange backend
    let exchange: Arc<dyn ExchangeClient> = match (args.exchange.as_str(), args.mode) {
        ("bybit", _) | (_, ExecutionMode::DryRun) => Arc::new(DryRunExchange::new(
            DryRunConfig::default(),
            clock.clone(),
        )),
        _ => Arc::new(FakeExchange::new(
            FakeExchangeConfig {
                fill_rate: args.fill_rate,
                reject_rate: args.reject_rate,
                partial_fill_rate: 0.1,
                latency_ms: args.latency_ms,
                seed: 42,
            },
            clock.clone(),
        )),
    };

    // Order store
    let store: Arc<dyn OrderStore> = if args.durable_state {
        let kv = Arc::new(MemoryKv::new(clock.clone()));
        Arc::new(
            DurableOrderStore::new(kv, &args.state_dir, clock.clone())
                .context("open durable store")?,
        )
    } else {
        Arc::new(MemoryOrderStore::new())
    };

    // Risk monitor with the same mark prices the synthetic quotes use
    let mark_price: MarkPriceFn = Arc::new(|symbol| {
        if symbol.contains("BTC") {
            dec!(50000)
        } else {
            dec!(3000)
        }
    });
    let risk = Arc::new(RuntimeRiskMonitor::with_mark_price(
        RiskLimits {
            max_inventory_usd_per_symbol: args.max_inventory_usd,
            max_total_notional_usd: args.max_total_usd,
            edge_freeze_threshold_bps: args.edge_threshold_bps,
        },
        mark_price,
    ));

    let fee_schedule = match (args.fee_maker_bps, args.fee_taker_bps, args.rebate_maker_bps) {
        (None, None, None) => None,
        (maker, taker, rebate) => Some(FeeSchedule::new(
            maker.unwrap_or(dec!(1.0)),
            taker.unwrap_or(dec!(7.0)),
            rebate.unwrap_or(dec!(0.0)),
        )),
    };

    let config = ExecutionConfig {
        maker_only,
        post_only_offset_bps: args.post_only_offset_bps,
        min_qty_pad: args.min_qty_pad,
        durable_state: args.durable_state,
        network_enabled,
        testnet,
        recon_interval_s: args.recon_interval_s,
        filters_ttl_s: 600,
        fee_schedule,
        profile_map: None,
    };

    let exec = Arc::new(
        ExecutionLoop::new(
            exchange.clone(),
            store,
            risk.clone(),
            clock,
            config,
            Some(metrics.clone()),
        )
        .map_err(|e| anyhow::anyhow!("{e}"))?,
    );

    // Observability server on its own runtime thread
    if args.obs {
        let addr = format!("{}:{}", args.obs_host, args.obs_port)
            .parse()
            .context("observability listen address")?;
        let probes = ReadinessProbes::new(
            Arc::new(|| true),
            {
                let risk = risk.clone();
                Arc::new(move || !risk.is_frozen())
            },
            Arc::new(|| true),
        );
        let server = ObsServer::new(ObsServerConfig { listen_addr: addr }, probes, Some(metrics));
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("observability runtime");
            if let Err(e) = runtime.block_on(server.serve()) {
                tracing::error!("observability server failed: {e:#}");
            }
        });
    }

    ctrlc::set_handler(|| {
        tracing::warn!("interrupted, exiting");
        std::process::exit(130);
    })
    .context("install interrupt handler")?;

    if args.warmup_filters {
        for symbol in &symbols {
            if let Ok(filters) = exchange.get_symbol_filters(symbol) {
                tracing::info!(symbol, tick = %filters.tick_size, step = %filters.step_size, "filters warmed");
            }
        }
    }

    if args.recover {
        let recovery = exec.recover_from_restart();
        tracing::info!(report = %recovery, "recovery report");
    }

    let params = ExecutionParams {
        symbols,
        iterations: args.iterations,
        max_inventory_usd_per_symbol: args.max_inventory_usd,
        max_total_notional_usd: args.max_total_usd,
        edge_freeze_threshold_bps: args.edge_threshold_bps,
        base_qty: dec!(0.01),
        spread_bps: dec!(5.0),
    };

    let report = exec.run_shadow(&params);
    print!("{}", to_canonical_line(&report).context("render report")?);
    Ok(())
}
