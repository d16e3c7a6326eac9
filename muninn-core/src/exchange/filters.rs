//! Symbol filters cache with TTL.
//!
//! Filters change rarely, so lookups are cached for `ttl_s` (default 600).
//! When a fetch fails a stale entry is better than nothing, and a built-in
//! default table covers symbols the exchange has never answered for. Every
//! lookup records its source (cached/fetched/stale/default) so dashboards
//! can spot a degraded filters feed.

use crate::core::errors::ExecError;
use crate::core::types::{FilterSource, SymbolFilters};
use crate::monitoring::MetricsRegistry;
use crate::utils::Clock;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tracing::warn;

/// Default cache TTL in seconds.
pub const DEFAULT_TTL_S: i64 = 600;

/// TTL'd cache over exchange symbol filters.
pub struct SymbolFiltersCache {
    clock: Clock,
    ttl_ms: i64,
    cache: Mutex<HashMap<String, (SymbolFilters, i64)>>,
    metrics: Option<MetricsRegistry>,
}

impl SymbolFiltersCache {
    pub fn new(clock: Clock, ttl_s: i64, metrics: Option<MetricsRegistry>) -> Self {
        Self {
            clock,
            ttl_ms: ttl_s * 1000,
            cache: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    fn record_source(&self, source: FilterSource) {
        if let Some(metrics) = &self.metrics {
            metrics
                .state()
                .symbol_filters_source
                .with_label_values(&[source.as_str()])
                .inc();
        }
    }

    /// Get filters for `symbol`, fetching through `fetcher` on miss or
    /// expiry. Returns the filters together with where they came from.
    pub fn get<F>(&self, symbol: &str, fetcher: F) -> (SymbolFilters, FilterSource)
    where
        F: FnOnce() -> Result<SymbolFilters, ExecError>,
    {
        let now = self.clock.now_ms();

        {
            let cache = self.cache.lock();
            if let Some((filters, cached_at)) = cache.get(symbol) {
                if now - cached_at < self.ttl_ms {
                    self.record_source(FilterSource::Cached);
                    return (filters.clone(), FilterSource::Cached);
                }
            }
        }

        match fetcher() {
            Ok(filters) => {
                self.cache
                    .lock()
                    .insert(symbol.to_string(), (filters.clone(), now));
                self.record_source(FilterSource::Fetched);
                (filters, FilterSource::Fetched)
            }
            Err(e) => {
                warn!(symbol, error = %e, "symbol filters fetch failed");
                if let Some(metrics) = &self.metrics {
                    metrics.state().symbol_filters_fetch_errors.inc();
                }
                // Stale beats default beats nothing
                if let Some((filters, _)) = self.cache.lock().get(symbol) {
                    self.record_source(FilterSource::Stale);
                    return (filters.clone(), FilterSource::Stale);
                }
                self.record_source(FilterSource::Default);
                (default_filters(symbol), FilterSource::Default)
            }
        }
    }

    /// Drop one symbol's entry, or everything when `symbol` is `None`.
    pub fn clear(&self, symbol: Option<&str>) {
        let mut cache = self.cache.lock();
        match symbol {
            Some(s) => {
                cache.remove(s);
            }
            None => cache.clear(),
        }
    }
}

/// Conservative defaults for symbols the exchange has not described.
pub fn default_filters(symbol: &str) -> SymbolFilters {
    match symbol {
        "BTCUSDT" => SymbolFilters {
            symbol: symbol.to_string(),
            tick_size: dec!(0.01),
            step_size: dec!(0.00001),
            min_qty: dec!(0.00001),
            price_precision: 2,
            qty_precision: 5,
        },
        "ETHUSDT" => SymbolFilters {
            symbol: symbol.to_string(),
            tick_size: dec!(0.01),
            step_size: dec!(0.0001),
            min_qty: dec!(0.0001),
            price_precision: 2,
            qty_precision: 4,
        },
        "SOLUSDT" => SymbolFilters {
            symbol: symbol.to_string(),
            tick_size: dec!(0.001),
            step_size: dec!(0.01),
            min_qty: dec!(0.01),
            price_precision: 3,
            qty_precision: 2,
        },
        _ => SymbolFilters {
            symbol: symbol.to_string(),
            tick_size: dec!(0.01),
            step_size: dec!(0.001),
            min_qty: dec!(0.001),
            price_precision: 2,
            qty_precision: 3,
        },
    }
}
