//! Dry-run exchange adapter.
//!
//! Builds and signs Bybit-shaped requests exactly as a live adapter would
//! (HMAC-SHA256 over `timestamp + api_key + recv_window + body`) but never
//! opens a socket. Responses are synthesized acks, fills never arrive, and
//! the signed payload is logged with secrets masked so a soak run can be
//! audited without risk.

use super::{ExchangeClient, OpenOrder, PlaceOrderRequest, PlaceOrderResponse};
use crate::core::errors::ExecError;
use crate::core::types::{FillEvent, OrderState, SymbolFilters};
use crate::exchange::filters::default_filters;
use crate::utils::canonical::to_canonical_string;
use crate::utils::secrets::mask_value;
use crate::utils::Clock;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

type HmacSha256 = Hmac<Sha256>;

/// Credentials and signing parameters for the dry-run adapter.
#[derive(Debug, Clone)]
pub struct DryRunConfig {
    pub api_key: String,
    pub api_secret: String,
    /// Bybit-style receive window in ms.
    pub recv_window: u32,
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self {
            api_key: "dryrun-key".to_string(),
            api_secret: "dryrun-secret".to_string(),
            recv_window: 5000,
        }
    }
}

struct DryRunInner {
    order_seq: u64,
    orders: HashMap<String, OpenOrder>,
}

/// Exchange adapter that signs requests but never sends them.
pub struct DryRunExchange {
    config: DryRunConfig,
    clock: Clock,
    inner: Mutex<DryRunInner>,
}

impl DryRunExchange {
    pub fn new(config: DryRunConfig, clock: Clock) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(DryRunInner {
                order_seq: 1,
                orders: HashMap::new(),
            }),
        }
    }

    /// HMAC-SHA256 signature over `timestamp + api_key + recv_window + body`.
    pub fn sign(&self, timestamp_ms: i64, body: &str) -> String {
        let payload = format!(
            "{timestamp_ms}{}{}{body}",
            self.config.api_key, self.config.recv_window
        );
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl ExchangeClient for DryRunExchange {
    fn place_limit_order(&self, req: &PlaceOrderRequest) -> Result<PlaceOrderResponse, ExecError> {
        let timestamp_ms = self.clock.now_ms();
        let body = to_canonical_string(&json!({
            "category": "linear",
            "orderLinkId": req.client_order_id,
            "orderType": "Limit",
            "price": req.price.to_string(),
            "qty": req.qty.to_string(),
            "side": req.side.to_string(),
            "symbol": req.symbol,
            "timeInForce": "PostOnly",
        }))
        .map_err(|e| ExecError::Validation(format!("request body: {e}")))?;
        let signature = self.sign(timestamp_ms, &body);

        info!(
            symbol = %req.symbol,
            client_order_id = %req.client_order_id,
            api_key = %mask_value(&self.config.api_key),
            signature = %mask_value(&signature),
            "dry-run order signed, not sent"
        );

        let mut inner = self.inner.lock();
        let exchange_order_id = format!("DRY{:06}", inner.order_seq);
        inner.order_seq += 1;
        inner.orders.insert(
            exchange_order_id.clone(),
            OpenOrder {
                exchange_order_id: exchange_order_id.clone(),
                client_order_id: req.client_order_id.clone(),
                symbol: req.symbol.clone(),
                side: req.side,
                qty: req.qty,
                filled_qty: Decimal::ZERO,
                price: req.price,
                status: OrderState::Open,
            },
        );

        Ok(PlaceOrderResponse {
            success: true,
            exchange_order_id: Some(exchange_order_id),
            status: OrderState::Open,
            message: Some("dry-run: signed, not sent".to_string()),
        })
    }

    fn cancel_order(&self, client_order_id: &str, _symbol: &str) -> Result<bool, ExecError> {
        let mut inner = self.inner.lock();
        let Some(order) = inner
            .orders
            .values_mut()
            .find(|o| o.client_order_id == client_order_id)
        else {
            return Ok(false);
        };
        if order.status.is_terminal() {
            return Ok(false);
        }
        order.status = OrderState::Canceled;
        Ok(true)
    }

    fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OpenOrder>, ExecError> {
        let inner = self.inner.lock();
        let mut orders: Vec<OpenOrder> = inner
            .orders
            .values()
            .filter(|o| o.status.is_open())
            .filter(|o| symbol.map_or(true, |s| o.symbol == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.exchange_order_id.cmp(&b.exchange_order_id));
        Ok(orders)
    }

    fn get_positions(&self) -> Result<BTreeMap<String, Decimal>, ExecError> {
        // Nothing is ever sent, so nothing ever fills
        Ok(BTreeMap::new())
    }

    fn next_fill(&self) -> Option<FillEvent> {
        None
    }

    fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, ExecError> {
        Ok(default_filters(symbol))
    }

    fn current_time_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}
