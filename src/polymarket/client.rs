//! Polymarket CLOB REST client.
//!
//! Implements the [`TradingApi`] capability over the CLOB REST surface.
//! The client is assumed pre-authenticated: credential material from the
//! environment is attached as-is, and request signing lives upstream of
//! this crate.
//!
//! Venue responses vary in shape between endpoints and deployments, so
//! order IDs and order states are extracted leniently from untyped JSON,
//! the same way the rest of the pipeline treats malformed wire data:
//! unusable fields degrade to "no signal", not errors.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::message::RawLevel;
use crate::config::{Config, Credentials};
use crate::domain::{BookState, OrderId, OrderState, OrderStatus, TokenId, Volume};
use crate::error::{Error, ExecutionError, Result};
use crate::exchange::{OrderSpec, SubmitResult, TimeInForce, TradingApi};

const USDC_SCALE: Decimal = dec!(1000000);

/// HTTP client for the Polymarket CLOB API.
pub struct ClobClient {
    http: HttpClient,
    base_url: String,
    credentials: Option<Credentials>,
    book_retry_attempts: u32,
    book_retry_backoff_ms: u64,
}

impl ClobClient {
    /// Create a client with default retry behavior.
    #[must_use]
    pub fn new(base_url: String, credentials: Option<Credentials>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url,
            credentials,
            book_retry_attempts: 3,
            book_retry_backoff_ms: 500,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });

        Self {
            http,
            base_url: config.network.clob_api_url.clone(),
            credentials: config.credentials.clone(),
            book_retry_attempts: config.execution.book_retry_attempts,
            book_retry_backoff_ms: config.execution.book_retry_backoff_ms,
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(creds) => builder
                .header("POLY-API-KEY", &creds.api_key)
                .header("POLY-PASSPHRASE", &creds.api_passphrase),
            None => builder,
        }
    }

    /// GET with bounded retry and fixed backoff.
    async fn get_with_retry<T>(&self, url: &str, authenticated: bool) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let max_attempts = self.book_retry_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = async {
                let mut builder = self.http.get(url);
                if authenticated {
                    builder = self.authed(builder);
                }
                let response = builder.send().await?.error_for_status()?;
                Ok::<T, Error>(response.json().await?)
            }
            .await;

            match result {
                Ok(body) => return Ok(body),
                Err(e) if attempt < max_attempts => {
                    debug!(error = %e, attempt, max_attempts, "Fetch failed; retrying");
                    sleep(Duration::from_millis(self.book_retry_backoff_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_batch(
        &self,
        payload: &[OrderPayload<'_>],
    ) -> Result<Vec<SubmitResult>> {
        let url = format!("{}/orders", self.base_url);
        let response = self
            .authed(self.http.post(&url).json(payload))
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;
        Ok(normalize_order_results(&body, payload.len()))
    }

    async fn post_single(&self, payload: &OrderPayload<'_>) -> Result<SubmitResult> {
        let url = format!("{}/order", self.base_url);
        let response = self
            .authed(self.http.post(&url).json(payload))
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;
        Ok(submit_result_from(&body))
    }
}

#[derive(Debug, Serialize)]
struct OrderPayload<'a> {
    token_id: &'a str,
    side: crate::exchange::OrderSide,
    price: Decimal,
    size: Decimal,
    order_type: TimeInForce,
}

impl<'a> OrderPayload<'a> {
    fn from_spec(spec: &'a OrderSpec, time_in_force: TimeInForce) -> Self {
        Self {
            token_id: spec.token_id.as_str(),
            side: spec.side,
            price: spec.price,
            size: spec.size,
            order_type: time_in_force,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BookResponse {
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
    timestamp: Option<String>,
    hash: Option<String>,
}

#[async_trait]
impl TradingApi for ClobClient {
    async fn get_balance(&self) -> Result<Decimal> {
        let url = format!(
            "{}/balance-allowance?asset_type=COLLATERAL",
            self.base_url
        );
        let body: BalanceResponse = self.get_with_retry(&url, true).await?;

        let raw = body.balance.unwrap_or_default();
        let micro = Decimal::from_str(raw.trim())
            .map_err(|e| Error::Parse(format!("balance '{raw}': {e}")))?;
        Ok(micro / USDC_SCALE)
    }

    async fn submit_orders(
        &self,
        orders: &[OrderSpec],
        time_in_force: TimeInForce,
    ) -> Result<Vec<SubmitResult>> {
        let payload: Vec<OrderPayload<'_>> = orders
            .iter()
            .map(|spec| OrderPayload::from_spec(spec, time_in_force))
            .collect();

        match self.post_batch(&payload).await {
            Ok(results) => Ok(results),
            Err(e) => {
                warn!(error = %e, "Batch submission failed; falling back to sequential");
                let mut results = Vec::with_capacity(payload.len());
                for order in &payload {
                    let result = match self.post_single(order).await {
                        Ok(result) => result,
                        Err(e) => SubmitResult::Rejected {
                            message: e.to_string(),
                        },
                    };
                    results.push(result);
                }
                Ok(results)
            }
        }
    }

    async fn get_order_status(
        &self,
        order_id: &OrderId,
        requested_size: Volume,
    ) -> Result<OrderState> {
        let url = format!("{}/data/order/{}", self.base_url, order_id.as_str());
        let response = self
            .authed(self.http.get(&url))
            .send()
            .await
            .map_err(|e| ExecutionError::StatusFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| ExecutionError::StatusFailed(e.to_string()))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ExecutionError::StatusFailed(e.to_string()))?;

        Ok(summarize_order_state(&body, order_id.clone(), requested_size))
    }

    async fn cancel_orders(&self, order_ids: &[OrderId]) -> Result<()> {
        if order_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = order_ids.iter().map(OrderId::as_str).collect();
        let url = format!("{}/orders", self.base_url);
        self.authed(self.http.delete(&url).json(&ids))
            .send()
            .await
            .map_err(|e| ExecutionError::CancelFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| ExecutionError::CancelFailed(e.to_string()))?;
        info!(orders = ids.len(), "Cancel request submitted");
        Ok(())
    }

    async fn get_order_book(&self, token_id: &TokenId) -> Result<BookState> {
        let url = format!("{}/book?token_id={}", self.base_url, token_id.as_str());
        let body: BookResponse = self.get_with_retry(&url, false).await?;

        let mut book = BookState::new();
        let bids = body.bids.iter().filter_map(RawLevel::to_level);
        let asks = body.asks.iter().filter_map(RawLevel::to_level);
        let timestamp_ms = body.timestamp.as_deref().and_then(|s| s.trim().parse().ok());
        book.apply_snapshot(bids, asks, timestamp_ms, body.hash);
        Ok(book)
    }

    fn exchange_name(&self) -> &'static str {
        "Polymarket"
    }
}

/// Pull an order ID out of a venue response, whatever its shape.
///
/// Checks the usual key spellings at the top level, then one level of
/// common nesting.
#[must_use]
pub fn extract_order_id(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    for key in ["orderID", "orderId", "order_id", "id"] {
        if let Some(v) = obj.get(key) {
            match v {
                Value::String(s) if !s.is_empty() => return Some(s.clone()),
                Value::Number(n) => return Some(n.to_string()),
                _ => {}
            }
        }
    }
    for key in ["order", "data", "result"] {
        if let Some(nested) = obj.get(key) {
            if let Some(id) = extract_order_id(nested) {
                return Some(id);
            }
        }
    }
    None
}

fn rejection_message(value: &Value) -> String {
    for key in ["errorMsg", "error", "message"] {
        if let Some(msg) = value.get(key).and_then(Value::as_str) {
            if !msg.is_empty() {
                return msg.to_string();
            }
        }
    }
    value.to_string()
}

fn submit_result_from(value: &Value) -> SubmitResult {
    match extract_order_id(value) {
        Some(id) => SubmitResult::Accepted {
            order_id: OrderId::new(id),
        },
        None => SubmitResult::Rejected {
            message: rejection_message(value),
        },
    }
}

/// Normalize a batch response into one result per submitted order.
///
/// The venue returns either an array of per-order results, an object
/// wrapping such an array, or a bare list of order IDs. Missing trailing
/// entries are treated as rejections.
#[must_use]
pub fn normalize_order_results(value: &Value, expected: usize) -> Vec<SubmitResult> {
    let mut results: Vec<SubmitResult> = if let Some(entries) = value.as_array() {
        entries.iter().map(submit_result_from).collect()
    } else if let Some(entries) = ["orders", "results", "data"]
        .iter()
        .find_map(|k| value.get(*k).and_then(Value::as_array))
    {
        entries.iter().map(submit_result_from).collect()
    } else if let Some(ids) = ["orderIds", "order_ids"]
        .iter()
        .find_map(|k| value.get(*k).and_then(Value::as_array))
    {
        ids.iter()
            .map(|id| match id.as_str() {
                Some(s) if !s.is_empty() => SubmitResult::Accepted {
                    order_id: OrderId::new(s),
                },
                _ => SubmitResult::Rejected {
                    message: "missing order id".into(),
                },
            })
            .collect()
    } else {
        vec![submit_result_from(value)]
    };

    while results.len() < expected {
        results.push(SubmitResult::Rejected {
            message: "no result returned for order".into(),
        });
    }
    results
}

fn field_as_decimal(value: &Value, keys: &[&str]) -> Option<Decimal> {
    for key in keys {
        if let Some(v) = value.get(*key) {
            let parsed = match v {
                Value::String(s) => Decimal::from_str(s.trim()).ok(),
                Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
                _ => None,
            };
            if parsed.is_some() {
                return parsed;
            }
        }
    }
    None
}

/// Summarize an order-status response into an [`OrderState`].
///
/// Filled size falls back to `original - remaining` when not reported
/// directly; an unreadable status reads as still pending.
#[must_use]
pub fn summarize_order_state(
    value: &Value,
    order_id: OrderId,
    requested_size: Volume,
) -> OrderState {
    let status = ["status", "state", "order_status"]
        .iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map_or(OrderStatus::Pending, OrderStatus::from_venue);

    let filled = field_as_decimal(
        value,
        &[
            "filled_size",
            "filledSize",
            "size_matched",
            "matched_size",
            "matchedSize",
        ],
    );
    let remaining = field_as_decimal(value, &["remaining_size", "remainingSize"]);
    let original = field_as_decimal(value, &["original_size", "originalSize", "size"]);

    let filled_size = filled
        .or_else(|| match (original, remaining) {
            (Some(o), Some(r)) => Some((o - r).max(Decimal::ZERO)),
            _ => None,
        })
        .unwrap_or(Decimal::ZERO);

    OrderState {
        order_id,
        status,
        filled_size,
        requested_size,
    }
}
