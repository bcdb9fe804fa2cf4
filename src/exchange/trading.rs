//! Trading API capability.
//!
//! The venue client behind this trait is assumed pre-authenticated; order
//! construction and signature handling live entirely in the adapter.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{BookState, OrderId, OrderState, TokenId, Volume};
use crate::error::Result;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Time-in-force for submitted orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good-till-canceled (resting).
    Gtc,
    /// Fill-or-kill.
    Fok,
    /// Fill-and-kill (immediate-or-cancel).
    Fak,
    /// Good-till-date.
    Gtd,
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Gtc => "GTC",
            Self::Fok => "FOK",
            Self::Fak => "FAK",
            Self::Gtd => "GTD",
        };
        write!(f, "{s}")
    }
}

/// A single order to be submitted.
#[derive(Debug, Clone)]
pub struct OrderSpec {
    pub token_id: TokenId,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Volume,
}

/// Per-order submission result.
#[derive(Debug, Clone)]
pub enum SubmitResult {
    Accepted { order_id: OrderId },
    Rejected { message: String },
}

impl SubmitResult {
    /// Order ID when the venue accepted the order.
    #[must_use]
    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            Self::Accepted { order_id } => Some(order_id),
            Self::Rejected { .. } => None,
        }
    }

    /// Whether the rejection reports a signature problem.
    ///
    /// A signature failure is fatal to the whole attempt: nothing will have
    /// filled and retrying cannot help.
    #[must_use]
    pub fn is_invalid_signature(&self) -> bool {
        match self {
            Self::Rejected { message } => message.to_lowercase().contains("invalid signature"),
            Self::Accepted { .. } => false,
        }
    }
}

/// Pre-authenticated venue trading client.
#[async_trait]
pub trait TradingApi: Send + Sync {
    /// Available collateral balance.
    async fn get_balance(&self) -> Result<Decimal>;

    /// Submit a batch of orders, one result per order in input order.
    ///
    /// Adapters submit the whole batch in one request where the venue
    /// supports it and fall back to sequential per-order submission on
    /// batch failure.
    async fn submit_orders(
        &self,
        orders: &[OrderSpec],
        time_in_force: TimeInForce,
    ) -> Result<Vec<SubmitResult>>;

    /// Read one order's current state.
    async fn get_order_status(
        &self,
        order_id: &OrderId,
        requested_size: Volume,
    ) -> Result<OrderState>;

    /// Cancel open orders. Best-effort; venues may refuse already-terminal
    /// orders.
    async fn cancel_orders(&self, order_ids: &[OrderId]) -> Result<()>;

    /// Fetch a fresh order book snapshot over REST.
    async fn get_order_book(&self, token_id: &TokenId) -> Result<BookState>;

    /// Exchange name for logging/debugging.
    fn exchange_name(&self) -> &'static str;
}
