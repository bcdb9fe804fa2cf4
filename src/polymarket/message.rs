//! Polymarket WebSocket message types.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{BookSide, PriceLevel};

/// Subscription request sent on connect.
#[derive(Debug, Serialize)]
pub struct SubscribeMessage {
    pub assets_ids: Vec<String>,
    #[serde(rename = "type")]
    pub msg_type: String,
}

impl SubscribeMessage {
    #[must_use]
    pub fn new(asset_ids: Vec<String>) -> Self {
        Self {
            assets_ids: asset_ids,
            msg_type: "market".into(),
        }
    }
}

/// Price level as received on the wire (strings, not decimals).
#[derive(Debug, Clone, Deserialize)]
pub struct RawLevel {
    pub price: String,
    pub size: String,
}

impl RawLevel {
    /// Parse into a domain level; malformed entries yield `None` and are
    /// skipped by callers rather than failing the whole message.
    #[must_use]
    pub fn to_level(&self) -> Option<PriceLevel> {
        let price = Decimal::from_str(self.price.trim()).ok()?;
        let size = Decimal::from_str(self.size.trim()).ok()?;
        Some(PriceLevel::new(price, size))
    }
}

fn parse_levels(raw: &[RawLevel]) -> Vec<PriceLevel> {
    raw.iter().filter_map(RawLevel::to_level).collect()
}

fn parse_timestamp_ms(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
}

/// Full order book snapshot for one asset.
#[derive(Debug, Clone, Deserialize)]
pub struct BookMessage {
    pub asset_id: String,
    pub market: Option<String>,
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    #[serde(default)]
    pub asks: Vec<RawLevel>,
    pub timestamp: Option<String>,
    pub hash: Option<String>,
}

impl BookMessage {
    #[must_use]
    pub fn bid_levels(&self) -> Vec<PriceLevel> {
        parse_levels(&self.bids)
    }

    #[must_use]
    pub fn ask_levels(&self) -> Vec<PriceLevel> {
        parse_levels(&self.asks)
    }

    #[must_use]
    pub fn timestamp_ms(&self) -> Option<i64> {
        parse_timestamp_ms(self.timestamp.as_deref())
    }
}

/// One level change inside a `price_change` event.
#[derive(Debug, Clone, Deserialize)]
pub struct RawChange {
    pub asset_id: String,
    pub price: String,
    pub size: String,
    pub side: String,
    pub hash: Option<String>,
}

impl RawChange {
    /// Parse into a book mutation. A size of zero is a valid removal, so it
    /// is preserved rather than filtered.
    #[must_use]
    pub fn to_change(&self) -> Option<(BookSide, Decimal, Decimal)> {
        let side = match self.side.to_ascii_uppercase().as_str() {
            "BUY" => BookSide::Bid,
            "SELL" => BookSide::Ask,
            _ => return None,
        };
        let price = Decimal::from_str(self.price.trim()).ok()?;
        let size = Decimal::from_str(self.size.trim()).ok()?;
        Some((side, price, size))
    }
}

/// Incremental update batching changes, possibly across assets.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceChangeMessage {
    pub market: Option<String>,
    #[serde(default)]
    pub price_changes: Vec<RawChange>,
    pub timestamp: Option<String>,
}

impl PriceChangeMessage {
    #[must_use]
    pub fn timestamp_ms(&self) -> Option<i64> {
        parse_timestamp_ms(self.timestamp.as_deref())
    }
}

/// Messages received from the market channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "event_type")]
pub enum WsEvent {
    #[serde(rename = "book")]
    Book(BookMessage),

    #[serde(rename = "price_change")]
    PriceChange(PriceChangeMessage),

    #[serde(other)]
    Unknown,
}

/// Parse one WebSocket text frame.
///
/// The feed sends either a single event object or an array of events.
pub fn parse_frame(text: &str) -> Result<Vec<WsEvent>, serde_json::Error> {
    if text.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<WsEvent>>(text)
    } else {
        serde_json::from_str::<WsEvent>(text).map(|event| vec![event])
    }
}
