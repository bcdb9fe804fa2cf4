//! Polymarket exchange integration.

mod client;
mod discovery;
mod message;
mod stream;

pub use client::{normalize_order_results, summarize_order_state, ClobClient};
pub use discovery::{candidate_slugs, GammaMarket, SlugDiscovery, SLUG_PREFIX};
pub use message::{BookMessage, PriceChangeMessage, RawLevel, SubscribeMessage, WsEvent};
pub use stream::{BookEvent, BookEventKind, MarketFeed};
