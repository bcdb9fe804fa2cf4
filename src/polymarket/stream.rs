//! Polymarket market data feed.
//!
//! Keeps one subscription alive for a fixed token set over a reconnecting
//! WebSocket, applies snapshot and diff messages to the shared [`BookCache`],
//! and pushes one [`BookEvent`] per book mutation into an mpsc channel for
//! the decision loop.
//!
//! The reconnect loop runs for the life of the process: there is no maximum
//! retry count, the backoff is a fixed second, and connect/disconnect logging
//! is throttled to avoid log storms. Book replicas are only trustworthy once
//! a fresh snapshot has arrived after each (re)connect; consumers must treat
//! an empty ask side as "not ready".

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::message::{parse_frame, SubscribeMessage, WsEvent};
use crate::domain::{BookCache, TokenId};
use crate::error::{Error, Result};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const LOG_THROTTLE: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What kind of mutation touched a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookEventKind {
    Snapshot,
    Diff,
}

/// "Book touched" notification handed to the decision loop.
#[derive(Debug, Clone)]
pub struct BookEvent {
    pub token_id: TokenId,
    pub kind: BookEventKind,
}

/// Emits at most one log line per interval.
struct LogThrottle {
    last: Option<Instant>,
    interval: Duration,
}

impl LogThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            last: None,
            interval,
        }
    }

    fn allow(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Reconnecting market data feed for a fixed token set.
pub struct MarketFeed {
    url: String,
    tokens: Vec<TokenId>,
    cache: Arc<BookCache>,
}

impl MarketFeed {
    #[must_use]
    pub fn new(url: String, tokens: Vec<TokenId>, cache: Arc<BookCache>) -> Self {
        Self { url, tokens, cache }
    }

    /// Run the feed until the event receiver is dropped.
    ///
    /// Connection failures are never fatal: the feed logs (throttled), waits
    /// a fixed backoff, and reconnects indefinitely.
    pub async fn run(self, tx: mpsc::Sender<BookEvent>) {
        let mut throttle = LogThrottle::new(LOG_THROTTLE);
        loop {
            if tx.is_closed() {
                debug!("Event receiver dropped; stopping feed");
                return;
            }
            match self.connect_and_stream(&tx, &mut throttle).await {
                Ok(()) => return,
                Err(e) => {
                    if throttle.allow() {
                        warn!(error = %e, "Market stream disconnected; reconnecting");
                    }
                    sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }

    /// One connection lifetime: connect, subscribe, pump messages.
    ///
    /// Returns `Ok(())` only when the consumer is gone; any disconnect or
    /// transport error surfaces as `Err` so the caller reconnects.
    async fn connect_and_stream(
        &self,
        tx: &mpsc::Sender<BookEvent>,
        throttle: &mut LogThrottle,
    ) -> Result<()> {
        if throttle.allow() {
            info!(url = %self.url, "Connecting to market stream");
        }
        let (mut ws, response) = connect_async(&self.url).await?;
        debug!(status = %response.status(), "Market stream connected");

        self.subscribe(&mut ws).await?;

        while let Some(msg) = ws.next().await {
            match msg? {
                Message::Text(text) => {
                    trace!(bytes = text.len(), "Received market frame");
                    let events = match parse_frame(&text) {
                        Ok(events) => events,
                        Err(e) => {
                            warn!(error = %e, bytes = text.len(), "Failed to parse frame");
                            continue;
                        }
                    };
                    for event in events {
                        if !self.apply(event, tx).await {
                            return Ok(());
                        }
                    }
                }
                Message::Ping(data) => {
                    ws.send(Message::Pong(data)).await?;
                }
                Message::Close(frame) => {
                    let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                    return Err(Error::Connection(format!("closed by server: {reason}")));
                }
                _ => {}
            }
        }

        Err(Error::Connection("stream ended".into()))
    }

    async fn subscribe(&self, ws: &mut WsStream) -> Result<()> {
        let asset_ids: Vec<String> = self.tokens.iter().map(|t| t.as_str().to_string()).collect();
        let msg = SubscribeMessage::new(asset_ids);
        let json = serde_json::to_string(&msg)?;
        ws.send(Message::Text(json)).await?;
        info!(assets = self.tokens.len(), "Subscribed to market channel");
        Ok(())
    }

    /// Apply one decoded event to the cache and notify the consumer.
    ///
    /// Returns false once the consumer is gone. Events for untracked assets
    /// are dropped silently.
    async fn apply(&self, event: WsEvent, tx: &mpsc::Sender<BookEvent>) -> bool {
        match event {
            WsEvent::Book(msg) => {
                let token_id = TokenId::from(msg.asset_id.clone());
                let applied = self.cache.apply_snapshot(
                    &token_id,
                    msg.bid_levels(),
                    msg.ask_levels(),
                    msg.timestamp_ms(),
                    msg.hash.clone(),
                );
                if applied {
                    let event = BookEvent {
                        token_id,
                        kind: BookEventKind::Snapshot,
                    };
                    return tx.send(event).await.is_ok();
                }
                true
            }
            WsEvent::PriceChange(msg) => {
                let timestamp_ms = msg.timestamp_ms();
                for raw in &msg.price_changes {
                    let token_id = TokenId::from(raw.asset_id.clone());
                    let Some(change) = raw.to_change() else {
                        continue;
                    };
                    let applied = self.cache.apply_changes(
                        &token_id,
                        &[change],
                        timestamp_ms,
                        raw.hash.clone(),
                    );
                    if applied {
                        let event = BookEvent {
                            token_id,
                            kind: BookEventKind::Diff,
                        };
                        if tx.send(event).await.is_err() {
                            return false;
                        }
                    }
                }
                true
            }
            WsEvent::Unknown => true,
        }
    }
}
