//! Event notifications.
//!
//! The engine emits named events for passive consumers (logging, dashboards).
//! Emission must never block the decision loop, so [`Notifier::notify`] is
//! synchronous fire-and-forget; the channel-backed implementation uses an
//! unbounded sender and tolerates a dropped receiver.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::{OrderId, Opportunity};

/// Opportunity detection payload.
#[derive(Debug, Clone)]
pub struct OpportunityEvent {
    pub slug: String,
    pub total_cost: Decimal,
    pub profit_per_share: Decimal,
    pub profit_pct: Decimal,
    pub order_size: Decimal,
    pub expected_profit: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl OpportunityEvent {
    #[must_use]
    pub fn from_opportunity(slug: &str, opp: &Opportunity) -> Self {
        Self {
            slug: slug.to_string(),
            total_cost: opp.total_cost,
            profit_per_share: opp.profit_per_share,
            profit_pct: opp.profit_pct,
            order_size: opp.order_size,
            expected_profit: opp.expected_profit,
            timestamp: opp.timestamp,
        }
    }
}

/// Completed two-leg trade payload.
#[derive(Debug, Clone)]
pub struct TradeEvent {
    pub slug: String,
    pub order_ids: Vec<OrderId>,
    pub size: Decimal,
    pub invested: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Failed execution attempt payload.
#[derive(Debug, Clone)]
pub struct TradeFailureEvent {
    pub slug: String,
    pub reason: String,
    pub order_ids: Vec<OrderId>,
}

/// Per-evaluation market snapshot payload.
#[derive(Debug, Clone)]
pub struct MarketUpdateEvent {
    pub slug: String,
    pub up_ask: Option<Decimal>,
    pub down_ask: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub seconds_remaining: Option<u64>,
}

/// Events emitted by the strategy session.
#[derive(Debug, Clone)]
pub enum Event {
    OpportunityFound(OpportunityEvent),
    TradeExecuted(TradeEvent),
    TradeFailed(TradeFailureEvent),
    MarketUpdate(MarketUpdateEvent),
}

/// Passive event consumer. `notify` must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: Event);
}

/// Notifier that renders events as structured log lines.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: Event) {
        match event {
            Event::OpportunityFound(e) => info!(
                slug = %e.slug,
                total_cost = %e.total_cost,
                profit_per_share = %e.profit_per_share,
                profit_pct = %e.profit_pct,
                order_size = %e.order_size,
                expected_profit = %e.expected_profit,
                "Opportunity found"
            ),
            Event::TradeExecuted(e) => info!(
                slug = %e.slug,
                orders = ?e.order_ids.iter().map(OrderId::as_str).collect::<Vec<_>>(),
                size = %e.size,
                invested = %e.invested,
                "Trade executed"
            ),
            Event::TradeFailed(e) => warn!(
                slug = %e.slug,
                reason = %e.reason,
                orders = ?e.order_ids.iter().map(OrderId::as_str).collect::<Vec<_>>(),
                "Trade failed"
            ),
            Event::MarketUpdate(_) => {}
        }
    }
}

/// Notifier that forwards events into an unbounded channel.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelNotifier {
    /// Create the notifier and the receiving half.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: Event) {
        // A closed receiver just means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

/// Fan-out to several notifiers.
pub struct FanoutNotifier {
    sinks: Vec<std::sync::Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    #[must_use]
    pub fn new(sinks: Vec<std::sync::Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, event: Event) {
        for sink in &self.sinks {
            sink.notify(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn failure() -> Event {
        Event::TradeFailed(TradeFailureEvent {
            slug: "btc-updown-15m-1".into(),
            reason: "partial fill".into(),
            order_ids: vec![OrderId::new("o1")],
        })
    }

    #[test]
    fn channel_notifier_delivers_events() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(failure());

        match rx.try_recv().unwrap() {
            Event::TradeFailed(e) => assert_eq!(e.reason, "partial fill"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn channel_notifier_survives_dropped_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        // must not panic or block
        notifier.notify(failure());
    }

    #[test]
    fn fanout_delivers_to_all_sinks() {
        let (a, mut rx_a) = ChannelNotifier::new();
        let (b, mut rx_b) = ChannelNotifier::new();
        let fanout =
            FanoutNotifier::new(vec![std::sync::Arc::new(a), std::sync::Arc::new(b)]);

        fanout.notify(Event::MarketUpdate(MarketUpdateEvent {
            slug: "s".into(),
            up_ask: Some(dec!(0.4)),
            down_ask: Some(dec!(0.5)),
            total_cost: Some(dec!(0.9)),
            seconds_remaining: Some(100),
        }));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }
}
