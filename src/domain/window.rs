//! Time-boxed market window.

use std::fmt;
use std::time::Duration;

use super::id::{MarketId, TokenId};

/// Fixed window length for the 15-minute up/down pair.
pub const WINDOW_SECS: i64 = 900;

/// Remaining life of a window at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRemaining {
    Open(Duration),
    Closed,
    /// The window start could not be derived from the slug.
    Unknown,
}

impl TimeRemaining {
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(d) => write!(f, "{}m {}s", d.as_secs() / 60, d.as_secs() % 60),
            Self::Closed => write!(f, "closed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One tradable instrument pair and its settlement window.
///
/// Immutable; rollover constructs a replacement rather than mutating the
/// active window in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketWindow {
    slug: String,
    market_id: MarketId,
    up_token: TokenId,
    down_token: TokenId,
    window_start: Option<i64>,
}

impl MarketWindow {
    #[must_use]
    pub fn new(
        slug: impl Into<String>,
        market_id: MarketId,
        up_token: TokenId,
        down_token: TokenId,
    ) -> Self {
        let slug = slug.into();
        let window_start = parse_window_start(&slug);
        Self {
            slug,
            market_id,
            up_token,
            down_token,
            window_start,
        }
    }

    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    #[must_use]
    pub const fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    #[must_use]
    pub const fn up_token(&self) -> &TokenId {
        &self.up_token
    }

    #[must_use]
    pub const fn down_token(&self) -> &TokenId {
        &self.down_token
    }

    /// Unix timestamp the window opened at, when the slug encodes one.
    #[must_use]
    pub const fn window_start(&self) -> Option<i64> {
        self.window_start
    }

    /// Unix timestamp the window settles at.
    #[must_use]
    pub fn window_end(&self) -> Option<i64> {
        self.window_start.map(|s| s + WINDOW_SECS)
    }

    /// Remaining life of the window at `now_unix`.
    #[must_use]
    pub fn time_remaining(&self, now_unix: i64) -> TimeRemaining {
        match self.window_end() {
            Some(end) if now_unix >= end => TimeRemaining::Closed,
            Some(end) => TimeRemaining::Open(Duration::from_secs((end - now_unix) as u64)),
            None => TimeRemaining::Unknown,
        }
    }

    #[must_use]
    pub fn is_closed(&self, now_unix: i64) -> bool {
        self.time_remaining(now_unix).is_closed()
    }
}

/// Extract the window-start timestamp from a `<prefix>-<unix>` slug.
#[must_use]
pub fn parse_window_start(slug: &str) -> Option<i64> {
    let (_, suffix) = slug.rsplit_once('-')?;
    suffix.parse::<i64>().ok().filter(|ts| *ts > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(slug: &str) -> MarketWindow {
        MarketWindow::new(
            slug,
            MarketId::from("m1"),
            TokenId::from("up"),
            TokenId::from("down"),
        )
    }

    #[test]
    fn parses_window_start_from_slug() {
        let w = window("btc-updown-15m-1754640000");
        assert_eq!(w.window_start(), Some(1_754_640_000));
        assert_eq!(w.window_end(), Some(1_754_640_000 + 900));
    }

    #[test]
    fn slug_without_timestamp_has_unknown_remaining() {
        let w = window("some-market");
        assert_eq!(w.window_start(), None);
        assert_eq!(w.time_remaining(0), TimeRemaining::Unknown);
        assert!(!w.is_closed(i64::MAX));
    }

    #[test]
    fn closes_exactly_at_window_end() {
        let start = 1_754_640_000;
        let w = window(&format!("btc-updown-15m-{start}"));

        assert!(!w.is_closed(start + 899));
        assert!(w.is_closed(start + 900));
        assert!(w.is_closed(start + 901));
    }

    #[test]
    fn remaining_duration_counts_down() {
        let start = 1_754_640_000;
        let w = window(&format!("btc-updown-15m-{start}"));

        match w.time_remaining(start + 300) {
            TimeRemaining::Open(d) => assert_eq!(d.as_secs(), 600),
            other => panic!("expected open window, got {other:?}"),
        }
    }

    #[test]
    fn remaining_formats_as_minutes_and_seconds() {
        let start = 1_754_640_000;
        let w = window(&format!("btc-updown-15m-{start}"));
        assert_eq!(w.time_remaining(start + 270).to_string(), "10m 30s");
        assert_eq!(w.time_remaining(start + 900).to_string(), "closed");
    }
}
