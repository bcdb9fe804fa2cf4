//! Incrementally-maintained order book replica.
//!
//! A [`BookState`] is rebuilt from a full snapshot and then patched by
//! per-level diffs as they arrive from the market data feed. Levels with a
//! non-positive size are removed, never stored. The [`BookCache`] holds one
//! replica per tracked token behind a read-write lock; the feed is the only
//! writer, detectors take cheap cloned snapshots.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use rust_decimal::Decimal;

use super::id::TokenId;
use super::money::{Price, Volume};

/// A single price level in the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    price: Price,
    size: Volume,
}

impl PriceLevel {
    /// Create a new price level.
    #[must_use]
    pub const fn new(price: Price, size: Volume) -> Self {
        Self { price, size }
    }

    /// Get the price.
    #[must_use]
    pub const fn price(&self) -> Price {
        self.price
    }

    /// Get the size/volume.
    #[must_use]
    pub const fn size(&self) -> Volume {
        self.size
    }
}

/// Which side of the book a level change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bid,
    Ask,
}

/// Order book replica for a single token.
///
/// Prices are unique per side; `BTreeMap` keeps each side ordered so level
/// views never re-sort.
#[derive(Debug, Clone, Default)]
pub struct BookState {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_timestamp_ms: Option<i64>,
    last_hash: Option<String>,
}

impl BookState {
    /// Create a new empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire level set from a full snapshot.
    ///
    /// Levels with size <= 0 are dropped on ingestion.
    pub fn apply_snapshot(
        &mut self,
        bids: impl IntoIterator<Item = PriceLevel>,
        asks: impl IntoIterator<Item = PriceLevel>,
        timestamp_ms: Option<i64>,
        hash: Option<String>,
    ) {
        self.bids.clear();
        self.asks.clear();
        for level in bids {
            if level.size > Decimal::ZERO {
                self.bids.insert(level.price, level.size);
            }
        }
        for level in asks {
            if level.size > Decimal::ZERO {
                self.asks.insert(level.price, level.size);
            }
        }
        if timestamp_ms.is_some() {
            self.last_timestamp_ms = timestamp_ms;
        }
        if hash.is_some() {
            self.last_hash = hash;
        }
    }

    /// Apply one incremental level change.
    ///
    /// A non-positive size removes the level, otherwise it is inserted or
    /// overwritten. Changes are applied in arrival order, no coalescing.
    pub fn apply_change(&mut self, side: BookSide, price: Price, size: Volume) {
        let book = match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        };
        if size <= Decimal::ZERO {
            book.remove(&price);
        } else {
            book.insert(price, size);
        }
    }

    /// Record feed metadata carried on an incremental update.
    pub fn touch(&mut self, timestamp_ms: Option<i64>, hash: Option<String>) {
        if timestamp_ms.is_some() {
            self.last_timestamp_ms = timestamp_ms;
        }
        if hash.is_some() {
            self.last_hash = hash;
        }
    }

    /// Bid levels sorted descending by price, filtered to size > 0.
    #[must_use]
    pub fn bid_levels(&self) -> Vec<PriceLevel> {
        self.bids
            .iter()
            .rev()
            .map(|(p, s)| PriceLevel::new(*p, *s))
            .collect()
    }

    /// Ask levels sorted ascending by price, filtered to size > 0.
    #[must_use]
    pub fn ask_levels(&self) -> Vec<PriceLevel> {
        self.asks
            .iter()
            .map(|(p, s)| PriceLevel::new(*p, *s))
            .collect()
    }

    /// Best bid (highest buy price).
    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .next_back()
            .map(|(p, s)| PriceLevel::new(*p, *s))
    }

    /// Best ask (lowest sell price).
    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.iter().next().map(|(p, s)| PriceLevel::new(*p, *s))
    }

    /// Whether the book presents a crossed state (`best_ask < best_bid`).
    ///
    /// The feed may deliver transiently crossed books; callers must treat a
    /// crossed book as stale rather than as a signal.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask.price() < bid.price(),
            _ => false,
        }
    }

    /// Whether the book has any resting asks.
    ///
    /// An empty ask side means "not ready", never "zero price".
    #[must_use]
    pub fn has_asks(&self) -> bool {
        !self.asks.is_empty()
    }

    /// Timestamp of the last applied message, if any.
    #[must_use]
    pub const fn last_timestamp_ms(&self) -> Option<i64> {
        self.last_timestamp_ms
    }

    /// Integrity hash of the last applied message, if any.
    #[must_use]
    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }
}

/// Thread-safe cache of book replicas for a fixed token set.
///
/// Owned by the market data feed (the only writer); all other components
/// read cloned snapshots.
pub struct BookCache {
    books: RwLock<HashMap<TokenId, BookState>>,
}

impl BookCache {
    /// Create a cache pre-seeded with empty books for the tracked tokens.
    #[must_use]
    pub fn for_tokens(tokens: &[TokenId]) -> Self {
        let books = tokens
            .iter()
            .map(|t| (t.clone(), BookState::new()))
            .collect();
        Self {
            books: RwLock::new(books),
        }
    }

    /// Whether the given token is tracked by this cache.
    #[must_use]
    pub fn contains(&self, token_id: &TokenId) -> bool {
        self.books.read().contains_key(token_id)
    }

    /// Replace a tracked token's book from a full snapshot.
    ///
    /// Returns false if the token is untracked (the message is dropped).
    pub fn apply_snapshot(
        &self,
        token_id: &TokenId,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        timestamp_ms: Option<i64>,
        hash: Option<String>,
    ) -> bool {
        let mut books = self.books.write();
        match books.get_mut(token_id) {
            Some(book) => {
                book.apply_snapshot(bids, asks, timestamp_ms, hash);
                true
            }
            None => false,
        }
    }

    /// Apply incremental changes to a tracked token's book.
    ///
    /// Returns false if the token is untracked (the message is dropped).
    pub fn apply_changes(
        &self,
        token_id: &TokenId,
        changes: &[(BookSide, Price, Volume)],
        timestamp_ms: Option<i64>,
        hash: Option<String>,
    ) -> bool {
        let mut books = self.books.write();
        match books.get_mut(token_id) {
            Some(book) => {
                for (side, price, size) in changes {
                    book.apply_change(*side, *price, *size);
                }
                book.touch(timestamp_ms, hash);
                true
            }
            None => false,
        }
    }

    /// Get a snapshot of one book.
    #[must_use]
    pub fn snapshot(&self, token_id: &TokenId) -> Option<BookState> {
        self.books.read().get(token_id).cloned()
    }

    /// Get snapshots of two books atomically.
    #[must_use]
    pub fn pair(
        &self,
        token_a: &TokenId,
        token_b: &TokenId,
    ) -> (Option<BookState>, Option<BookState>) {
        let books = self.books.read();
        (books.get(token_a).cloned(), books.get(token_b).cloned())
    }
}
