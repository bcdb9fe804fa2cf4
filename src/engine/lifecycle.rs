//! Window lifecycle: per-window accounting, close-out summary, rollover.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use super::executor::ExecutionOutcome;
use crate::domain::MarketWindow;
use crate::exchange::{PairDiscovery, TradingApi};

/// Price at which one side is treated as effectively settled.
const SETTLED_THRESHOLD: Decimal = dec!(0.99);

/// Running totals for one window, owned by the strategy session.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub opportunities_found: u64,
    pub trades_executed: u64,
    pub total_invested: Decimal,
    pub total_shares_bought: Decimal,
}

impl SessionStats {
    /// Fold one execution outcome into the totals.
    pub fn record(&mut self, outcome: &ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Skipped => {}
            ExecutionOutcome::BothFilled { size, invested, .. } => {
                self.opportunities_found += 1;
                self.trades_executed += 1;
                self.total_invested += invested;
                self.total_shares_bought += size * dec!(2);
            }
            ExecutionOutcome::Failed { .. } | ExecutionOutcome::Unwound { .. } => {
                self.opportunities_found += 1;
            }
        }
    }

    /// Settlement payout for the pairs held: each pair pays exactly 1.
    #[must_use]
    pub fn expected_payout(&self) -> Decimal {
        self.total_shares_bought / dec!(2)
    }
}

/// Final accounting for a closed window.
#[derive(Debug, Clone)]
pub struct WindowSummary {
    pub slug: String,
    pub opportunities_found: u64,
    pub trades_executed: u64,
    pub total_shares_bought: Decimal,
    pub total_invested: Decimal,
    pub expected_payout: Decimal,
    pub expected_profit: Decimal,
    pub profit_pct: Decimal,
    /// Best-effort settlement direction estimate, when the books still show one.
    pub settlement: Option<String>,
}

/// Tracks window close and drives rollover to the next pair.
pub struct MarketLifecycle {
    api: Arc<dyn TradingApi>,
    discovery: Arc<dyn PairDiscovery>,
}

impl MarketLifecycle {
    #[must_use]
    pub fn new(api: Arc<dyn TradingApi>, discovery: Arc<dyn PairDiscovery>) -> Self {
        Self { api, discovery }
    }

    /// Produce and log the final summary for a closed window.
    pub async fn close_out(&self, window: &MarketWindow, stats: &SessionStats) -> WindowSummary {
        let settlement = self.settlement_estimate(window).await;

        let expected_payout = stats.expected_payout();
        let expected_profit = expected_payout - stats.total_invested;
        let profit_pct = if stats.total_invested > Decimal::ZERO {
            expected_profit / stats.total_invested * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };

        let summary = WindowSummary {
            slug: window.slug().to_string(),
            opportunities_found: stats.opportunities_found,
            trades_executed: stats.trades_executed,
            total_shares_bought: stats.total_shares_bought,
            total_invested: stats.total_invested,
            expected_payout,
            expected_profit,
            profit_pct,
            settlement,
        };

        info!(
            slug = %summary.slug,
            settlement = summary.settlement.as_deref().unwrap_or("unknown"),
            opportunities = summary.opportunities_found,
            trades = summary.trades_executed,
            shares = %summary.total_shares_bought,
            invested = %summary.total_invested,
            expected_payout = %summary.expected_payout,
            expected_profit = %summary.expected_profit,
            profit_pct = %summary.profit_pct,
            "Window closed"
        );

        summary
    }

    /// Estimate which side settled from where the asks ended up.
    async fn settlement_estimate(&self, window: &MarketWindow) -> Option<String> {
        let up_book = self.api.get_order_book(window.up_token()).await.ok()?;
        let down_book = self.api.get_order_book(window.down_token()).await.ok()?;

        let up_ask = up_book.best_ask()?.price();
        let down_ask = down_book.best_ask()?.price();

        if up_ask >= SETTLED_THRESHOLD {
            return Some("UP".into());
        }
        if down_ask >= SETTLED_THRESHOLD {
            return Some("DOWN".into());
        }
        let (side, price) = if up_ask > down_ask {
            ("UP", up_ask)
        } else {
            ("DOWN", down_ask)
        };
        Some(format!(
            "{side} leading ({}%)",
            (price * Decimal::ONE_HUNDRED).round()
        ))
    }

    /// Discover the next window's pair.
    ///
    /// Returns `None` when discovery fails or still reports the current
    /// window; callers wait and retry rather than treating this as fatal.
    pub async fn next_window(&self, current_slug: &str) -> Option<MarketWindow> {
        match self.discovery.find_active_pair().await {
            Ok(window) if window.slug() != current_slug => {
                info!(slug = %window.slug(), "Rolling over to next window");
                Some(window)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Rollover discovery failed; will retry");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderId;

    fn both_filled(size: Decimal, invested: Decimal) -> ExecutionOutcome {
        ExecutionOutcome::BothFilled {
            order_ids: vec![OrderId::new("a"), OrderId::new("b")],
            size,
            invested,
        }
    }

    #[test]
    fn skipped_outcomes_do_not_count() {
        let mut stats = SessionStats::default();
        stats.record(&ExecutionOutcome::Skipped);
        assert_eq!(stats.opportunities_found, 0);
        assert_eq!(stats.trades_executed, 0);
    }

    #[test]
    fn filled_trades_accumulate() {
        let mut stats = SessionStats::default();
        stats.record(&both_filled(dec!(50), dec!(47.50)));
        stats.record(&both_filled(dec!(50), dec!(46.00)));

        assert_eq!(stats.opportunities_found, 2);
        assert_eq!(stats.trades_executed, 2);
        assert_eq!(stats.total_invested, dec!(93.50));
        assert_eq!(stats.total_shares_bought, dec!(200));
        assert_eq!(stats.expected_payout(), dec!(100));
    }

    #[test]
    fn failures_count_as_opportunities_only() {
        let mut stats = SessionStats::default();
        stats.record(&ExecutionOutcome::Failed {
            reason: "both orders rejected".into(),
        });

        assert_eq!(stats.opportunities_found, 1);
        assert_eq!(stats.trades_executed, 0);
        assert_eq!(stats.total_invested, Decimal::ZERO);
    }
}
