//! Detected arbitrage opportunity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::fill::FillEstimate;
use super::money::{Price, Volume};

/// A paired-buy opportunity: both legs simultaneously fillable under the
/// cost ceiling.
///
/// Immutable once created. Limit prices are each leg's worst fill price, not
/// the vwap, so the quoted cost is never exceeded at execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    /// Fill estimate for the UP leg.
    pub leg_up: FillEstimate,
    /// Fill estimate for the DOWN leg.
    pub leg_down: FillEstimate,
    /// Limit price for the UP leg (worst fill price).
    pub price_up: Price,
    /// Limit price for the DOWN leg (worst fill price).
    pub price_down: Price,
    /// Worst-case combined cost per share pair.
    pub total_cost: Price,
    /// Guaranteed profit per share pair at settlement.
    pub profit_per_share: Price,
    /// Profit as a percentage of cost.
    pub profit_pct: Decimal,
    /// Target size per leg.
    pub order_size: Volume,
    /// `total_cost * order_size`.
    pub total_investment: Decimal,
    /// Settlement payout (`1 * order_size`).
    pub expected_payout: Decimal,
    /// `expected_payout - total_investment`.
    pub expected_profit: Decimal,
    /// Detection time.
    pub timestamp: DateTime<Utc>,
}
