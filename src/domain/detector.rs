//! Paired-buy opportunity detection.

use chrono::Utc;
use rust_decimal::Decimal;

use super::book::BookState;
use super::fill::estimate_fill;
use super::money::{Price, Volume};
use super::opportunity::Opportunity;

/// Detect a paired-buy opportunity across the UP and DOWN books.
///
/// Both legs must be fillable at `order_size`, and the combined worst-case
/// cost must not exceed `cost_ceiling`. A crossed book on either side is
/// treated as a stale snapshot, not a signal. All degenerate inputs (empty
/// books, zero size) resolve to `None`.
#[must_use]
pub fn detect(
    book_up: &BookState,
    book_down: &BookState,
    order_size: Volume,
    cost_ceiling: Price,
) -> Option<Opportunity> {
    if book_up.is_crossed() || book_down.is_crossed() {
        return None;
    }

    let fill_up = estimate_fill(&book_up.ask_levels(), order_size)?;
    let fill_down = estimate_fill(&book_down.ask_levels(), order_size)?;

    let price_up = fill_up.worst_price;
    let price_down = fill_down.worst_price;
    let total_cost = price_up + price_down;

    if total_cost > cost_ceiling {
        return None;
    }

    let profit_per_share = Decimal::ONE - total_cost;
    let profit_pct = if total_cost > Decimal::ZERO {
        profit_per_share / total_cost * Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    };
    let total_investment = total_cost * order_size;
    let expected_payout = Decimal::ONE * order_size;
    let expected_profit = expected_payout - total_investment;

    Some(Opportunity {
        leg_up: fill_up,
        leg_down: fill_down,
        price_up,
        price_down,
        total_cost,
        profit_per_share,
        profit_pct,
        order_size,
        total_investment,
        expected_payout,
        expected_profit,
        timestamp: Utc::now(),
    })
}
