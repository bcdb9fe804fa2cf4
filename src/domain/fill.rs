//! Depth-weighted fill estimation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::book::PriceLevel;
use super::money::{Price, Volume};

/// Completeness tolerance when comparing accumulated depth against the
/// target size.
const FILL_EPSILON: Decimal = dec!(0.000000001);

/// Result of walking the ask ladder for a target size.
///
/// `worst_price` is the price of the last level consumed; it is the
/// conservative limit price for execution. `vwap` is informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillEstimate {
    /// Total size consumed (>= target).
    pub filled: Volume,
    /// Volume-weighted average price across consumed levels.
    pub vwap: Price,
    /// Price of the least favorable level consumed.
    pub worst_price: Price,
    /// Price of the first (most favorable) level.
    pub best_price: Price,
    /// Total cost of the consumed depth.
    pub total_cost: Price,
}

/// Estimate the cost of buying `target_size` against `asks`.
///
/// `asks` must be ordered ascending by price (as [`BookState::ask_levels`]
/// returns them). Returns `None` when the target is non-positive or the
/// ladder does not hold enough depth; a partial fill is never reported as a
/// valid estimate.
///
/// [`BookState::ask_levels`]: super::book::BookState::ask_levels
#[must_use]
pub fn estimate_fill(asks: &[PriceLevel], target_size: Volume) -> Option<FillEstimate> {
    if target_size <= Decimal::ZERO {
        return None;
    }

    let best_price = asks.first()?.price();
    let mut filled = Decimal::ZERO;
    let mut cost = Decimal::ZERO;
    let mut worst_price = best_price;

    for level in asks {
        if filled >= target_size {
            break;
        }
        let take = level.size().min(target_size - filled);
        cost += take * level.price();
        filled += take;
        worst_price = level.price();
    }

    if filled + FILL_EPSILON < target_size {
        return None;
    }

    Some(FillEstimate {
        filled,
        vwap: cost / filled,
        worst_price,
        best_price,
        total_cost: cost,
    })
}
