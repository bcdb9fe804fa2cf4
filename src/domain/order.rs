//! Order state classification.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::id::OrderId;
use super::money::Volume;

/// Tolerance when comparing filled size against requested size.
const FILL_EPSILON: Decimal = dec!(0.000000001);

/// Classified order status.
///
/// `Timeout` is synthetic: it marks a poll that gave up before the venue
/// reported a terminal state, and the engine treats it as "not filled".
/// `Error` marks a failed status read and is also non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    Error,
    Timeout,
}

impl OrderStatus {
    /// Map a venue-reported status string onto the classification.
    ///
    /// Unknown statuses are treated as still pending.
    #[must_use]
    pub fn from_venue(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "filled" => Self::Filled,
            "canceled" | "cancelled" => Self::Canceled,
            "rejected" => Self::Rejected,
            "expired" => Self::Expired,
            "partially_filled" | "partially filled" => Self::PartiallyFilled,
            _ => Self::Pending,
        }
    }

    /// Whether the venue will report no further changes for this status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected | Self::Expired)
    }
}

/// Snapshot of one order's progress, produced by status polling.
#[derive(Debug, Clone)]
pub struct OrderState {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub filled_size: Volume,
    pub requested_size: Volume,
}

impl OrderState {
    /// A synthetic state for a leg whose submission produced no order ID.
    #[must_use]
    pub fn rejected(order_id: OrderId, requested_size: Volume) -> Self {
        Self {
            order_id,
            status: OrderStatus::Rejected,
            filled_size: Decimal::ZERO,
            requested_size,
        }
    }

    /// Whether this order counts as filled: venue says so, or the observed
    /// filled size covers the request.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
            || self.filled_size + FILL_EPSILON >= self.requested_size
    }

    /// Whether polling can stop for this order.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal() || self.is_filled()
    }
}
