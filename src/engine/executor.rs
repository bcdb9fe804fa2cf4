//! Two-leg execution engine.
//!
//! The venue offers no atomicity across the two legs, so the engine submits
//! both, polls each to a terminal state within a bounded timeout, and
//! repairs asymmetric outcomes itself: the still-open order on an unfilled
//! leg is canceled and the filled leg is sold back at the current best bid.
//!
//! A cooldown gate is the sole serialization mechanism; at most one attempt
//! is ever in flight, and an attempt that has submitted orders always runs
//! to completion, including its unwind.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::config::{ExecutionConfig, TradingConfig};
use crate::domain::{
    MarketWindow, Opportunity, OrderId, OrderState, OrderStatus, TokenId, Volume,
};
use crate::exchange::{OrderSide, OrderSpec, SubmitResult, TimeInForce, TradingApi};
use crate::notify::{Event, Notifier, TradeEvent, TradeFailureEvent};

/// Outcome of one execution attempt.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Rejected by the cooldown gate; nothing was submitted.
    Skipped,
    /// Both legs filled; the spread is locked in.
    BothFilled {
        order_ids: Vec<OrderId>,
        size: Volume,
        invested: Decimal,
    },
    /// Attempt aborted or no leg filled; no position was taken.
    Failed { reason: String },
    /// Exactly one leg filled and the unwind protocol ran.
    Unwound {
        filled_token: TokenId,
        reason: String,
        unwind_placed: bool,
    },
}

/// Executes detected opportunities against the trading API.
pub struct ExecutionEngine {
    api: Arc<dyn TradingApi>,
    notifier: Arc<dyn Notifier>,
    trading: TradingConfig,
    execution: ExecutionConfig,
    last_attempt: Option<Instant>,
    cached_balance: Option<Decimal>,
    sim_balance: Decimal,
}

impl ExecutionEngine {
    #[must_use]
    pub fn new(
        api: Arc<dyn TradingApi>,
        notifier: Arc<dyn Notifier>,
        trading: TradingConfig,
        execution: ExecutionConfig,
    ) -> Self {
        let sim_balance = trading.sim_balance;
        Self {
            api,
            notifier,
            trading,
            execution,
            last_attempt: None,
            cached_balance: None,
            sim_balance,
        }
    }

    /// Remaining simulated cash (dry-run mode).
    #[must_use]
    pub const fn sim_balance(&self) -> Decimal {
        self.sim_balance
    }

    /// Run one execution attempt for a detected opportunity.
    pub async fn execute(
        &mut self,
        window: &MarketWindow,
        opportunity: &Opportunity,
    ) -> ExecutionOutcome {
        if let Some(last) = self.last_attempt {
            let cooldown = Duration::from_secs(self.trading.cooldown_secs);
            if last.elapsed() < cooldown {
                return ExecutionOutcome::Skipped;
            }
        }
        self.last_attempt = Some(Instant::now());

        info!(
            slug = %window.slug(),
            price_up = %opportunity.price_up,
            price_down = %opportunity.price_down,
            vwap_up = %opportunity.leg_up.vwap,
            vwap_down = %opportunity.leg_down.vwap,
            total_cost = %opportunity.total_cost,
            profit_per_share = %opportunity.profit_per_share,
            profit_pct = %opportunity.profit_pct,
            order_size = %opportunity.order_size,
            expected_profit = %opportunity.expected_profit,
            "Executing arbitrage opportunity"
        );

        if self.trading.dry_run {
            return self.execute_simulated(window, opportunity);
        }
        self.execute_live(window, opportunity).await
    }

    fn execute_simulated(
        &mut self,
        window: &MarketWindow,
        opportunity: &Opportunity,
    ) -> ExecutionOutcome {
        if self.sim_balance < opportunity.total_investment {
            let reason = format!(
                "insufficient simulated balance: need {} but have {}",
                opportunity.total_investment, self.sim_balance
            );
            warn!(slug = %window.slug(), %reason, "Skipping simulated trade");
            self.notify_failure(window, &reason, vec![]);
            return ExecutionOutcome::Failed { reason };
        }

        self.sim_balance -= opportunity.total_investment;
        let order_ids = vec![OrderId::new("dry-run-up"), OrderId::new("dry-run-down")];
        self.notify_executed(
            window,
            order_ids.clone(),
            opportunity.order_size,
            opportunity.total_investment,
        );
        ExecutionOutcome::BothFilled {
            order_ids,
            size: opportunity.order_size,
            invested: opportunity.total_investment,
        }
    }

    async fn execute_live(
        &mut self,
        window: &MarketWindow,
        opportunity: &Opportunity,
    ) -> ExecutionOutcome {
        // The venue enforces a minimum notional per leg; raise the size if
        // needed and recost at the already-estimated limit prices.
        let min_leg_price = opportunity.price_up.min(opportunity.price_down);
        let min_size = if min_leg_price > Decimal::ZERO {
            (Decimal::ONE / min_leg_price).ceil()
        } else {
            opportunity.order_size
        };
        let size = opportunity.order_size.max(min_size);
        let invested = opportunity.total_cost * size;

        let balance = match self.cached_balance {
            Some(balance) => balance,
            None => match self.api.get_balance().await {
                Ok(balance) => balance,
                Err(e) => {
                    warn!(error = %e, "Balance fetch failed; treating as zero");
                    Decimal::ZERO
                }
            },
        };
        self.cached_balance = Some(balance);

        let required = invested * self.trading.safety_multiplier;
        if balance < required {
            let reason = format!("insufficient balance: need {required} but have {balance}");
            warn!(slug = %window.slug(), %reason, "Aborting attempt");
            self.notify_failure(window, &reason, vec![]);
            return ExecutionOutcome::Failed { reason };
        }

        let orders = [
            OrderSpec {
                token_id: window.up_token().clone(),
                side: OrderSide::Buy,
                price: opportunity.price_up,
                size,
            },
            OrderSpec {
                token_id: window.down_token().clone(),
                side: OrderSide::Buy,
                price: opportunity.price_down,
                size,
            },
        ];

        let results = match self
            .api
            .submit_orders(&orders, self.trading.time_in_force)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                let reason = format!("submission failed: {e}");
                error!(slug = %window.slug(), %reason, "Aborting attempt");
                self.notify_failure(window, &reason, vec![]);
                return ExecutionOutcome::Failed { reason };
            }
        };

        let invalid_signature = results.iter().any(SubmitResult::is_invalid_signature);
        let mut order_ids: Vec<Option<OrderId>> = results
            .iter()
            .take(2)
            .map(|r| r.order_id().cloned())
            .collect();
        order_ids.resize(2, None);

        if invalid_signature {
            error!(
                "Order rejected with invalid signature; check signature type, funder \
                 address, and regenerate API credentials"
            );
            let reason = "invalid signature".to_string();
            self.notify_failure(window, &reason, vec![]);
            return ExecutionOutcome::Failed { reason };
        }

        if order_ids.iter().all(Option::is_none) {
            let reason = "both orders rejected".to_string();
            warn!(slug = %window.slug(), "Both orders rejected");
            self.notify_failure(window, &reason, vec![]);
            return ExecutionOutcome::Failed { reason };
        }

        let (up_state, down_state) = tokio::join!(
            self.wait_for_terminal(order_ids[0].clone(), size),
            self.wait_for_terminal(order_ids[1].clone(), size),
        );

        let up_filled = up_state.is_filled();
        let down_filled = down_state.is_filled();

        if up_filled && down_filled {
            let ids: Vec<OrderId> = order_ids.into_iter().flatten().collect();
            self.cached_balance = self.api.get_balance().await.ok();
            self.notify_executed(window, ids.clone(), size, invested);
            return ExecutionOutcome::BothFilled {
                order_ids: ids,
                size,
                invested,
            };
        }

        // Cancel whatever is still open on the unfilled leg(s), best-effort.
        let open_ids: Vec<OrderId> = [(up_filled, &order_ids[0]), (down_filled, &order_ids[1])]
            .into_iter()
            .filter(|(filled, _)| !*filled)
            .filter_map(|(_, id)| id.clone())
            .collect();
        if !open_ids.is_empty() {
            if let Err(e) = self.api.cancel_orders(&open_ids).await {
                warn!(error = %e, "Cancel of unfilled leg failed");
            }
        }

        let known_ids: Vec<OrderId> = order_ids.iter().flatten().cloned().collect();

        if !up_filled && !down_filled {
            let reason = "neither leg filled before timeout".to_string();
            warn!(slug = %window.slug(), %reason, "Attempt failed");
            self.notify_failure(window, &reason, known_ids);
            return ExecutionOutcome::Failed { reason };
        }

        // Exactly one leg filled: report the deviation, then unwind.
        let (filled_token, filled_state) = if up_filled {
            (window.up_token(), &up_state)
        } else {
            (window.down_token(), &down_state)
        };
        let reason = "partial fill (one leg only)".to_string();
        warn!(
            slug = %window.slug(),
            token = %filled_token,
            filled_size = %filled_state.filled_size,
            "One leg filled without its counterpart; unwinding"
        );
        self.notify_failure(window, &reason, known_ids);

        let filled_size = if filled_state.filled_size > Decimal::ZERO {
            filled_state.filled_size
        } else {
            size
        };
        let unwind_placed = self.unwind(filled_token, filled_size).await;

        ExecutionOutcome::Unwound {
            filled_token: filled_token.clone(),
            reason,
            unwind_placed,
        }
    }

    /// Poll one order until it is terminal or the wait times out.
    ///
    /// A leg with no order ID (submission failed) is immediately a rejected,
    /// unfilled state. Failed status reads keep polling; timing out yields
    /// the synthetic `Timeout` classification.
    async fn wait_for_terminal(&self, order_id: Option<OrderId>, requested: Volume) -> OrderState {
        let Some(order_id) = order_id else {
            return OrderState::rejected(OrderId::new("unsubmitted"), requested);
        };

        let deadline =
            Instant::now() + Duration::from_secs(self.execution.order_timeout_secs);
        let poll_interval = Duration::from_millis(self.execution.order_poll_interval_ms);
        let mut last = OrderState {
            order_id: order_id.clone(),
            status: OrderStatus::Pending,
            filled_size: Decimal::ZERO,
            requested_size: requested,
        };

        while Instant::now() < deadline {
            match self.api.get_order_status(&order_id, requested).await {
                Ok(state) => {
                    if state.is_terminal() {
                        return state;
                    }
                    last = state;
                }
                Err(e) => {
                    warn!(order = %order_id, error = %e, "Order status read failed");
                    last.status = OrderStatus::Error;
                }
            }
            sleep(poll_interval).await;
        }

        last.status = OrderStatus::Timeout;
        last
    }

    /// Sell a stranded leg back at the current best bid.
    ///
    /// Immediate-or-cancel first, one resting retry on rejection. Failures
    /// are logged, never propagated; the position is left for manual or
    /// next-cycle handling. Returns whether a sell order was placed.
    async fn unwind(&self, token: &TokenId, size: Volume) -> bool {
        let book = match self.api.get_order_book(token).await {
            Ok(book) => book,
            Err(e) => {
                warn!(token = %token, error = %e, "Unwind book fetch failed; position left open");
                return false;
            }
        };

        let Some(bid) = book.best_bid() else {
            warn!(token = %token, "No bids to unwind into; position left open");
            return false;
        };

        let sell = OrderSpec {
            token_id: token.clone(),
            side: OrderSide::Sell,
            price: bid.price(),
            size,
        };
        info!(token = %token, price = %bid.price(), %size, "Unwinding filled leg at best bid");

        if self.try_sell(&sell, TimeInForce::Fak).await {
            info!(token = %token, "Unwind placed immediate-or-cancel");
            return true;
        }

        warn!(token = %token, "Immediate unwind rejected; retrying as resting order");
        if self.try_sell(&sell, TimeInForce::Gtc).await {
            info!(token = %token, "Unwind placed as resting order");
            return true;
        }

        warn!(token = %token, "Unwind failed; position left for manual handling");
        false
    }

    async fn try_sell(&self, sell: &OrderSpec, time_in_force: TimeInForce) -> bool {
        match self
            .api
            .submit_orders(std::slice::from_ref(sell), time_in_force)
            .await
        {
            Ok(results) => results.first().is_some_and(|r| r.order_id().is_some()),
            Err(e) => {
                warn!(error = %e, "Unwind submission failed");
                false
            }
        }
    }

    fn notify_executed(
        &self,
        window: &MarketWindow,
        order_ids: Vec<OrderId>,
        size: Volume,
        invested: Decimal,
    ) {
        self.notifier.notify(Event::TradeExecuted(TradeEvent {
            slug: window.slug().to_string(),
            order_ids,
            size,
            invested,
            timestamp: chrono::Utc::now(),
        }));
    }

    fn notify_failure(&self, window: &MarketWindow, reason: &str, order_ids: Vec<OrderId>) {
        self.notifier.notify(Event::TradeFailed(TradeFailureEvent {
            slug: window.slug().to_string(),
            reason: reason.to_string(),
            order_ids,
        }));
    }
}
