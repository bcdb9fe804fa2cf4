//! Execution engine tests against a scripted trading API.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use pairlock::config::{ExecutionConfig, TradingConfig};
use pairlock::domain::{
    detect, BookSide, BookState, MarketId, MarketWindow, Opportunity, OrderId, OrderState,
    OrderStatus, TokenId, Volume,
};
use pairlock::engine::{ExecutionEngine, ExecutionOutcome};
use pairlock::error::Result;
use pairlock::exchange::{OrderSide, OrderSpec, SubmitResult, TimeInForce, TradingApi};
use pairlock::notify::{ChannelNotifier, Event};

/// Scripted [`TradingApi`] that records every call.
#[derive(Default)]
struct MockApi {
    balance: Decimal,
    /// Results returned for the two-leg buy submission.
    buy_results: Vec<SubmitResult>,
    /// Per-order-id status script: (status, filled_size). Unknown orders
    /// poll as pending and never fill.
    statuses: HashMap<String, (OrderStatus, Decimal)>,
    /// Book returned for unwind fetches.
    unwind_book: Option<BookState>,
    /// Results popped per sell submission; empty means accept.
    sell_results: Mutex<Vec<SubmitResult>>,
    log: Mutex<CallLog>,
}

#[derive(Default)]
struct CallLog {
    submissions: Vec<(Vec<OrderSpec>, TimeInForce)>,
    cancels: Vec<Vec<OrderId>>,
    status_polls: Vec<OrderId>,
    book_fetches: Vec<TokenId>,
}

impl MockApi {
    fn sell_submissions(&self) -> Vec<(OrderSpec, TimeInForce)> {
        self.log
            .lock()
            .submissions
            .iter()
            .filter(|(orders, _)| orders.iter().any(|o| o.side == OrderSide::Sell))
            .map(|(orders, tif)| (orders[0].clone(), *tif))
            .collect()
    }

    fn buy_submissions(&self) -> Vec<(Vec<OrderSpec>, TimeInForce)> {
        self.log
            .lock()
            .submissions
            .iter()
            .filter(|(orders, _)| orders.iter().all(|o| o.side == OrderSide::Buy))
            .cloned()
            .collect()
    }

    fn cancels(&self) -> Vec<Vec<OrderId>> {
        self.log.lock().cancels.clone()
    }

    fn status_polls(&self) -> Vec<OrderId> {
        self.log.lock().status_polls.clone()
    }
}

#[async_trait]
impl TradingApi for MockApi {
    async fn get_balance(&self) -> Result<Decimal> {
        Ok(self.balance)
    }

    async fn submit_orders(
        &self,
        orders: &[OrderSpec],
        time_in_force: TimeInForce,
    ) -> Result<Vec<SubmitResult>> {
        self.log
            .lock()
            .submissions
            .push((orders.to_vec(), time_in_force));

        if orders.iter().any(|o| o.side == OrderSide::Sell) {
            let mut scripted = self.sell_results.lock();
            if scripted.is_empty() {
                return Ok(vec![SubmitResult::Accepted {
                    order_id: OrderId::new("sell-order"),
                }]);
            }
            return Ok(vec![scripted.remove(0)]);
        }

        Ok(self.buy_results.clone())
    }

    async fn get_order_status(
        &self,
        order_id: &OrderId,
        requested_size: Volume,
    ) -> Result<OrderState> {
        self.log.lock().status_polls.push(order_id.clone());
        let (status, filled_size) = self
            .statuses
            .get(order_id.as_str())
            .copied()
            .unwrap_or((OrderStatus::Pending, Decimal::ZERO));
        Ok(OrderState {
            order_id: order_id.clone(),
            status,
            filled_size,
            requested_size,
        })
    }

    async fn cancel_orders(&self, order_ids: &[OrderId]) -> Result<()> {
        self.log.lock().cancels.push(order_ids.to_vec());
        Ok(())
    }

    async fn get_order_book(&self, token_id: &TokenId) -> Result<BookState> {
        self.log.lock().book_fetches.push(token_id.clone());
        Ok(self.unwind_book.clone().unwrap_or_default())
    }

    fn exchange_name(&self) -> &'static str {
        "Mock"
    }
}

fn trading_config() -> TradingConfig {
    TradingConfig {
        order_size: dec!(50),
        pair_cost_ceiling: dec!(0.99),
        cooldown_secs: 10,
        time_in_force: TimeInForce::Fok,
        dry_run: false,
        sim_balance: dec!(100),
        safety_multiplier: dec!(1.2),
    }
}

fn execution_config() -> ExecutionConfig {
    ExecutionConfig {
        order_timeout_secs: 1,
        order_poll_interval_ms: 10,
        book_retry_attempts: 1,
        book_retry_backoff_ms: 0,
        use_stream: true,
        scan_interval_secs: 30,
        min_eval_interval_ms: 50,
    }
}

fn window() -> MarketWindow {
    MarketWindow::new(
        "btc-updown-15m-1754640000",
        MarketId::from("m1"),
        TokenId::from("up"),
        TokenId::from("down"),
    )
}

/// Opportunity from asks_up = [(0.40, 100)], asks_down = [(0.55, 100)],
/// target 50: total cost 0.95, investment 47.50, expected profit 2.50.
fn opportunity() -> Opportunity {
    let mut up = BookState::new();
    up.apply_change(BookSide::Ask, dec!(0.40), dec!(100));
    let mut down = BookState::new();
    down.apply_change(BookSide::Ask, dec!(0.55), dec!(100));

    let opp = detect(&up, &down, dec!(50), dec!(0.99)).expect("fixture must detect");
    assert_eq!(opp.total_investment, dec!(47.50));
    assert_eq!(opp.expected_profit, dec!(2.50));
    opp
}

fn accepted(id: &str) -> SubmitResult {
    SubmitResult::Accepted {
        order_id: OrderId::new(id),
    }
}

fn rejected(message: &str) -> SubmitResult {
    SubmitResult::Rejected {
        message: message.into(),
    }
}

fn engine_with(api: Arc<MockApi>) -> (ExecutionEngine, tokio::sync::mpsc::UnboundedReceiver<Event>)
{
    let (notifier, events) = ChannelNotifier::new();
    let engine = ExecutionEngine::new(
        api,
        Arc::new(notifier),
        trading_config(),
        execution_config(),
    );
    (engine, events)
}

fn drain(events: &mut tokio::sync::mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn both_legs_filled_locks_in_the_spread() {
    let api = Arc::new(MockApi {
        balance: dec!(100),
        buy_results: vec![accepted("o-up"), accepted("o-down")],
        statuses: HashMap::from([
            ("o-up".into(), (OrderStatus::Filled, dec!(50))),
            ("o-down".into(), (OrderStatus::Filled, dec!(50))),
        ]),
        ..Default::default()
    });
    let (mut engine, mut events) = engine_with(api.clone());

    let outcome = engine.execute(&window(), &opportunity()).await;

    match outcome {
        ExecutionOutcome::BothFilled {
            order_ids,
            size,
            invested,
        } => {
            assert_eq!(order_ids.len(), 2);
            assert_eq!(size, dec!(50));
            assert_eq!(invested, dec!(47.50));
        }
        other => panic!("expected BothFilled, got {other:?}"),
    }

    let buys = api.buy_submissions();
    assert_eq!(buys.len(), 1);
    let (orders, tif) = &buys[0];
    assert_eq!(*tif, TimeInForce::Fok);
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].token_id.as_str(), "up");
    assert_eq!(orders[0].price, dec!(0.40));
    assert_eq!(orders[0].size, dec!(50));
    assert_eq!(orders[1].token_id.as_str(), "down");
    assert_eq!(orders[1].price, dec!(0.55));

    assert!(api.cancels().is_empty());
    assert!(api.sell_submissions().is_empty());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, Event::TradeExecuted(_))));
}

#[tokio::test(start_paused = true)]
async fn one_leg_timeout_cancels_and_unwinds_at_best_bid() {
    let mut unwind_book = BookState::new();
    unwind_book.apply_change(BookSide::Bid, dec!(0.38), dec!(200));

    let api = Arc::new(MockApi {
        balance: dec!(100),
        buy_results: vec![accepted("o-up"), accepted("o-down")],
        // UP fills by size while still pending; DOWN never fills and the
        // wait times out.
        statuses: HashMap::from([("o-up".into(), (OrderStatus::Pending, dec!(50)))]),
        unwind_book: Some(unwind_book),
        ..Default::default()
    });
    let (mut engine, mut events) = engine_with(api.clone());

    let outcome = engine.execute(&window(), &opportunity()).await;

    match outcome {
        ExecutionOutcome::Unwound {
            filled_token,
            unwind_placed,
            ..
        } => {
            assert_eq!(filled_token.as_str(), "up");
            assert!(unwind_placed);
        }
        other => panic!("expected Unwound, got {other:?}"),
    }

    // only the unfilled leg's order is canceled
    assert_eq!(api.cancels(), vec![vec![OrderId::new("o-down")]]);

    // exactly one sell, at the filled instrument's best bid, IOC-style
    let sells = api.sell_submissions();
    assert_eq!(sells.len(), 1);
    let (sell, tif) = &sells[0];
    assert_eq!(sell.side, OrderSide::Sell);
    assert_eq!(sell.token_id.as_str(), "up");
    assert_eq!(sell.price, dec!(0.38));
    assert_eq!(sell.size, dec!(50));
    assert_eq!(*tif, TimeInForce::Fak);

    // the deviation is reported even though the unwind succeeded
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, Event::TradeFailed(_))));
}

#[tokio::test(start_paused = true)]
async fn rejected_leg_yields_unwind_once_other_leg_fills() {
    let mut unwind_book = BookState::new();
    unwind_book.apply_change(BookSide::Bid, dec!(0.39), dec!(500));

    let api = Arc::new(MockApi {
        balance: dec!(100),
        buy_results: vec![accepted("o-up"), rejected("not enough balance")],
        statuses: HashMap::from([("o-up".into(), (OrderStatus::Filled, dec!(50)))]),
        unwind_book: Some(unwind_book),
        ..Default::default()
    });
    let (mut engine, _events) = engine_with(api.clone());

    let outcome = engine.execute(&window(), &opportunity()).await;

    assert!(matches!(
        outcome,
        ExecutionOutcome::Unwound { ref filled_token, .. } if filled_token.as_str() == "up"
    ));
    // the rejected leg has no order to cancel
    assert!(api.cancels().is_empty());
    assert_eq!(api.sell_submissions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cooldown_allows_only_one_attempt() {
    let api = Arc::new(MockApi {
        balance: dec!(100),
        buy_results: vec![accepted("o-up"), accepted("o-down")],
        statuses: HashMap::from([
            ("o-up".into(), (OrderStatus::Filled, dec!(50))),
            ("o-down".into(), (OrderStatus::Filled, dec!(50))),
        ]),
        ..Default::default()
    });
    let (mut engine, _events) = engine_with(api.clone());
    let window = window();
    let opportunity = opportunity();

    let first = engine.execute(&window, &opportunity).await;
    let second = engine.execute(&window, &opportunity).await;

    assert!(matches!(first, ExecutionOutcome::BothFilled { .. }));
    assert!(matches!(second, ExecutionOutcome::Skipped));
    assert_eq!(api.buy_submissions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn insufficient_balance_aborts_before_submission() {
    let api = Arc::new(MockApi {
        balance: dec!(10),
        buy_results: vec![accepted("o-up"), accepted("o-down")],
        ..Default::default()
    });
    let (mut engine, mut events) = engine_with(api.clone());

    let outcome = engine.execute(&window(), &opportunity()).await;

    match outcome {
        ExecutionOutcome::Failed { reason } => {
            assert!(reason.contains("insufficient balance"), "reason: {reason}");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(api.buy_submissions().is_empty());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, Event::TradeFailed(_))));
}

#[tokio::test(start_paused = true)]
async fn invalid_signature_is_fatal_without_polling_or_unwind() {
    let api = Arc::new(MockApi {
        balance: dec!(100),
        buy_results: vec![rejected("400: invalid signature"), accepted("o-down")],
        ..Default::default()
    });
    let (mut engine, _events) = engine_with(api.clone());

    let outcome = engine.execute(&window(), &opportunity()).await;

    match outcome {
        ExecutionOutcome::Failed { reason } => assert_eq!(reason, "invalid signature"),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(api.status_polls().is_empty());
    assert!(api.cancels().is_empty());
    assert!(api.sell_submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn both_legs_rejected_fails_without_unwind() {
    let api = Arc::new(MockApi {
        balance: dec!(100),
        buy_results: vec![rejected("bad tick size"), rejected("bad tick size")],
        ..Default::default()
    });
    let (mut engine, _events) = engine_with(api.clone());

    let outcome = engine.execute(&window(), &opportunity()).await;

    match outcome {
        ExecutionOutcome::Failed { reason } => assert_eq!(reason, "both orders rejected"),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(api.status_polls().is_empty());
    assert!(api.sell_submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn neither_leg_filled_cancels_both_without_unwind() {
    let api = Arc::new(MockApi {
        balance: dec!(100),
        buy_results: vec![accepted("o-up"), accepted("o-down")],
        statuses: HashMap::from([
            ("o-up".into(), (OrderStatus::Canceled, dec!(0))),
            ("o-down".into(), (OrderStatus::Canceled, dec!(0))),
        ]),
        ..Default::default()
    });
    let (mut engine, _events) = engine_with(api.clone());

    let outcome = engine.execute(&window(), &opportunity()).await;

    assert!(matches!(outcome, ExecutionOutcome::Failed { .. }));
    assert_eq!(
        api.cancels(),
        vec![vec![OrderId::new("o-up"), OrderId::new("o-down")]]
    );
    assert!(api.sell_submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_immediate_unwind_retries_as_resting_order() {
    let mut unwind_book = BookState::new();
    unwind_book.apply_change(BookSide::Bid, dec!(0.38), dec!(200));

    let api = Arc::new(MockApi {
        balance: dec!(100),
        buy_results: vec![accepted("o-up"), accepted("o-down")],
        statuses: HashMap::from([("o-up".into(), (OrderStatus::Filled, dec!(50)))]),
        unwind_book: Some(unwind_book),
        sell_results: Mutex::new(vec![rejected("no match"), accepted("sell-resting")]),
        ..Default::default()
    });
    let (mut engine, _events) = engine_with(api.clone());

    let outcome = engine.execute(&window(), &opportunity()).await;

    assert!(matches!(
        outcome,
        ExecutionOutcome::Unwound { unwind_placed: true, .. }
    ));
    let sells = api.sell_submissions();
    assert_eq!(sells.len(), 2);
    assert_eq!(sells[0].1, TimeInForce::Fak);
    assert_eq!(sells[1].1, TimeInForce::Gtc);
}

#[tokio::test(start_paused = true)]
async fn unwind_with_no_bids_leaves_position_open() {
    let api = Arc::new(MockApi {
        balance: dec!(100),
        buy_results: vec![accepted("o-up"), accepted("o-down")],
        statuses: HashMap::from([("o-up".into(), (OrderStatus::Filled, dec!(50)))]),
        unwind_book: Some(BookState::new()),
        ..Default::default()
    });
    let (mut engine, _events) = engine_with(api.clone());

    let outcome = engine.execute(&window(), &opportunity()).await;

    assert!(matches!(
        outcome,
        ExecutionOutcome::Unwound { unwind_placed: false, .. }
    ));
    assert!(api.sell_submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dry_run_simulates_fills_without_touching_the_api() {
    let api = Arc::new(MockApi::default());
    let (notifier, mut events) = ChannelNotifier::new();
    let mut trading = trading_config();
    trading.dry_run = true;
    let mut engine = ExecutionEngine::new(
        api.clone(),
        Arc::new(notifier),
        trading,
        execution_config(),
    );

    let outcome = engine.execute(&window(), &opportunity()).await;

    assert!(matches!(outcome, ExecutionOutcome::BothFilled { .. }));
    assert_eq!(engine.sim_balance(), dec!(52.50));
    assert!(api.buy_submissions().is_empty());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, Event::TradeExecuted(_))));
}

#[tokio::test(start_paused = true)]
async fn undersized_order_is_raised_to_minimum_notional() {
    // price floor 0.05: one share is worth $0.05, so the venue minimum of
    // $1 per leg forces at least 20 shares
    let mut up = BookState::new();
    up.apply_change(BookSide::Ask, dec!(0.05), dec!(1000));
    let mut down = BookState::new();
    down.apply_change(BookSide::Ask, dec!(0.90), dec!(1000));
    let opportunity = detect(&up, &down, dec!(5), dec!(0.99)).unwrap();

    let api = Arc::new(MockApi {
        balance: dec!(100),
        buy_results: vec![accepted("o-up"), accepted("o-down")],
        statuses: HashMap::from([
            ("o-up".into(), (OrderStatus::Filled, dec!(20))),
            ("o-down".into(), (OrderStatus::Filled, dec!(20))),
        ]),
        ..Default::default()
    });
    let (mut engine, _events) = engine_with(api.clone());

    let outcome = engine.execute(&window(), &opportunity).await;

    match outcome {
        ExecutionOutcome::BothFilled { size, invested, .. } => {
            assert_eq!(size, dec!(20));
            assert_eq!(invested, dec!(0.95) * dec!(20));
        }
        other => panic!("expected BothFilled, got {other:?}"),
    }
    assert_eq!(api.buy_submissions()[0].0[0].size, dec!(20));
}
