//! Strategy session: the single decision loop.
//!
//! One session drives one strategy instance across successive windows. The
//! market data feed runs as an independent task pushing book-touched events
//! into a channel; the loop consumes them (or polls REST books on an
//! interval, per config), re-evaluates the pair, and hands detected
//! opportunities to the execution engine.
//!
//! No error escapes the loop: transient I/O is logged and retried, data
//! quality problems resolve to "no signal", and only shutdown or window
//! close break the cycle. The stop flag is observed at the top of each
//! iteration and at rollover checkpoints; an in-flight execution attempt
//! always runs to completion first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::executor::ExecutionEngine;
use super::lifecycle::{MarketLifecycle, SessionStats};
use crate::config::Config;
use crate::domain::{detect, BookCache, BookState, MarketWindow};
use crate::error::Result;
use crate::exchange::{PairDiscovery, TradingApi};
use crate::notify::{Event, MarketUpdateEvent, Notifier, OpportunityEvent};
use crate::polymarket::MarketFeed;

/// Wait between rollover discovery attempts once a window has closed.
const ROLLOVER_RETRY: Duration = Duration::from_secs(10);

/// Upper bound on how long a quiet feed can defer the close/stop check.
const CLOSE_CHECK: Duration = Duration::from_secs(5);

/// Event channel capacity between the feed task and the decision loop.
const EVENT_QUEUE: usize = 1024;

/// Handle for requesting a session stop from outside the loop.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// One running strategy instance.
pub struct Session {
    config: Config,
    api: Arc<dyn TradingApi>,
    lifecycle: MarketLifecycle,
    notifier: Arc<dyn Notifier>,
    stop: Arc<AtomicBool>,
}

impl Session {
    #[must_use]
    pub fn new(
        config: Config,
        api: Arc<dyn TradingApi>,
        discovery: Arc<dyn PairDiscovery>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let lifecycle = MarketLifecycle::new(api.clone(), discovery);
        Self {
            config,
            api,
            lifecycle,
            notifier,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Run the session until stopped, rolling over windows as they close.
    pub async fn run(self, initial: MarketWindow) -> Result<()> {
        let mut window = initial;

        loop {
            if self.stopped() {
                break;
            }

            info!(
                slug = %window.slug(),
                up_token = %window.up_token(),
                down_token = %window.down_token(),
                time_remaining = %window.time_remaining(Utc::now().timestamp()),
                mode = if self.config.trading.dry_run { "simulation" } else { "live" },
                cost_ceiling = %self.config.trading.pair_cost_ceiling,
                order_size = %self.config.trading.order_size,
                stream = self.config.execution.use_stream,
                "Monitoring window"
            );

            // Fresh per-window context: executor state and counters never
            // leak across a rollover.
            let mut executor = ExecutionEngine::new(
                self.api.clone(),
                self.notifier.clone(),
                self.config.trading.clone(),
                self.config.execution.clone(),
            );
            let mut stats = SessionStats::default();

            if self.config.execution.use_stream {
                self.run_stream_window(&window, &mut executor, &mut stats)
                    .await;
            } else {
                self.run_polling_window(&window, &mut executor, &mut stats)
                    .await;
            }

            if self.stopped() {
                break;
            }

            self.lifecycle.close_out(&window, &stats).await;

            window = loop {
                if self.stopped() {
                    return Ok(());
                }
                match self.lifecycle.next_window(window.slug()).await {
                    Some(next) => break next,
                    None => sleep(ROLLOVER_RETRY).await,
                }
            };
        }

        Ok(())
    }

    /// Stream-driven mode: evaluate on every book-touched event, throttled
    /// to a minimum interval.
    async fn run_stream_window(
        &self,
        window: &MarketWindow,
        executor: &mut ExecutionEngine,
        stats: &mut SessionStats,
    ) {
        let tokens = vec![window.up_token().clone(), window.down_token().clone()];
        let cache = Arc::new(BookCache::for_tokens(&tokens));
        let feed = MarketFeed::new(
            self.config.network.ws_url.clone(),
            tokens,
            cache.clone(),
        );

        let (tx, mut rx) = mpsc::channel(EVENT_QUEUE);
        let feed_task = tokio::spawn(feed.run(tx));

        let min_eval = Duration::from_millis(self.config.execution.min_eval_interval_ms);
        let mut last_eval: Option<Instant> = None;

        loop {
            if self.stopped() || window.is_closed(Utc::now().timestamp()) {
                break;
            }
            // A quiet feed must not delay close detection past the window
            // end, so the wait is bounded.
            let received = tokio::select! {
                event = rx.recv() => event,
                () = sleep(CLOSE_CHECK) => continue,
            };
            if received.is_none() {
                break;
            }
            if let Some(last) = last_eval {
                if last.elapsed() < min_eval {
                    continue;
                }
            }
            last_eval = Some(Instant::now());

            let (up_book, down_book) = cache.pair(window.up_token(), window.down_token());
            let (Some(up_book), Some(down_book)) = (up_book, down_book) else {
                continue;
            };
            // No snapshot yet means "not ready", never "zero price".
            if !up_book.has_asks() || !down_book.has_asks() {
                continue;
            }

            self.evaluate(window, executor, stats, &up_book, &down_book)
                .await;
        }

        drop(rx);
        feed_task.abort();
    }

    /// Interval-polling mode: fetch REST books every scan interval.
    async fn run_polling_window(
        &self,
        window: &MarketWindow,
        executor: &mut ExecutionEngine,
        stats: &mut SessionStats,
    ) {
        let scan_interval = Duration::from_secs(self.config.execution.scan_interval_secs);
        let mut scan = 0u64;

        loop {
            if self.stopped() || window.is_closed(Utc::now().timestamp()) {
                return;
            }
            scan += 1;
            debug!(scan, slug = %window.slug(), "Scanning order books");

            let books = tokio::join!(
                self.api.get_order_book(window.up_token()),
                self.api.get_order_book(window.down_token()),
            );
            match books {
                (Ok(up_book), Ok(down_book)) => {
                    if up_book.has_asks() && down_book.has_asks() {
                        self.evaluate(window, executor, stats, &up_book, &down_book)
                            .await;
                    }
                }
                (up, down) => {
                    for result in [up, down] {
                        if let Err(e) = result {
                            warn!(error = %e, "Order book fetch failed");
                        }
                    }
                }
            }

            sleep(scan_interval).await;
        }
    }

    /// One evaluation: publish the market snapshot, detect, execute.
    async fn evaluate(
        &self,
        window: &MarketWindow,
        executor: &mut ExecutionEngine,
        stats: &mut SessionStats,
        up_book: &BookState,
        down_book: &BookState,
    ) {
        let up_ask = up_book.best_ask().map(|l| l.price());
        let down_ask = down_book.best_ask().map(|l| l.price());
        let best_total = match (up_ask, down_ask) {
            (Some(up), Some(down)) => Some(up + down),
            _ => None,
        };
        let now = Utc::now().timestamp();
        self.notifier.notify(Event::MarketUpdate(MarketUpdateEvent {
            slug: window.slug().to_string(),
            up_ask,
            down_ask,
            total_cost: best_total,
            seconds_remaining: window.window_end().map(|end| (end - now).max(0) as u64),
        }));

        let opportunity = detect(
            up_book,
            down_book,
            self.config.trading.order_size,
            self.config.trading.pair_cost_ceiling,
        );

        match opportunity {
            Some(opportunity) => {
                self.notifier.notify(Event::OpportunityFound(
                    OpportunityEvent::from_opportunity(window.slug(), &opportunity),
                ));
                let outcome = executor.execute(window, &opportunity).await;
                stats.record(&outcome);
            }
            None => {
                debug!(
                    slug = %window.slug(),
                    up_ask = %up_ask.map_or_else(|| "-".into(), |p| p.to_string()),
                    down_ask = %down_ask.map_or_else(|| "-".into(), |p| p.to_string()),
                    best_total = %best_total.map_or_else(|| "-".into(), |p| p.to_string()),
                    ceiling = %self.config.trading.pair_cost_ceiling,
                    time_remaining = %window.time_remaining(now),
                    "No arbitrage"
                );
            }
        }
    }
}
