//! Pairlock - cross-venue-free arbitrage on paired binary-outcome markets.
//!
//! This crate drives a riskless-spread strategy on complementary UP/DOWN
//! tokens settling the same 15-minute event: whenever the combined
//! depth-weighted cost of acquiring a fixed quantity of each side falls
//! below a break-even ceiling, both legs are bought and the spread is locked
//! in at settlement.
//!
//! # Architecture
//!
//! - [`domain`] - exchange-agnostic core: order book replicas, the
//!   depth-weighted fill estimator, opportunity detection, order state
//!   classification, and the market window
//! - [`exchange`] - capability traits for the external collaborators
//!   (trading API, pair discovery)
//! - [`polymarket`] - Polymarket implementation: streaming market data with
//!   reconnection, CLOB REST client, slug-based discovery
//! - [`engine`] - the two-leg execution engine with partial-fill repair,
//!   window lifecycle, and the strategy session loop
//! - [`notify`] - non-blocking event notifications for passive consumers
//! - [`config`] - TOML + environment configuration
//! - [`error`] - error types for the crate
//! - [`app`] - application orchestration

pub mod app;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod notify;
pub mod polymarket;
