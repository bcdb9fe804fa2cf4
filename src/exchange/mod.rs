//! Capability traits for external collaborators.

mod discovery;
mod trading;

pub use discovery::PairDiscovery;
pub use trading::{OrderSide, OrderSpec, SubmitResult, TimeInForce, TradingApi};
