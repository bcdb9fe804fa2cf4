//! Opportunity execution and strategy orchestration.

mod executor;
mod lifecycle;
mod session;

pub use executor::{ExecutionEngine, ExecutionOutcome};
pub use lifecycle::{MarketLifecycle, SessionStats, WindowSummary};
pub use session::{Session, StopHandle};
