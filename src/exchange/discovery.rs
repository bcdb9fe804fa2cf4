//! Market discovery capability.

use async_trait::async_trait;

use crate::domain::MarketWindow;
use crate::error::Result;

/// Resolves the currently-active instrument pair.
#[async_trait]
pub trait PairDiscovery: Send + Sync {
    /// Find the active up/down pair and its window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`](crate::error::Error::Discovery) when no
    /// open window can be resolved; callers retry rather than treat this as
    /// fatal once a session is running.
    async fn find_active_pair(&self) -> Result<MarketWindow>;
}
