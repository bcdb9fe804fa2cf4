//! App orchestration module.
//!
//! Builds the client, discovery, and notification capabilities from config
//! and hands them to a strategy session.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::engine::Session;
use crate::error::Result;
use crate::exchange::{PairDiscovery, TradingApi};
use crate::notify::{LogNotifier, Notifier};
use crate::polymarket::{ClobClient, SlugDiscovery};

/// Main application struct.
pub struct App;

impl App {
    /// Run the strategy session until shutdown.
    ///
    /// Discovers the active window, then starts the decision loop. Missing
    /// credentials for live trading abort here, before the core is
    /// constructed.
    pub async fn run(config: Config) -> Result<()> {
        if !config.trading.dry_run {
            config.ensure_credentials()?;
        }

        let api: Arc<dyn TradingApi> = Arc::new(ClobClient::from_config(&config));
        let discovery: Arc<dyn PairDiscovery> = Arc::new(SlugDiscovery::from_config(&config));
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

        let window = discovery.find_active_pair().await?;
        info!(
            slug = %window.slug(),
            market_id = %window.market_id(),
            "Active window discovered"
        );

        let session = Session::new(config, api, discovery, notifier);
        session.run(window).await
    }

    /// Resolve and print the currently-active instrument pair.
    pub async fn discover(config: Config) -> Result<()> {
        let discovery = SlugDiscovery::from_config(&config);
        let window = discovery.find_active_pair().await?;

        println!("slug:       {}", window.slug());
        println!("market id:  {}", window.market_id());
        println!("up token:   {}", window.up_token());
        println!("down token: {}", window.down_token());
        match window.window_end() {
            Some(end) => println!("window end: {end}"),
            None => println!("window end: unknown"),
        }
        Ok(())
    }

    /// Fetch and print the available balance.
    pub async fn balance(config: Config) -> Result<()> {
        config.ensure_credentials()?;
        let client = ClobClient::from_config(&config);
        let balance = client.get_balance().await?;
        println!("balance: {balance}");
        Ok(())
    }
}
