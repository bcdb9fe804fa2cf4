//! Configuration loading from TOML files and the environment.
//!
//! Runtime parameters come from a TOML file; venue credentials come from the
//! environment (loaded via dotenv in the binary) and are required only for
//! live trading. Missing credentials with `dry_run = false` abort startup
//! before the core is constructed.

use std::env;
use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::exchange::TimeInForce;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(skip)]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_clob_api_url")]
    pub clob_api_url: String,
    #[serde(default = "default_gamma_api_url")]
    pub gamma_api_url: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MarketConfig {
    /// Optional slug override used when discovery fails.
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Target size per leg, in shares.
    #[serde(default = "default_order_size")]
    pub order_size: Decimal,
    /// Maximum combined worst-case cost per share pair.
    #[serde(default = "default_pair_cost_ceiling")]
    pub pair_cost_ceiling: Decimal,
    /// Minimum seconds between execution attempts.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_time_in_force")]
    pub time_in_force: TimeInForce,
    /// Simulate fills instead of submitting orders.
    #[serde(default)]
    pub dry_run: bool,
    /// Starting cash for simulation mode.
    #[serde(default = "default_sim_balance")]
    pub sim_balance: Decimal,
    /// Balance must cover investment times this factor.
    #[serde(default = "default_safety_multiplier")]
    pub safety_multiplier: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Per-order terminal-wait timeout.
    #[serde(default = "default_order_timeout_secs")]
    pub order_timeout_secs: u64,
    /// Interval between order status polls.
    #[serde(default = "default_order_poll_interval_ms")]
    pub order_poll_interval_ms: u64,
    /// REST order-book fetch attempts.
    #[serde(default = "default_book_retry_attempts")]
    pub book_retry_attempts: u32,
    /// Backoff between order-book fetch attempts.
    #[serde(default = "default_book_retry_backoff_ms")]
    pub book_retry_backoff_ms: u64,
    /// Drive evaluation from the streaming feed instead of interval polling.
    #[serde(default = "default_use_stream")]
    pub use_stream: bool,
    /// Scan interval for polling mode.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Minimum gap between evaluations in stream mode.
    #[serde(default = "default_min_eval_interval_ms")]
    pub min_eval_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Venue API credentials, sourced from the environment.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

impl Credentials {
    /// Read credentials from the environment, if fully present.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = non_empty_env("PAIRLOCK_API_KEY")?;
        let api_secret = non_empty_env("PAIRLOCK_API_SECRET")?;
        let api_passphrase = non_empty_env("PAIRLOCK_API_PASSPHRASE")?;
        Some(Self {
            api_key,
            api_secret,
            api_passphrase,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".into()
}

fn default_clob_api_url() -> String {
    "https://clob.polymarket.com".into()
}

fn default_gamma_api_url() -> String {
    "https://gamma-api.polymarket.com".into()
}

fn default_order_size() -> Decimal {
    dec!(50)
}

fn default_pair_cost_ceiling() -> Decimal {
    dec!(0.99)
}

const fn default_cooldown_secs() -> u64 {
    10
}

const fn default_time_in_force() -> TimeInForce {
    TimeInForce::Fok
}

fn default_sim_balance() -> Decimal {
    dec!(100)
}

fn default_safety_multiplier() -> Decimal {
    dec!(1.2)
}

const fn default_order_timeout_secs() -> u64 {
    3
}

const fn default_order_poll_interval_ms() -> u64 {
    250
}

const fn default_book_retry_attempts() -> u32 {
    3
}

const fn default_book_retry_backoff_ms() -> u64 {
    500
}

const fn default_use_stream() -> bool {
    true
}

const fn default_scan_interval_secs() -> u64 {
    30
}

const fn default_min_eval_interval_ms() -> u64 {
    50
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            clob_api_url: default_clob_api_url(),
            gamma_api_url: default_gamma_api_url(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            order_size: default_order_size(),
            pair_cost_ceiling: default_pair_cost_ceiling(),
            cooldown_secs: default_cooldown_secs(),
            time_in_force: default_time_in_force(),
            dry_run: false,
            sim_balance: default_sim_balance(),
            safety_multiplier: default_safety_multiplier(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_timeout_secs: default_order_timeout_secs(),
            order_poll_interval_ms: default_order_poll_interval_ms(),
            book_retry_attempts: default_book_retry_attempts(),
            book_retry_backoff_ms: default_book_retry_backoff_ms(),
            use_stream: default_use_stream(),
            scan_interval_secs: default_scan_interval_secs(),
            min_eval_interval_ms: default_min_eval_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and credentials from the
    /// environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.credentials = Credentials::from_env();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.trading.order_size <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "trading.order_size",
                reason: "must be positive".into(),
            }
            .into());
        }
        if self.trading.pair_cost_ceiling <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "trading.pair_cost_ceiling",
                reason: "must be positive".into(),
            }
            .into());
        }
        if self.trading.safety_multiplier < Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                field: "trading.safety_multiplier",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Credentials are required for live trading; checked at startup before
    /// the core is constructed.
    pub fn ensure_credentials(&self) -> Result<&Credentials> {
        self.credentials.as_ref().ok_or_else(|| {
            ConfigError::MissingField {
                field: "PAIRLOCK_API_KEY",
            }
            .into()
        })
    }

    /// Initialize the tracing subscriber per the logging section.
    pub fn init_logging(&self) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.logging.level));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        if self.logging.format == "json" {
            builder.json().init();
        } else {
            builder.init();
        }
    }
}
