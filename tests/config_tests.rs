//! Configuration loading tests.

use std::io::Write;

use pairlock::config::Config;
use pairlock::exchange::TimeInForce;
use rust_decimal_macros::dec;

#[test]
fn loads_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[trading]\ndry_run = true\norder_size = 10\ntime_in_force = \"GTC\""
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();

    assert!(config.trading.dry_run);
    assert_eq!(config.trading.order_size, dec!(10));
    assert_eq!(config.trading.time_in_force, TimeInForce::Gtc);
}

#[test]
fn missing_file_is_an_error() {
    assert!(Config::load("/nonexistent/pairlock.toml").is_err());
}

#[test]
fn malformed_toml_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "not [valid toml").unwrap();

    assert!(Config::load(file.path()).is_err());
}
