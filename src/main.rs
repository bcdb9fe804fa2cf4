use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pairlock::app::App;
use pairlock::config::Config;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "pairlock",
    version,
    about = "Paired-outcome arbitrage engine for 15-minute up/down markets."
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Simulate fills instead of submitting orders.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the strategy session (default).
    Run,
    /// Resolve and print the currently-active instrument pair.
    Discover,
    /// Fetch and print the available balance.
    Balance,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };
    if cli.dry_run {
        config.trading.dry_run = true;
    }

    config.init_logging();

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!("pairlock starting");
            tokio::select! {
                result = App::run(config) => result,
                _ = signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    Ok(())
                }
            }
        }
        Command::Discover => App::discover(config).await,
        Command::Balance => App::balance(config).await,
    };

    if let Err(e) = result {
        error!(error = %e, "Fatal error");
        std::process::exit(1);
    }

    info!("pairlock stopped");
}
