//! Prediction-market arbitrage validator - entry point.

use anyhow::Result;
use clap::{Parser, Subcommand};
use polyarb_bot::{commands, AppConfig, Application};
use tracing::info;

/// Prediction-market data validator and paper-trading engine.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the validator (default): stream, detect, simulate.
    Validate,
    /// Print the latest P&L snapshot and open positions.
    Report,
    /// Wipe the paper book and opportunity log.
    Reset,
    /// Verify the schema and print table row counts.
    DbStatus,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    polyarb_telemetry::init_logging(polyarb_telemetry::LogFormat::from_env())?;

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command.unwrap_or(Command::Validate) {
        Command::Validate => {
            info!("Starting polyarb v{}", env!("CARGO_PKG_VERSION"));
            let mut app = Application::new(config).await?;
            app.run().await?;
        }
        Command::Report => commands::report(&config).await?,
        Command::Reset => commands::reset(&config).await?,
        Command::DbStatus => commands::db_status(&config).await?,
    }

    Ok(())
}
