use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use pricefolio::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for pricefolio::AppCommand {
    fn from(cmd: Commands) -> pricefolio::AppCommand {
        match cmd {
            Commands::Price { symbols } => pricefolio::AppCommand::Price { symbols },
            Commands::Market { symbol } => pricefolio::AppCommand::Market { symbol },
            Commands::History { symbol, timeframe } => {
                pricefolio::AppCommand::History { symbol, timeframe }
            }
            Commands::Status => pricefolio::AppCommand::Status,
            Commands::Portfolio => pricefolio::AppCommand::Portfolio,
            Commands::ClearCache => pricefolio::AppCommand::ClearCache,
            Commands::Prune { days } => pricefolio::AppCommand::Prune { days },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show current prices
    Price {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Show full market data for one asset
    Market { symbol: String },
    /// Show historical prices
    History {
        symbol: String,
        /// One of 1h, 24h, 7d, 30d, 1y
        #[arg(short, long, default_value = "24h")]
        timeframe: String,
    },
    /// Show provider availability
    Status,
    /// Value the configured portfolios
    Portfolio,
    /// Drop cached prices, market data and history
    ClearCache,
    /// Delete persisted prices older than the retention window
    Prune {
        /// Retention in days; defaults to the configured value
        #[arg(short, long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => pricefolio::cli::setup::setup(),
        Some(cmd) => pricefolio::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
