use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use ratewatch::core::log::init_logging;

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

impl From<Commands> for ratewatch::AppCommand {
    fn from(cmd: Commands) -> ratewatch::AppCommand {
        match cmd {
            Commands::Scrape => ratewatch::AppCommand::Scrape,
            Commands::Bank { id } => ratewatch::AppCommand::Bank(id),
            Commands::Rates => ratewatch::AppCommand::Rates,
            Commands::Health => ratewatch::AppCommand::Health,
            Commands::Watch => ratewatch::AppCommand::Watch,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Scrape every configured bank once and show per-bank results
    Scrape,
    /// Scrape a single bank by id
    Bank {
        /// Source id from the configuration
        id: String,
    },
    /// Show all rates from the banks that answered
    Rates,
    /// Scrape once and print the health snapshot as JSON
    Health,
    /// Scrape on the configured schedule until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => ratewatch::cli::setup::setup(),
        Some(cmd) => ratewatch::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
