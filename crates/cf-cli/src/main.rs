//! cdmflow CLI - dependency-ordered OMOP CDM ETL runs

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod context;

use cli::{Cli, Commands};
use commands::common::ExitCode;
use commands::{cleanup, create_db, run, tiers, vocabulary};

/// Install the fmt subscriber. `RUST_LOG` wins over `--verbose`; records
/// from the `log` facade are bridged in.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::CreateDb => create_db::execute(&cli.global).await,
        Commands::Run(args) => run::execute(args, &cli.global).await,
        Commands::Cleanup(args) => cleanup::execute(args, &cli.global).await,
        Commands::ImportVocabulary(args) => vocabulary::execute(args, &cli.global).await,
        Commands::Tiers(args) => tiers::execute(args, &cli.global).await,
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    match dispatch(&cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<ExitCode>() {
            Some(code) => std::process::ExitCode::from(code.0.clamp(1, 255) as u8),
            None => {
                eprintln!("Error: {:#}", err);
                std::process::ExitCode::FAILURE
            }
        },
    }
}
