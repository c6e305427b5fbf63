//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};

/// cdmflow - load source data into an OMOP CDM warehouse, table by table in
/// dependency order
#[derive(Parser, Debug)]
#[command(name = "cdmflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override the DuckDB database path
    #[arg(long, global = true, env = "CDMFLOW_DATABASE")]
    pub database: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the raw, work and omop schemas and every CDM table
    CreateDb,

    /// Run the ETL
    Run(RunArgs),

    /// Remove ETL output for one table or for everything
    Cleanup(CleanupArgs),

    /// Replace the vocabulary tables with an Athena download
    ImportVocabulary(ImportVocabularyArgs),

    /// Print the execution tiers
    Tiers(TiersArgs),
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run a single table
    #[arg(short, long)]
    pub table: Option<String>,

    /// Do not upload custom concepts and Usagi mappings
    #[arg(long)]
    pub skip_mappings: bool,

    /// Output format for the run summary
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Output formats for command results
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// The run report as JSON
    Json,
}

/// Arguments for the cleanup command
#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Table to clean, or `all`
    #[arg(default_value = "all")]
    pub scope: String,
}

/// Arguments for the import-vocabulary command
#[derive(Args, Debug)]
pub struct ImportVocabularyArgs {
    /// Athena vocabulary zip archive
    pub archive: String,
}

/// Arguments for the tiers command
#[derive(Args, Debug)]
pub struct TiersArgs {
    /// Only show the tier of this table
    #[arg(short, long)]
    pub table: Option<String>,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
