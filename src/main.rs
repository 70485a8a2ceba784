//! Variant ETL worker main executable

pub mod analyze;
pub mod common;
pub mod config;
pub mod etl;
pub mod pipeline;

use clap::{Args, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Variant ETL heavy lifting",
    long_about = "This tool performs the heavy lifting for loading genomic variant data"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// ETL-related commands.
    Etl(Etl),
    /// Analysis-related commands.
    Analyze(Analyze),
    /// Pipeline-related commands.
    Pipeline(Pipeline),
}

/// Parsing of "etl *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Etl {
    /// The sub command to run
    #[command(subcommand)]
    command: EtlCommands,
}

/// Enum supporting the parsing of "etl *" sub commands.
#[derive(Debug, Subcommand)]
enum EtlCommands {
    Transform(etl::transform::Args),
    Enrich(etl::enrich::Args),
    Load(etl::load::Args),
}

/// Parsing of "analyze *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Analyze {
    /// The sub command to run
    #[command(subcommand)]
    command: AnalyzeCommands,
}

/// Enum supporting the parsing of "analyze *" sub commands.
#[derive(Debug, Subcommand)]
enum AnalyzeCommands {
    Summaries(analyze::Args),
}

/// Parsing of "pipeline *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Pipeline {
    /// The sub command to run
    #[command(subcommand)]
    command: PipelineCommands,
}

/// Enum supporting the parsing of "pipeline *" sub commands.
#[derive(Debug, Subcommand)]
enum PipelineCommands {
    Run(pipeline::Args),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Etl(etl) => match &etl.command {
                EtlCommands::Transform(args) => {
                    etl::transform::run(&cli.common, args)?;
                }
                EtlCommands::Enrich(args) => {
                    etl::enrich::run(&cli.common, args)?;
                }
                EtlCommands::Load(args) => {
                    etl::load::run(&cli.common, args)?;
                }
            },
            Commands::Analyze(analyze) => match &analyze.command {
                AnalyzeCommands::Summaries(args) => {
                    analyze::run(&cli.common, args)?;
                }
            },
            Commands::Pipeline(pipeline) => match &pipeline.command {
                PipelineCommands::Run(args) => {
                    pipeline::run(&cli.common, args)?;
                }
            },
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
