//! Implementation of the `pipeline run` sub command.
//!
//! Thin coordinator that sequences transform, enrich, load, and analyze.
//! The first failing phase aborts the run; reruns (with `--drop-existing`)
//! are the recovery mechanism.

use std::time::Instant;

use anyhow::Context;

use crate::{analyze, common, etl};

/// Command line arguments for `pipeline run` sub command.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "run the complete ETL pipeline", long_about = None)]
pub struct Args {
    /// Path to the configuration file; built-in defaults are used if absent.
    #[clap(long)]
    pub path_config: Option<String>,
    /// Path to the input file; overrides the configured path.
    #[clap(long)]
    pub path_in: Option<String>,
    /// Maximal number of rows to parse; optional.
    #[clap(long)]
    pub max_rows: Option<usize>,
    /// Drop existing tables before loading.
    #[clap(long)]
    pub drop_existing: bool,
    /// Skip the enrichment phase.
    #[clap(long)]
    pub skip_enrich: bool,
    /// Skip the analysis phase.
    #[clap(long)]
    pub skip_analysis: bool,
    /// Number of top genes to report in the analysis phase.
    #[clap(long, default_value_t = 20)]
    pub top_genes: i64,
}

/// Run one phase, annotating a failure with the phase name.
fn run_phase(
    name: &str,
    phase: impl FnOnce() -> Result<(), anyhow::Error>,
) -> Result<(), anyhow::Error> {
    tracing::info!("--- phase {} ---", name);
    let before_phase = Instant::now();
    phase().with_context(|| format!("phase {} failed", name))?;
    tracing::info!("--- phase {} done in {:?} ---", name, before_phase.elapsed());
    Ok(())
}

/// Main entry point for `pipeline run` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!(
        "variant-etl-worker {} pipeline started at {}",
        common::worker_version(),
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
    );
    tracing::info!("args = {:#?}", &args);

    run_phase("transform", || {
        etl::transform::run(
            args_common,
            &etl::transform::Args {
                path_config: args.path_config.clone(),
                path_in: args.path_in.clone(),
                max_rows: args.max_rows,
            },
        )
    })?;

    if args.skip_enrich {
        tracing::info!("skipping enrichment phase");
    } else {
        run_phase("enrich", || {
            etl::enrich::run(
                args_common,
                &etl::enrich::Args {
                    path_config: args.path_config.clone(),
                },
            )
        })?;
    }

    run_phase("load", || {
        etl::load::run(
            args_common,
            &etl::load::Args {
                path_config: args.path_config.clone(),
                drop_existing: args.drop_existing,
            },
        )
    })?;

    if args.skip_analysis {
        tracing::info!("skipping analysis phase");
    } else {
        run_phase("analyze", || {
            analyze::run(
                args_common,
                &analyze::Args {
                    path_config: args.path_config.clone(),
                    top_genes: args.top_genes,
                },
            )
        })?;
    }

    tracing::info!(
        "pipeline completed at {} ({:?} total)",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
        before_anything.elapsed()
    );
    Ok(())
}
