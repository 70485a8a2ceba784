//! Implementation of the `etl transform` sub command.
//!
//! Reads a (possibly gzip-compressed) variant file line by line, normalizes
//! each data line into a [`VariantRecord`], and spills records to a staging
//! CSV file in bounded-size batches so that memory use stays proportional to
//! the batch size, not the input.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thousands::Separable;

use crate::common::{self, io::open_read_maybe_gz, trace_rss_now};
use crate::config::Config;
use crate::etl::genes;

pub mod info;

/// Command line arguments for `etl transform` sub command.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "transform a variant VCF into staging tables", long_about = None)]
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
}

/// One normalized variant, created once per data line and immutable after.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct VariantRecord {
    /// chromosome name
    pub chromosome: String,
    /// position, 1-based
    pub position: i64,
    /// variant identifier, if any
    pub variant_id: Option<String>,
    /// reference allele
    pub reference_allele: String,
    /// alternate allele, comma-separated when multiple
    pub alternate_allele: String,
    /// quality score, if numeric
    pub quality: Option<f64>,
    /// filter status
    pub filter: String,
    /// allele frequency from INFO/AF
    pub allele_frequency: Option<f64>,
    /// alternate allele count from INFO/AC
    pub allele_count: Option<i64>,
    /// total allele count from INFO/AN
    pub total_alleles: Option<i64>,
    /// canonicalized clinical significance
    pub clinical_significance: String,
    /// disease name from INFO/CLNDN
    pub disease_name: Option<String>,
    /// gene symbol from INFO/GENEINFO
    pub gene_symbol: Option<String>,
    /// gene identifier from INFO/GENEINFO
    pub gene_id: Option<String>,
    /// raw INFO column, retained for audit
    pub info_raw: String,
}

/// Handle to a staging file too large to materialize in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedVariants {
    /// Path of the staging CSV file.
    pub path: PathBuf,
    /// Total number of records written.
    pub record_count: usize,
}

/// Result of parsing: either all records in memory or a staged file handle.
///
/// Consumers pattern-match on this instead of sniffing the shape of the
/// returned data.
#[derive(Debug)]
pub enum TransformOutput {
    /// Record set small enough to hold in memory.
    Materialized(Vec<VariantRecord>),
    /// Records were staged on disk and must be streamed by consumers.
    Staged(StagedVariants),
}

impl TransformOutput {
    /// Total number of records behind this output.
    pub fn record_count(&self) -> usize {
        match self {
            TransformOutput::Materialized(records) => records.len(),
            TransformOutput::Staged(staged) => staged.record_count,
        }
    }
}

/// Map the VCF missing-value marker to `None`.
fn none_if_missing(value: &str) -> Option<String> {
    if value == "." {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse one data line into a `VariantRecord`.
///
/// Returns `None` for lines with fewer than 8 tab-separated columns or an
/// unusable position; both are dropped silently. Numeric INFO fields that do
/// not parse are left absent without failing the record.
fn parse_line(line: &str, config: &Config) -> Option<VariantRecord> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
    if fields.len() < 8 {
        return None;
    }

    let position = fields[1].parse::<i64>().ok().filter(|position| *position > 0)?;
    let info = fields[7];

    let (gene_symbol, gene_id) = info::extract_gene_info(info);
    let clinical_significance = info::classify_clinical_significance(
        info::extract_field(info, "CLNSIG"),
        &config.vcf_parser.clinical_significance_mapping,
    );

    Some(VariantRecord {
        chromosome: fields[0].to_string(),
        position,
        variant_id: none_if_missing(fields[2]),
        reference_allele: fields[3].to_string(),
        alternate_allele: fields[4].to_string(),
        quality: fields[5].parse().ok(),
        filter: fields[6].to_string(),
        allele_frequency: info::extract_field(info, "AF").and_then(|v| v.parse().ok()),
        allele_count: info::extract_field(info, "AC").and_then(|v| v.parse().ok()),
        total_alleles: info::extract_field(info, "AN").and_then(|v| v.parse().ok()),
        clinical_significance,
        disease_name: info::extract_field(info, "CLNDN").map(str::to_string),
        gene_symbol,
        gene_id,
        info_raw: info.to_string(),
    })
}

/// Serialize one batch to the staging writer and clear it.
fn flush_batch(
    writer: &mut csv::Writer<BufWriter<File>>,
    batch: &mut Vec<VariantRecord>,
) -> Result<(), anyhow::Error> {
    for record in batch.drain(..) {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse the variant file at `path` into the staging representation.
///
/// Records are flushed to a staging CSV in batches of
/// `processing.chunk_size`. The staging file is a temporary file written
/// through a single CSV writer, so the header row exists exactly once per
/// file no matter how many batches are appended. When the total record count
/// exceeds `processing.large_dataset_threshold`, the staging file is
/// persisted to `paths.variants_csv` by rename and a [`StagedVariants`]
/// handle is returned; otherwise the records are read back into memory and
/// the staging file is removed.
pub fn parse_vcf(
    path: &Path,
    max_rows: Option<usize>,
    config: &Config,
) -> Result<TransformOutput, anyhow::Error> {
    tracing::info!("parsing variant file {:?}", path);
    tracing::info!(
        "using chunked staging (chunk size: {})",
        config.processing.chunk_size.separate_with_commas()
    );
    let before_parsing = Instant::now();

    let reader = open_read_maybe_gz(path)
        .map_err(|e| anyhow::anyhow!("could not open input file {:?}: {}", path, e))?;

    let staging_dir = config
        .paths
        .variants_csv
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(staging_dir)?;
    // Same directory as the final artifact so that persisting is a rename.
    let staging = tempfile::Builder::new()
        .prefix("variants.")
        .suffix(".csv.tmp")
        .tempfile_in(staging_dir)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(BufWriter::new(staging.reopen()?));

    let mut batch: Vec<VariantRecord> = Vec::with_capacity(config.processing.chunk_size);
    let mut total_written = 0usize;

    for line in std::io::BufRead::lines(reader) {
        let line = line?;
        if line.starts_with('#') {
            // Meta lines and the #CHROM column header.
            continue;
        }
        let Some(record) = parse_line(&line, config) else {
            continue;
        };
        batch.push(record);
        total_written += 1;

        if batch.len() >= config.processing.chunk_size {
            flush_batch(&mut writer, &mut batch)?;
            tracing::info!(
                "processed {} variants so far...",
                total_written.separate_with_commas()
            );
            trace_rss_now();
        }

        if let Some(max_rows) = max_rows {
            if total_written >= max_rows {
                tracing::warn!(
                    "stopping after {} records as requested by --max-rows",
                    total_written
                );
                break;
            }
        }
    }
    if !batch.is_empty() {
        flush_batch(&mut writer, &mut batch)?;
    }
    writer.flush()?;
    drop(writer);

    tracing::info!(
        "parsed {} variants in {:?}",
        total_written.separate_with_commas(),
        before_parsing.elapsed()
    );

    if total_written > config.processing.large_dataset_threshold {
        tracing::info!(
            "large dataset detected ({} variants); keeping records staged on disk",
            total_written.separate_with_commas()
        );
        staging
            .persist(&config.paths.variants_csv)
            .map_err(|e| anyhow::anyhow!("could not persist staging file: {}", e))?;
        tracing::info!("saved variants directly to {:?}", &config.paths.variants_csv);
        Ok(TransformOutput::Staged(StagedVariants {
            path: config.paths.variants_csv.clone(),
            record_count: total_written,
        }))
    } else {
        // The temporary staging file is removed when `staging` drops.
        let records = read_staged(staging.path())?;
        Ok(TransformOutput::Materialized(records))
    }
}

/// Read a complete staging CSV back into memory.
pub fn read_staged(path: &Path) -> Result<Vec<VariantRecord>, anyhow::Error> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

/// Write variant records to `path` with a header row.
pub fn write_variants_csv(path: &Path, records: &[VariantRecord]) -> Result<(), anyhow::Error> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Main entry point for `etl transform` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let config = Config::load_or_default(args.path_config.as_deref())?;
    let path_in = args
        .path_in
        .as_ref()
        .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
        .unwrap_or_else(|| config.paths.vcf_file.clone());

    let output = parse_vcf(&path_in, args.max_rows, &config)?;

    // Persist the staging artifact for the load stage; large outputs already
    // live at the configured path.
    if let TransformOutput::Materialized(records) = &output {
        write_variants_csv(&config.paths.variants_csv, records)?;
        tracing::info!("saved variants to {:?}", &config.paths.variants_csv);
    }

    let gene_records = genes::extract_genes(&output)?;
    genes::write_genes_csv(&config.paths.genes_csv, &gene_records)?;
    tracing::info!("saved genes to {:?}", &config.paths.genes_csv);

    tracing::info!(
        "All of `etl transform` completed in {:?} ({} variants, {} genes)",
        before_anything.elapsed(),
        output.record_count().separate_with_commas(),
        gene_records.len().separate_with_commas()
    );
    Ok(())
}
