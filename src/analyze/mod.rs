//! Implementation of the `analyze summaries` sub command.
//!
//! Computes the read-side aggregates directly against the loaded store with
//! server-side grouping queries and writes one flat CSV table per summary.
//! No summary pulls a full table into memory; the only row-by-row path is
//! the drug-associated variant list, which is streamed straight into its
//! output file.

use std::path::Path;
use std::time::Instant;

use futures::TryStreamExt;
use sqlx::postgres::PgPool;
use thousands::Separable;

use crate::common;
use crate::config::Config;
use crate::etl::load;

/// Command line arguments for `analyze summaries` sub command.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "compute summary tables from the store", long_about = None)]
pub struct Args {
    /// Path to the configuration file; built-in defaults are used if absent.
    #[clap(long)]
    pub path_config: Option<String>,
    /// Number of top genes to report.
    #[clap(long, default_value_t = 20)]
    pub top_genes: i64,
}

/// Variant count per chromosome.
#[derive(Debug, serde::Serialize, sqlx::FromRow)]
struct ChromosomeCountRow {
    chromosome: String,
    variant_count: i64,
}

/// Variant count per clinical significance.
#[derive(Debug, serde::Serialize, sqlx::FromRow)]
struct ClinicalSignificanceCountRow {
    clinical_significance: String,
    variant_count: i64,
}

/// One of the most variant-dense genes.
#[derive(Debug, serde::Serialize, sqlx::FromRow)]
struct TopGeneRow {
    gene_symbol: String,
    variant_count: i64,
    avg_allele_frequency: Option<f64>,
}

/// Pathogenic-like variant counts per gene and chromosome.
#[derive(Debug, serde::Serialize, sqlx::FromRow)]
struct PathogenicSummaryRow {
    gene_symbol: String,
    chromosome: String,
    pathogenic_count: i64,
    avg_allele_frequency: Option<f64>,
}

/// One drug-response variant.
#[derive(Debug, serde::Serialize, sqlx::FromRow)]
struct DrugAssociatedVariantRow {
    gene_symbol: String,
    variant_id: Option<String>,
    clinical_significance: String,
    disease_name: Option<String>,
}

/// Allele frequency distribution per chromosome.
#[derive(Debug, serde::Serialize, sqlx::FromRow)]
struct AlleleFrequencyRow {
    chromosome: String,
    min_af: Option<f64>,
    max_af: Option<f64>,
    avg_af: Option<f64>,
    variant_count: i64,
}

/// Gene-drug association with its variant count.
#[derive(Debug, serde::Serialize, sqlx::FromRow)]
struct GeneDrugAssociationRow {
    gene_symbol: String,
    drug_name: String,
    mechanism: Option<String>,
    drug_response: Option<String>,
    variant_count: i64,
}

/// Position distribution per chromosome.
#[derive(Debug, serde::Serialize, sqlx::FromRow)]
struct PositionDistributionRow {
    chromosome: String,
    min_position: i64,
    max_position: i64,
    mean_position: f64,
    median_position: f64,
    variant_count: i64,
}

/// Write one derived summary table with a header row.
fn write_summary_csv<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<(), anyhow::Error> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Variant counts per chromosome.
async fn variants_by_chromosome(pool: &PgPool) -> Result<Vec<ChromosomeCountRow>, anyhow::Error> {
    Ok(sqlx::query_as(
        "SELECT chromosome, COUNT(*) AS variant_count FROM variants \
         GROUP BY chromosome ORDER BY chromosome",
    )
    .fetch_all(pool)
    .await?)
}

/// Variant counts per clinical significance, most frequent first.
async fn variants_by_clinical_significance(
    pool: &PgPool,
) -> Result<Vec<ClinicalSignificanceCountRow>, anyhow::Error> {
    Ok(sqlx::query_as(
        "SELECT clinical_significance, COUNT(*) AS variant_count FROM variants \
         WHERE clinical_significance IS NOT NULL \
         GROUP BY clinical_significance ORDER BY variant_count DESC",
    )
    .fetch_all(pool)
    .await?)
}

/// The `limit` genes with the most variants.
async fn top_genes_by_variant_count(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<TopGeneRow>, anyhow::Error> {
    Ok(sqlx::query_as(
        "SELECT gene_symbol, COUNT(*) AS variant_count, \
         AVG(allele_frequency) AS avg_allele_frequency FROM variants \
         WHERE gene_symbol IS NOT NULL \
         GROUP BY gene_symbol ORDER BY variant_count DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?)
}

/// Per-gene summary of Pathogenic / Likely pathogenic variants.
async fn pathogenic_variants_summary(
    pool: &PgPool,
) -> Result<Vec<PathogenicSummaryRow>, anyhow::Error> {
    Ok(sqlx::query_as(
        "SELECT gene_symbol, chromosome, COUNT(*) AS pathogenic_count, \
         AVG(allele_frequency) AS avg_allele_frequency FROM variants \
         WHERE clinical_significance IN ('Pathogenic', 'Likely pathogenic') \
         AND gene_symbol IS NOT NULL \
         GROUP BY gene_symbol, chromosome ORDER BY pathogenic_count DESC",
    )
    .fetch_all(pool)
    .await?)
}

/// Stream the drug-response variants straight into their output file.
async fn write_drug_associated_variants(
    pool: &PgPool,
    path: &Path,
) -> Result<usize, anyhow::Error> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = sqlx::query_as::<_, DrugAssociatedVariantRow>(
        "SELECT gene_symbol, variant_id, clinical_significance, disease_name \
         FROM variants \
         WHERE clinical_significance = 'Drug response' AND gene_symbol IS NOT NULL \
         ORDER BY gene_symbol",
    )
    .fetch(pool);

    let mut count = 0;
    while let Some(row) = rows.try_next().await? {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Allele frequency statistics per chromosome over non-null frequencies.
async fn allele_frequency_distribution(
    pool: &PgPool,
) -> Result<Vec<AlleleFrequencyRow>, anyhow::Error> {
    Ok(sqlx::query_as(
        "SELECT chromosome, MIN(allele_frequency) AS min_af, \
         MAX(allele_frequency) AS max_af, AVG(allele_frequency) AS avg_af, \
         COUNT(*) AS variant_count FROM variants \
         WHERE allele_frequency IS NOT NULL \
         GROUP BY chromosome ORDER BY chromosome",
    )
    .fetch_all(pool)
    .await?)
}

/// Gene-drug associations joined with their per-gene variant counts.
async fn gene_drug_associations(
    pool: &PgPool,
) -> Result<Vec<GeneDrugAssociationRow>, anyhow::Error> {
    Ok(sqlx::query_as(
        "SELECT d.gene_symbol, d.drug_name, d.mechanism, d.drug_response, \
         COUNT(v.gene_symbol) AS variant_count \
         FROM drug_annotations d \
         LEFT JOIN variants v ON v.gene_symbol = d.gene_symbol \
         GROUP BY d.gene_symbol, d.drug_name, d.mechanism, d.drug_response \
         ORDER BY d.gene_symbol",
    )
    .fetch_all(pool)
    .await?)
}

/// Position distribution per chromosome, median computed server-side.
async fn position_distribution(
    pool: &PgPool,
) -> Result<Vec<PositionDistributionRow>, anyhow::Error> {
    Ok(sqlx::query_as(
        "SELECT chromosome, MIN(position) AS min_position, \
         MAX(position) AS max_position, \
         AVG(position::double precision) AS mean_position, \
         PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY position::double precision) \
         AS median_position, \
         COUNT(*) AS variant_count FROM variants \
         GROUP BY chromosome ORDER BY chromosome",
    )
    .fetch_all(pool)
    .await?)
}

/// Compute all summaries and write one CSV per summary into
/// `paths.processed_dir`.
pub async fn generate_all_summaries(
    pool: &PgPool,
    config: &Config,
    top_genes: i64,
) -> Result<(), anyhow::Error> {
    let out_dir = &config.paths.processed_dir;
    std::fs::create_dir_all(out_dir)?;

    let by_chromosome = variants_by_chromosome(pool).await?;
    write_summary_csv(&out_dir.join("variants_by_chromosome.csv"), &by_chromosome)?;
    tracing::info!("saved counts for {} chromosomes", by_chromosome.len());

    let by_significance = variants_by_clinical_significance(pool).await?;
    write_summary_csv(
        &out_dir.join("variants_by_clinical_significance.csv"),
        &by_significance,
    )?;
    tracing::info!(
        "saved counts for {} clinical significance categories",
        by_significance.len()
    );

    let top = top_genes_by_variant_count(pool, top_genes).await?;
    write_summary_csv(&out_dir.join("top_genes.csv"), &top)?;
    tracing::info!("saved top {} genes", top.len());

    let pathogenic = pathogenic_variants_summary(pool).await?;
    write_summary_csv(&out_dir.join("pathogenic_variants.csv"), &pathogenic)?;
    tracing::info!("saved pathogenic summaries for {} genes", pathogenic.len());

    let drug_associated =
        write_drug_associated_variants(pool, &out_dir.join("drug_associated_variants.csv"))
            .await?;
    tracing::info!(
        "saved {} drug-associated variants",
        drug_associated.separate_with_commas()
    );

    let af_distribution = allele_frequency_distribution(pool).await?;
    write_summary_csv(
        &out_dir.join("allele_frequency_distribution.csv"),
        &af_distribution,
    )?;
    tracing::info!(
        "saved allele frequency statistics for {} chromosomes",
        af_distribution.len()
    );

    let associations = gene_drug_associations(pool).await?;
    write_summary_csv(&out_dir.join("gene_drug_associations.csv"), &associations)?;
    tracing::info!("saved {} gene-drug associations", associations.len());

    let positions = position_distribution(pool).await?;
    write_summary_csv(&out_dir.join("position_distribution.csv"), &positions)?;
    tracing::info!(
        "saved position distributions for {} chromosomes",
        positions.len()
    );

    let mutation_summary = load::fetch_mutation_summary(pool).await?;
    write_summary_csv(&out_dir.join("mutation_summary.csv"), &mutation_summary)?;
    tracing::info!(
        "saved {} mutation summary groups",
        mutation_summary.len().separate_with_commas()
    );

    Ok(())
}

/// Main entry point for `analyze summaries` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let config = Config::load_or_default(args.path_config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let pool = load::connect(&config.database).await?;
        load::ping(&pool).await?;
        generate_all_summaries(&pool, &config, args.top_genes).await?;
        Ok::<(), anyhow::Error>(())
    })?;

    tracing::info!(
        "All of `analyze summaries` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use temp_testdir::TempDir;

    use super::{write_summary_csv, ChromosomeCountRow};

    #[test]
    fn summary_csv_has_header_and_rows() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let path = tmp_dir.join("variants_by_chromosome.csv");

        write_summary_csv(
            &path,
            &[
                ChromosomeCountRow {
                    chromosome: String::from("1"),
                    variant_count: 12,
                },
                ChromosomeCountRow {
                    chromosome: String::from("X"),
                    variant_count: 3,
                },
            ],
        )?;

        let contents = std::fs::read_to_string(&path)?;
        assert_eq!("chromosome,variant_count\n1,12\nX,3\n", contents);

        Ok(())
    }
}
