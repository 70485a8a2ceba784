//! Implementation of the `etl load` sub command.
//!
//! Loads the staged variant, gene, and drug-annotation tables into
//! PostgreSQL with throughput-oriented settings: unlogged tables, no commit
//! acknowledgment wait, `COPY`-based variant streaming, and secondary index
//! construction strictly after the bulk load. The mutation summary is
//! recomputed from scratch with a single server-side grouping statement.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use itertools::Itertools;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Executor;
use strum::IntoEnumIterator;
use thousands::Separable;

use crate::common;
use crate::config::{Config, DatabaseConfig};
use crate::etl::enrich::{read_drug_annotations_csv, DrugAnnotationRecord};
use crate::etl::genes::GeneRecord;
use crate::etl::transform::VariantRecord;

/// Command line arguments for `etl load` sub command.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "bulk load staging tables into the store", long_about = None)]
pub struct Args {
    /// Path to the configuration file; built-in defaults are used if absent.
    #[clap(long)]
    pub path_config: Option<String>,
    /// Drop existing tables before loading; without it loading is additive.
    #[clap(long)]
    pub drop_existing: bool,
}

/// Load phase errors that need distinct handling.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    /// The store did not answer the pre-load ping.
    #[error("store connection failed: {0}")]
    Connectivity(#[source] sqlx::Error),
    /// A required upstream artifact is missing.
    #[error("missing required input file: {0}")]
    MissingInput(PathBuf),
}

/// The store tables owned by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Table {
    Variants,
    Genes,
    DrugAnnotations,
    MutationSummary,
}

/// One row of the recomputed mutation summary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, sqlx::FromRow)]
pub struct MutationSummaryRecord {
    /// chromosome name
    pub chromosome: String,
    /// gene symbol
    pub gene_symbol: String,
    /// canonicalized clinical significance
    pub clinical_significance: String,
    /// number of variants in the group
    pub variant_count: i64,
    /// average allele frequency over the group
    pub avg_allele_frequency: Option<f64>,
    /// variants classified Pathogenic or Likely pathogenic
    pub pathogenic_count: i64,
    /// variants classified Benign or Likely benign
    pub benign_count: i64,
    /// variants classified Drug response
    pub drug_associated_count: i64,
}

/// Columns of the `variants` table, in staging CSV order.
const VARIANT_COLUMNS: &[&str] = &[
    "chromosome",
    "position",
    "variant_id",
    "reference_allele",
    "alternate_allele",
    "quality",
    "filter",
    "allele_frequency",
    "allele_count",
    "total_alleles",
    "clinical_significance",
    "disease_name",
    "gene_symbol",
    "gene_id",
    "info_raw",
];

/// Columns of the `genes` table.
const GENE_COLUMNS: &[&str] = &["gene_symbol", "gene_id", "chromosome", "description"];

/// Columns of the `drug_annotations` table.
const DRUG_ANNOTATION_COLUMNS: &[&str] = &[
    "gene_symbol",
    "drug_name",
    "drug_bank_id",
    "mechanism",
    "indication",
    "drug_response",
    "adverse_effects",
    "clinical_trials",
    "source",
];

/// DDL of the given table. All tables are unlogged: bulk load throughput is
/// preferred over durability, reruns are the recovery mechanism.
fn create_table_sql(table: Table) -> &'static str {
    match table {
        Table::Variants => {
            "CREATE UNLOGGED TABLE IF NOT EXISTS variants (\
             chromosome TEXT NOT NULL, \
             position BIGINT NOT NULL, \
             variant_id TEXT, \
             reference_allele TEXT, \
             alternate_allele TEXT, \
             quality DOUBLE PRECISION, \
             filter TEXT, \
             allele_frequency DOUBLE PRECISION, \
             allele_count BIGINT, \
             total_alleles BIGINT, \
             clinical_significance TEXT, \
             disease_name TEXT, \
             gene_symbol TEXT, \
             gene_id TEXT, \
             info_raw TEXT)"
        }
        Table::Genes => {
            "CREATE UNLOGGED TABLE IF NOT EXISTS genes (\
             gene_symbol TEXT NOT NULL, \
             gene_id TEXT, \
             chromosome TEXT, \
             description TEXT)"
        }
        Table::DrugAnnotations => {
            "CREATE UNLOGGED TABLE IF NOT EXISTS drug_annotations (\
             gene_symbol TEXT NOT NULL, \
             drug_name TEXT NOT NULL, \
             drug_bank_id TEXT, \
             mechanism TEXT, \
             indication TEXT, \
             drug_response TEXT, \
             adverse_effects TEXT, \
             clinical_trials TEXT, \
             source TEXT)"
        }
        Table::MutationSummary => {
            "CREATE UNLOGGED TABLE IF NOT EXISTS mutation_summary (\
             chromosome TEXT NOT NULL, \
             gene_symbol TEXT NOT NULL, \
             clinical_significance TEXT NOT NULL, \
             variant_count BIGINT NOT NULL, \
             avg_allele_frequency DOUBLE PRECISION, \
             pathogenic_count BIGINT NOT NULL, \
             benign_count BIGINT NOT NULL, \
             drug_associated_count BIGINT NOT NULL)"
        }
    }
}

/// Secondary indexes, created only after bulk loading completes.
const INDEXES: &[(bool, &str, &str, &str)] = &[
    (false, "variants_chromosome", "variants", "(chromosome)"),
    (false, "variants_position", "variants", "(position)"),
    (false, "variants_variant_id", "variants", "(variant_id)"),
    (false, "variants_gene_symbol", "variants", "(gene_symbol)"),
    (
        false,
        "variants_clinical_significance",
        "variants",
        "(clinical_significance)",
    ),
    (
        false,
        "variants_chromosome_position",
        "variants",
        "(chromosome, position)",
    ),
    (
        false,
        "variants_gene_symbol_clinical_significance",
        "variants",
        "(gene_symbol, clinical_significance)",
    ),
    (true, "genes_gene_symbol", "genes", "(gene_symbol)"),
    (false, "genes_gene_id", "genes", "(gene_id)"),
    (false, "genes_chromosome", "genes", "(chromosome)"),
    (
        false,
        "drug_annotations_gene_symbol",
        "drug_annotations",
        "(gene_symbol)",
    ),
    (
        false,
        "drug_annotations_drug_name",
        "drug_annotations",
        "(drug_name)",
    ),
    (
        false,
        "drug_annotations_gene_symbol_drug_name",
        "drug_annotations",
        "(gene_symbol, drug_name)",
    ),
    (
        false,
        "mutation_summary_chromosome",
        "mutation_summary",
        "(chromosome)",
    ),
    (
        false,
        "mutation_summary_gene_symbol",
        "mutation_summary",
        "(gene_symbol)",
    ),
    (
        false,
        "mutation_summary_clinical_significance",
        "mutation_summary",
        "(clinical_significance)",
    ),
];

/// Maximal number of bind parameters per statement (PostgreSQL protocol
/// limit).
const MAX_BIND_PARAMS: usize = 65_535;

/// Rows per INSERT statement for a table with `columns` bind parameters per
/// row.
fn insert_chunk_rows(columns: usize) -> usize {
    MAX_BIND_PARAMS / columns
}

/// Build a multi-row `INSERT ... ON CONFLICT DO NOTHING` statement.
///
/// The conflict clause makes the batch unordered: a row that violates a
/// uniqueness constraint is skipped without aborting the remaining rows, and
/// `rows_affected` reports how many actually went in.
fn build_insert_sql(table: &str, columns: &[&str], rows: usize) -> String {
    let tuples = (0..rows)
        .map(|row| {
            let placeholders = (1..=columns.len())
                .map(|column| format!("${}", row * columns.len() + column))
                .join(", ");
            format!("({})", placeholders)
        })
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT DO NOTHING",
        table,
        columns.join(", "),
        tuples
    )
}

/// Pick the variant batch size based on the staging file size.
fn variant_batch_size(file_size: u64, db: &DatabaseConfig) -> usize {
    if file_size > db.large_file_threshold_bytes {
        db.large_file_batch_size
    } else {
        db.batch_size
    }
}

/// Open a connection pool configured for insert throughput over durability.
///
/// Writes are not acknowledged durably: `synchronous_commit` is switched off
/// on every pooled connection, and all tables are unlogged. There is no
/// automatic write retry; unordered inserts substitute for it.
pub async fn connect(db: &DatabaseConfig) -> Result<PgPool, anyhow::Error> {
    tracing::info!("connecting to store at {}", &db.url);
    let statement_timeout_ms = db.statement_timeout_secs * 1_000;
    let pool = PgPoolOptions::new()
        .max_connections(db.pool_max_connections)
        .min_connections(db.pool_min_connections)
        .acquire_timeout(Duration::from_secs(db.connect_timeout_secs))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute("SET synchronous_commit TO 'off'").await?;
                conn.execute(format!("SET statement_timeout TO {}", statement_timeout_ms).as_str())
                    .await?;
                Ok(())
            })
        })
        .connect(&db.url)
        .await
        .map_err(LoadError::Connectivity)?;
    tracing::info!(
        "connection pool ready ({}-{} connections)",
        db.pool_min_connections,
        db.pool_max_connections
    );
    Ok(pool)
}

/// Lightweight round-trip to verify that the store is reachable.
pub async fn ping(pool: &PgPool) -> Result<(), LoadError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(LoadError::Connectivity)
}

/// Create the loader-owned tables, optionally dropping existing ones first.
pub async fn create_tables(pool: &PgPool, drop_existing: bool) -> Result<(), anyhow::Error> {
    for table in Table::iter() {
        if drop_existing {
            tracing::warn!("dropping existing table {}", table);
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(pool)
                .await?;
        }
        sqlx::query(create_table_sql(table)).execute(pool).await?;
        tracing::info!("table {} ready", table);
    }
    Ok(())
}

/// Submit one variant batch through the COPY protocol, returning its row
/// count.
async fn copy_variant_batch(pool: &PgPool, batch: &[VariantRecord]) -> Result<u64, anyhow::Error> {
    let mut encoder = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for record in batch {
        encoder.serialize(record)?;
    }
    encoder.flush()?;
    let data = encoder
        .into_inner()
        .map_err(|e| anyhow::anyhow!("could not finish CSV encoding: {}", e))?;

    let mut conn = pool.acquire().await?;
    let mut copy = conn
        .copy_in_raw(&format!(
            "COPY variants ({}) FROM STDIN WITH (FORMAT csv, NULL '')",
            VARIANT_COLUMNS.join(", ")
        ))
        .await?;
    copy.send(data.as_slice()).await?;
    Ok(copy.finish().await?)
}

/// Stream the staged variants CSV into the store in large batches.
///
/// Batches are submitted in file order; within a batch no ordering is
/// guaranteed or required.
pub async fn load_variants(
    pool: &PgPool,
    path: &Path,
    db: &DatabaseConfig,
) -> Result<u64, anyhow::Error> {
    if !path.exists() {
        return Err(LoadError::MissingInput(path.to_path_buf()).into());
    }
    let file_size = std::fs::metadata(path)?.len();
    let batch_size = variant_batch_size(file_size, db);
    tracing::info!(
        "loading variants from {:?} ({} bytes, {} row batches)",
        path,
        file_size.separate_with_commas(),
        batch_size.separate_with_commas()
    );
    let before_loading = Instant::now();

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut batch: Vec<VariantRecord> = Vec::new();
    let mut total_rows = 0u64;
    let mut batch_no = 0usize;

    for record in reader.deserialize() {
        batch.push(record?);
        if batch.len() >= batch_size {
            total_rows += copy_variant_batch(pool, &batch).await?;
            batch.clear();
            batch_no += 1;
            if batch_no % 5 == 0 {
                tracing::info!(
                    "loaded {} variants ({} batches)",
                    total_rows.separate_with_commas(),
                    batch_no
                );
            }
        }
    }
    if !batch.is_empty() {
        total_rows += copy_variant_batch(pool, &batch).await?;
    }

    tracing::info!(
        "loaded {} variants in {:?}",
        total_rows.separate_with_commas(),
        before_loading.elapsed()
    );
    Ok(total_rows)
}

/// Insert gene records in unordered batches; rows violating the unique gene
/// symbol constraint are skipped and the successful row count is returned.
pub async fn insert_genes(pool: &PgPool, genes: &[GeneRecord]) -> Result<u64, anyhow::Error> {
    let mut inserted = 0u64;
    for chunk in genes.chunks(insert_chunk_rows(GENE_COLUMNS.len())) {
        let sql = build_insert_sql("genes", GENE_COLUMNS, chunk.len());
        let mut query = sqlx::query(&sql);
        for gene in chunk {
            query = query
                .bind(&gene.gene_symbol)
                .bind(&gene.gene_id)
                .bind(&gene.chromosome)
                .bind(&gene.description);
        }
        inserted += query.execute(pool).await?.rows_affected();
    }
    Ok(inserted)
}

/// Load gene records from the staging CSV.
///
/// A missing file is fatal (the transform stage must have run); an empty
/// file only means that no variant carried a gene symbol.
pub async fn load_genes(pool: &PgPool, path: &Path) -> Result<u64, anyhow::Error> {
    if !path.exists() {
        return Err(LoadError::MissingInput(path.to_path_buf()).into());
    }
    let genes = crate::etl::genes::read_genes_csv(path)?;
    if genes.is_empty() {
        tracing::warn!("genes file {:?} is empty, skipping gene loading", path);
        return Ok(0);
    }

    let inserted = insert_genes(pool, &genes).await?;
    let skipped = genes.len() as u64 - inserted;
    if skipped > 0 {
        tracing::info!("loaded {} genes ({} duplicates skipped)", inserted, skipped);
    } else {
        tracing::info!("loaded {} genes", inserted);
    }
    Ok(inserted)
}

/// Insert drug annotation records in unordered batches.
pub async fn insert_drug_annotations(
    pool: &PgPool,
    annotations: &[DrugAnnotationRecord],
) -> Result<u64, anyhow::Error> {
    let mut inserted = 0u64;
    for chunk in annotations.chunks(insert_chunk_rows(DRUG_ANNOTATION_COLUMNS.len())) {
        let sql = build_insert_sql("drug_annotations", DRUG_ANNOTATION_COLUMNS, chunk.len());
        let mut query = sqlx::query(&sql);
        for annotation in chunk {
            query = query
                .bind(&annotation.gene_symbol)
                .bind(&annotation.drug_name)
                .bind(&annotation.drug_bank_id)
                .bind(&annotation.mechanism)
                .bind(&annotation.indication)
                .bind(&annotation.drug_response)
                .bind(&annotation.adverse_effects)
                .bind(&annotation.clinical_trials)
                .bind(&annotation.source);
        }
        inserted += query.execute(pool).await?.rows_affected();
    }
    Ok(inserted)
}

/// Load drug annotations; both a missing and an empty file are skipped with
/// a warning since the enrichment phase is optional.
pub async fn load_drug_annotations(pool: &PgPool, path: &Path) -> Result<u64, anyhow::Error> {
    if !path.exists() {
        tracing::warn!("drug annotations file {:?} not found, skipping", path);
        return Ok(0);
    }
    let annotations = read_drug_annotations_csv(path)?;
    if annotations.is_empty() {
        tracing::warn!("drug annotations file {:?} is empty, skipping", path);
        return Ok(0);
    }

    let inserted = insert_drug_annotations(pool, &annotations).await?;
    tracing::info!("loaded {} drug annotations", inserted);
    Ok(inserted)
}

/// Create all secondary indexes. Called only after the bulk data load so
/// that inserts never serialize against index maintenance.
pub async fn create_indexes(pool: &PgPool) -> Result<(), anyhow::Error> {
    tracing::info!("creating indexes");
    for (unique, name, table, columns) in INDEXES {
        let sql = format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} {}",
            if *unique { "UNIQUE " } else { "" },
            name,
            table,
            columns
        );
        sqlx::query(&sql).execute(pool).await?;
    }
    tracing::info!("created {} indexes", INDEXES.len());
    Ok(())
}

/// Recompute the mutation summary from scratch with one server-side
/// grouping statement over the variants that carry a gene symbol.
pub async fn create_mutation_summary(pool: &PgPool) -> Result<u64, anyhow::Error> {
    tracing::info!("recomputing mutation summary");
    sqlx::query("DELETE FROM mutation_summary").execute(pool).await?;

    let result = sqlx::query(
        "INSERT INTO mutation_summary (chromosome, gene_symbol, clinical_significance, \
         variant_count, avg_allele_frequency, pathogenic_count, benign_count, \
         drug_associated_count) \
         SELECT chromosome, gene_symbol, clinical_significance, \
         COUNT(*), \
         AVG(allele_frequency), \
         COUNT(*) FILTER (WHERE clinical_significance IN ('Pathogenic', 'Likely pathogenic')), \
         COUNT(*) FILTER (WHERE clinical_significance IN ('Benign', 'Likely benign')), \
         COUNT(*) FILTER (WHERE clinical_significance = 'Drug response') \
         FROM variants \
         WHERE gene_symbol IS NOT NULL \
         GROUP BY chromosome, gene_symbol, clinical_significance",
    )
    .execute(pool)
    .await?;

    let rows = result.rows_affected();
    if rows == 0 {
        tracing::warn!("no mutation summary data generated");
    } else {
        tracing::info!(
            "created mutation summary with {} rows",
            rows.separate_with_commas()
        );
    }
    Ok(rows)
}

/// Fetch the current mutation summary, largest groups first.
pub async fn fetch_mutation_summary(
    pool: &PgPool,
) -> Result<Vec<MutationSummaryRecord>, anyhow::Error> {
    Ok(sqlx::query_as::<_, MutationSummaryRecord>(
        "SELECT chromosome, gene_symbol, clinical_significance, variant_count, \
         avg_allele_frequency, pathogenic_count, benign_count, drug_associated_count \
         FROM mutation_summary ORDER BY variant_count DESC, gene_symbol",
    )
    .fetch_all(pool)
    .await?)
}

/// Row counts of all loader-owned tables.
pub async fn collection_counts(pool: &PgPool) -> Result<Vec<(Table, i64)>, anyhow::Error> {
    let mut counts = Vec::new();
    for table in Table::iter() {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await?;
        counts.push((table, count));
    }
    Ok(counts)
}

/// Complete loading sequence: ping, tables, data, indexes, summary.
pub async fn load_all(
    pool: &PgPool,
    config: &Config,
    drop_existing: bool,
) -> Result<(), anyhow::Error> {
    // Fail before any collection mutation if the store is unreachable.
    ping(pool).await?;
    tracing::info!("store connection test passed");

    create_tables(pool, drop_existing).await?;

    load_variants(pool, &config.paths.variants_csv, &config.database).await?;
    load_genes(pool, &config.paths.genes_csv).await?;
    load_drug_annotations(pool, &config.paths.drug_annotations_csv).await?;

    create_indexes(pool).await?;
    create_mutation_summary(pool).await?;

    Ok(())
}

/// Main entry point for `etl load` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let config = Config::load_or_default(args.path_config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let pool = connect(&config.database).await?;
        load_all(&pool, &config, args.drop_existing).await?;

        for (table, count) in collection_counts(&pool).await? {
            tracing::info!("  {}: {} rows", table, count.separate_with_commas());
        }
        Ok::<(), anyhow::Error>(())
    })?;

    tracing::info!(
        "All of `etl load` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::config::DatabaseConfig;

    use super::{
        build_insert_sql, create_table_sql, insert_chunk_rows, variant_batch_size, Table,
        GENE_COLUMNS,
    };

    #[test]
    fn insert_sql_shape() {
        let sql = build_insert_sql("genes", GENE_COLUMNS, 2);

        assert_eq!(
            "INSERT INTO genes (gene_symbol, gene_id, chromosome, description) \
             VALUES ($1, $2, $3, $4), ($5, $6, $7, $8) ON CONFLICT DO NOTHING",
            sql
        );
    }

    #[test]
    fn insert_chunks_respect_bind_parameter_limit() {
        assert_eq!(16_383, insert_chunk_rows(4));
        assert_eq!(7_281, insert_chunk_rows(9));
        assert!(insert_chunk_rows(4) * 4 <= super::MAX_BIND_PARAMS);
    }

    #[rstest]
    #[case(1_000, 50_000)]
    #[case(1_000 * 1_024 * 1_024, 50_000)]
    #[case(1_000 * 1_024 * 1_024 + 1, 500_000)]
    #[case(4 * 1_024 * 1_024 * 1_024, 500_000)]
    fn variant_batch_size_scales_with_file_size(#[case] file_size: u64, #[case] expected: usize) {
        let db = DatabaseConfig::default();

        assert_eq!(expected, variant_batch_size(file_size, &db));
    }

    #[test]
    fn tables_are_unlogged() {
        for table in [
            Table::Variants,
            Table::Genes,
            Table::DrugAnnotations,
            Table::MutationSummary,
        ] {
            assert!(create_table_sql(table).starts_with("CREATE UNLOGGED TABLE IF NOT EXISTS"));
        }
    }

    #[test]
    fn table_names_match_store_collections() {
        assert_eq!("variants", Table::Variants.to_string());
        assert_eq!("genes", Table::Genes.to_string());
        assert_eq!("drug_annotations", Table::DrugAnnotations.to_string());
        assert_eq!("mutation_summary", Table::MutationSummary.to_string());
    }
}

#[cfg(test)]
mod live_tests {
    //! Tests against a running PostgreSQL server.
    //!
    //! Run with `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.

    use pretty_assertions::assert_eq;
    use temp_testdir::TempDir;

    use crate::config::{Config, DatabaseConfig};
    use crate::etl::enrich::{create_drug_annotations, write_drug_annotations_csv};
    use crate::etl::genes::{extract_genes, write_genes_csv, GeneRecord};
    use crate::etl::transform::{write_variants_csv, TransformOutput, VariantRecord};

    use super::Table;

    fn test_database_config() -> Option<DatabaseConfig> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        Some(DatabaseConfig {
            url,
            pool_max_connections: 5,
            pool_min_connections: 0,
            ..DatabaseConfig::default()
        })
    }

    fn variant(
        chromosome: &str,
        position: i64,
        significance: &str,
        allele_frequency: Option<f64>,
        gene: Option<(&str, &str)>,
    ) -> VariantRecord {
        VariantRecord {
            chromosome: chromosome.to_string(),
            position,
            variant_id: Some(format!("rs{}", position)),
            reference_allele: String::from("A"),
            alternate_allele: String::from("G"),
            quality: None,
            filter: String::from("PASS"),
            allele_frequency,
            allele_count: None,
            total_alleles: None,
            clinical_significance: significance.to_string(),
            disease_name: None,
            gene_symbol: gene.map(|(symbol, _)| symbol.to_string()),
            gene_id: gene.map(|(_, id)| id.to_string()),
            info_raw: String::new(),
        }
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL server via TEST_DATABASE_URL"]
    async fn load_all_and_summary_invariants() -> Result<(), anyhow::Error> {
        let Some(db) = test_database_config() else {
            anyhow::bail!("TEST_DATABASE_URL is not set");
        };

        let tmp_dir = TempDir::default();
        let mut config = Config::default();
        config.database = db;
        config.paths.variants_csv = tmp_dir.join("variants.csv");
        config.paths.genes_csv = tmp_dir.join("genes.csv");
        config.paths.drug_annotations_csv = tmp_dir.join("drug_annotations.csv");

        let variants = vec![
            variant("17", 100, "Pathogenic", Some(0.001), Some(("BRCA1", "672"))),
            variant("17", 200, "Pathogenic", Some(0.003), Some(("BRCA1", "672"))),
            variant("17", 300, "Benign", Some(0.2), Some(("BRCA1", "672"))),
            variant("17", 400, "Drug response", None, Some(("TP53", "7157"))),
            variant("1", 500, "Unknown", None, None),
        ];
        write_variants_csv(&config.paths.variants_csv, &variants)?;

        let output = TransformOutput::Materialized(variants);
        let genes = extract_genes(&output)?;
        write_genes_csv(&config.paths.genes_csv, &genes)?;
        write_drug_annotations_csv(
            &config.paths.drug_annotations_csv,
            &create_drug_annotations(&genes),
        )?;

        let pool = super::connect(&config.database).await?;
        super::load_all(&pool, &config, true).await?;

        for (table, count) in super::collection_counts(&pool).await? {
            let expected = match table {
                Table::Variants => 5,
                Table::Genes => 2,
                Table::DrugAnnotations => 2,
                Table::MutationSummary => 3,
            };
            assert_eq!(expected, count, "row count of table {}", table);
        }

        // One of five rows collides with the unique gene symbol index; the
        // other four go in and the batch does not abort.
        let more_genes = ["BRCA1", "EGFR", "KRAS", "ALK", "BRAF"].map(|symbol| GeneRecord {
            gene_symbol: symbol.to_string(),
            gene_id: None,
            chromosome: String::from("1"),
            description: None,
        });
        let inserted = super::insert_genes(&pool, &more_genes).await?;
        assert_eq!(4, inserted);

        let summary = super::fetch_mutation_summary(&pool).await?;
        assert_eq!(3, summary.len());
        for row in &summary {
            assert!(
                row.pathogenic_count + row.benign_count + row.drug_associated_count
                    <= row.variant_count,
                "conditional counts exceed the group size: {:?}",
                row
            );
        }

        let brca1_pathogenic = summary
            .iter()
            .find(|row| {
                row.gene_symbol == "BRCA1" && row.clinical_significance == "Pathogenic"
            })
            .unwrap();
        assert_eq!(2, brca1_pathogenic.variant_count);
        assert_eq!(2, brca1_pathogenic.pathogenic_count);
        assert_eq!(0, brca1_pathogenic.benign_count);
        assert_eq!(0, brca1_pathogenic.drug_associated_count);
        assert!(float_cmp::approx_eq!(
            f64,
            0.002,
            brca1_pathogenic.avg_allele_frequency.unwrap(),
            epsilon = 1e-9
        ));

        Ok(())
    }
}
