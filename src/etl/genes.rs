//! Derivation of the unique gene set referenced by variants.

use std::path::Path;

use indexmap::IndexMap;

use crate::etl::transform::{TransformOutput, VariantRecord};

/// One distinct gene, keyed by symbol.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct GeneRecord {
    /// gene symbol, unique
    pub gene_symbol: String,
    /// gene identifier as first seen for the symbol
    pub gene_id: Option<String>,
    /// chromosome as first seen for the symbol
    pub chromosome: String,
    /// description, populated by enrichment only
    pub description: Option<String>,
}

/// Record the gene of `record` unless its symbol was seen before.
///
/// The first occurrence in stream order wins; later occurrences are ignored
/// even if gene identifier or chromosome disagree.
fn insert_first_seen(seen: &mut IndexMap<String, GeneRecord>, record: &VariantRecord) {
    let Some(symbol) = record.gene_symbol.as_ref() else {
        return;
    };
    if !seen.contains_key(symbol) {
        seen.insert(
            symbol.clone(),
            GeneRecord {
                gene_symbol: symbol.clone(),
                gene_id: record.gene_id.clone(),
                chromosome: record.chromosome.clone(),
                description: None,
            },
        );
    }
}

/// Derive the unique gene set from a transform output.
///
/// The staged path streams the staging file record by record, so memory use
/// is bounded by the number of *distinct* genes, not the number of variants.
pub fn extract_genes(output: &TransformOutput) -> Result<Vec<GeneRecord>, anyhow::Error> {
    tracing::info!("extracting unique genes");
    let mut seen: IndexMap<String, GeneRecord> = IndexMap::new();

    match output {
        TransformOutput::Materialized(records) => {
            for record in records {
                insert_first_seen(&mut seen, record);
            }
        }
        TransformOutput::Staged(staged) => {
            tracing::info!(
                "large dataset ({} variants); re-reading genes from {:?}",
                staged.record_count,
                &staged.path
            );
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .from_path(&staged.path)?;
            for record in reader.deserialize() {
                let record: VariantRecord = record?;
                insert_first_seen(&mut seen, &record);
            }
        }
    }

    tracing::info!("extracted {} unique genes", seen.len());
    Ok(seen.into_values().collect())
}

/// Write gene records to `path` with a header row.
///
/// An empty gene set writes a header-only file; zero genes is a legitimate
/// outcome, not an error.
pub fn write_genes_csv(path: &Path, genes: &[GeneRecord]) -> Result<(), anyhow::Error> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    if genes.is_empty() {
        writer.write_record(["gene_symbol", "gene_id", "chromosome", "description"])?;
    }
    for gene in genes {
        writer.serialize(gene)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read gene records from `path`; an empty or header-only file yields an
/// empty set.
pub fn read_genes_csv(path: &Path) -> Result<Vec<GeneRecord>, anyhow::Error> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut genes = Vec::new();
    for record in reader.deserialize() {
        genes.push(record?);
    }
    Ok(genes)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use temp_testdir::TempDir;

    use crate::etl::transform::{StagedVariants, TransformOutput, VariantRecord};

    use super::{extract_genes, read_genes_csv, write_genes_csv};

    fn variant(symbol: Option<&str>, gene_id: Option<&str>, chromosome: &str) -> VariantRecord {
        VariantRecord {
            chromosome: chromosome.to_string(),
            position: 100,
            variant_id: None,
            reference_allele: String::from("A"),
            alternate_allele: String::from("G"),
            quality: None,
            filter: String::from("PASS"),
            allele_frequency: None,
            allele_count: None,
            total_alleles: None,
            clinical_significance: String::from("Unknown"),
            disease_name: None,
            gene_symbol: symbol.map(String::from),
            gene_id: gene_id.map(String::from),
            info_raw: String::new(),
        }
    }

    #[test]
    fn dedup_keeps_first_seen_gene_id() -> Result<(), anyhow::Error> {
        let output = TransformOutput::Materialized(vec![
            variant(Some("BRCA1"), Some("672"), "17"),
            variant(Some("BRCA1"), Some("999"), "17"),
            variant(Some("TP53"), Some("7157"), "17"),
        ]);

        let genes = extract_genes(&output)?;

        assert_eq!(2, genes.len());
        assert_eq!("BRCA1", genes[0].gene_symbol);
        assert_eq!(Some(String::from("672")), genes[0].gene_id);
        assert_eq!("TP53", genes[1].gene_symbol);

        Ok(())
    }

    #[test]
    fn dedup_skips_records_without_gene_symbol() -> Result<(), anyhow::Error> {
        let output = TransformOutput::Materialized(vec![
            variant(None, None, "1"),
            variant(Some("MECP2"), None, "X"),
            variant(None, Some("7157"), "17"),
        ]);

        let genes = extract_genes(&output)?;

        assert_eq!(1, genes.len());
        assert_eq!("MECP2", genes[0].gene_symbol);
        assert_eq!(None, genes[0].gene_id);

        Ok(())
    }

    #[test]
    fn staged_path_matches_materialized_path() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let records = vec![
            variant(Some("BRCA1"), Some("672"), "17"),
            variant(Some("BRCA1"), Some("999"), "17"),
            variant(None, None, "1"),
            variant(Some("TP53"), Some("7157"), "17"),
        ];

        let staging_path = tmp_dir.join("variants.csv");
        crate::etl::transform::write_variants_csv(&staging_path, &records)?;

        let from_staged = extract_genes(&TransformOutput::Staged(StagedVariants {
            path: staging_path,
            record_count: records.len(),
        }))?;
        let from_materialized = extract_genes(&TransformOutput::Materialized(records))?;

        assert_eq!(from_materialized, from_staged);

        Ok(())
    }

    #[test]
    fn genes_csv_round_trip() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let path = tmp_dir.join("genes.csv");

        let genes = extract_genes(&TransformOutput::Materialized(vec![
            variant(Some("BRCA2"), Some("675"), "13"),
            variant(Some("MECP2"), None, "X"),
        ]))?;
        write_genes_csv(&path, &genes)?;

        assert_eq!(genes, read_genes_csv(&path)?);

        Ok(())
    }

    #[test]
    fn empty_gene_set_writes_header_only_file() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let path = tmp_dir.join("genes.csv");

        write_genes_csv(&path, &[])?;

        let contents = std::fs::read_to_string(&path)?;
        assert_eq!("gene_symbol,gene_id,chromosome,description\n", contents);
        assert_eq!(0, read_genes_csv(&path)?.len());

        Ok(())
    }
}
