//! Implementation of the `etl enrich` sub command.
//!
//! Matches the extracted genes against a built-in pharmacogenomic
//! association table and writes the drug annotations staging file.

use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use crate::common;
use crate::config::Config;
use crate::etl::genes::{read_genes_csv, GeneRecord};

/// Command line arguments for `etl enrich` sub command.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "enrich extracted genes with drug annotations", long_about = None)]
pub struct Args {
    /// Path to the configuration file; built-in defaults are used if absent.
    #[clap(long)]
    pub path_config: Option<String>,
}

/// One gene-drug association.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct DrugAnnotationRecord {
    /// gene symbol the drug acts on
    pub gene_symbol: String,
    /// drug name
    pub drug_name: String,
    /// DrugBank identifier
    pub drug_bank_id: String,
    /// mechanism of action
    pub mechanism: String,
    /// clinical indication
    pub indication: String,
    /// expected drug response
    pub drug_response: String,
    /// known adverse effects
    pub adverse_effects: String,
    /// related clinical trials
    pub clinical_trials: String,
    /// data source
    pub source: String,
}

impl DrugAnnotationRecord {
    fn new(fields: [&str; 9]) -> Self {
        let [gene_symbol, drug_name, drug_bank_id, mechanism, indication, drug_response, adverse_effects, clinical_trials, source] =
            fields.map(String::from);
        Self {
            gene_symbol,
            drug_name,
            drug_bank_id,
            mechanism,
            indication,
            drug_response,
            adverse_effects,
            clinical_trials,
            source,
        }
    }
}

/// Built-in gene-drug association table (DrugBank / PharmGKB excerpts).
pub fn drug_gene_associations() -> Vec<DrugAnnotationRecord> {
    [
        [
            "BRCA1",
            "Olaparib",
            "DB09074",
            "PARP inhibitor",
            "Breast and ovarian cancer treatment",
            "Sensitive",
            "Nausea, fatigue, anemia",
            "NCT01844986, NCT02000622",
            "DrugBank",
        ],
        [
            "BRCA2",
            "Olaparib",
            "DB09074",
            "PARP inhibitor",
            "Breast and ovarian cancer treatment",
            "Sensitive",
            "Nausea, fatigue, anemia",
            "NCT01844986",
            "DrugBank",
        ],
        [
            "EGFR",
            "Gefitinib",
            "DB00317",
            "Tyrosine kinase inhibitor",
            "Non-small cell lung cancer",
            "Sensitive to activating mutations",
            "Diarrhea, rash, dry skin",
            "NCT00000123",
            "DrugBank",
        ],
        [
            "KRAS",
            "Sotorasib",
            "DB15768",
            "KRAS G12C inhibitor",
            "KRAS G12C-mutated non-small cell lung cancer",
            "Sensitive to G12C mutation",
            "Diarrhea, nausea, fatigue",
            "NCT03600883",
            "DrugBank",
        ],
        [
            "TP53",
            "APR-246",
            "DB12416",
            "p53 reactivation",
            "Various cancers with TP53 mutations",
            "Restores p53 function",
            "Fatigue, nausea",
            "NCT03745716",
            "DrugBank",
        ],
        [
            "HER2",
            "Trastuzumab",
            "DB00072",
            "HER2 receptor antagonist",
            "HER2-positive breast cancer",
            "Sensitive to HER2 amplification",
            "Cardiotoxicity, infusion reactions",
            "NCT00000456",
            "DrugBank",
        ],
        [
            "ALK",
            "Crizotinib",
            "DB08865",
            "ALK tyrosine kinase inhibitor",
            "ALK-positive non-small cell lung cancer",
            "Sensitive to ALK fusions",
            "Vision disorders, nausea, diarrhea",
            "NCT00932451",
            "DrugBank",
        ],
        [
            "BRAF",
            "Vemurafenib",
            "DB08881",
            "BRAF V600E inhibitor",
            "BRAF V600E-mutated melanoma",
            "Sensitive to V600E mutation",
            "Skin reactions, arthralgia, photosensitivity",
            "NCT01006980",
            "DrugBank",
        ],
        [
            "BCR-ABL1",
            "Imatinib",
            "DB00619",
            "BCR-ABL tyrosine kinase inhibitor",
            "Chronic myeloid leukemia",
            "Sensitive to BCR-ABL fusion",
            "Nausea, muscle cramps, edema",
            "NCT00000789",
            "DrugBank",
        ],
        [
            "DPYD",
            "Fluorouracil",
            "DB00544",
            "Thymidylate synthase inhibitor",
            "Colorectal cancer",
            "Deficiency increases toxicity risk",
            "Severe toxicity in DPYD-deficient patients",
            "NCT00012345",
            "PharmGKB",
        ],
    ]
    .into_iter()
    .map(DrugAnnotationRecord::new)
    .collect()
}

/// Keep the associations whose gene occurs among the extracted genes.
pub fn create_drug_annotations(genes: &[GeneRecord]) -> Vec<DrugAnnotationRecord> {
    let gene_symbols: HashSet<&str> = genes
        .iter()
        .map(|gene| gene.gene_symbol.as_str())
        .collect();
    drug_gene_associations()
        .into_iter()
        .filter(|annotation| gene_symbols.contains(annotation.gene_symbol.as_str()))
        .collect()
}

/// Write drug annotation records to `path` with a header row.
pub fn write_drug_annotations_csv(
    path: &Path,
    annotations: &[DrugAnnotationRecord],
) -> Result<(), anyhow::Error> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for annotation in annotations {
        writer.serialize(annotation)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read drug annotation records from `path`.
pub fn read_drug_annotations_csv(path: &Path) -> Result<Vec<DrugAnnotationRecord>, anyhow::Error> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut annotations = Vec::new();
    for record in reader.deserialize() {
        annotations.push(record?);
    }
    Ok(annotations)
}

/// Main entry point for `etl enrich` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let config = Config::load_or_default(args.path_config.as_deref())?;

    // The genes file is a required upstream artifact; a missing file is
    // fatal while an empty one is not.
    if !config.paths.genes_csv.exists() {
        anyhow::bail!("genes file not found: {:?}", &config.paths.genes_csv);
    }
    let genes = read_genes_csv(&config.paths.genes_csv)?;

    let annotations = if genes.is_empty() {
        tracing::warn!("no genes were extracted from variants");
        tracing::info!("writing the full sample association table instead");
        drug_gene_associations()
    } else {
        tracing::info!("loaded {} genes", genes.len());
        create_drug_annotations(&genes)
    };

    write_drug_annotations_csv(&config.paths.drug_annotations_csv, &annotations)?;
    tracing::info!(
        "saved {} drug annotations to {:?}",
        annotations.len(),
        &config.paths.drug_annotations_csv
    );

    tracing::info!(
        "All of `etl enrich` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use temp_testdir::TempDir;

    use crate::etl::genes::GeneRecord;

    use super::{create_drug_annotations, drug_gene_associations, write_drug_annotations_csv};

    fn gene(symbol: &str) -> GeneRecord {
        GeneRecord {
            gene_symbol: symbol.to_string(),
            gene_id: None,
            chromosome: String::from("1"),
            description: None,
        }
    }

    #[test]
    fn associations_match_on_gene_symbol() {
        let genes = vec![gene("BRCA1"), gene("HBB"), gene("DPYD")];

        let annotations = create_drug_annotations(&genes);

        assert_eq!(2, annotations.len());
        assert_eq!("BRCA1", annotations[0].gene_symbol);
        assert_eq!("Olaparib", annotations[0].drug_name);
        assert_eq!("DPYD", annotations[1].gene_symbol);
        assert_eq!("PharmGKB", annotations[1].source);
    }

    #[test]
    fn no_matching_genes_yields_no_annotations() {
        let genes = vec![gene("HBB"), gene("CFTR")];

        assert_eq!(0, create_drug_annotations(&genes).len());
    }

    #[test]
    fn association_table_is_unique_per_gene_and_drug() {
        let associations = drug_gene_associations();

        assert_eq!(10, associations.len());
        let mut keys: Vec<_> = associations
            .iter()
            .map(|a| (a.gene_symbol.as_str(), a.drug_name.as_str()))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(10, keys.len());
    }

    #[test]
    fn annotations_csv_round_trip() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let path = tmp_dir.join("drug_annotations.csv");

        let annotations = create_drug_annotations(&[gene("KRAS")]);
        write_drug_annotations_csv(&path, &annotations)?;

        assert_eq!(annotations, super::read_drug_annotations_csv(&path)?);

        Ok(())
    }
}
