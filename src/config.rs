//! Configuration of the ETL worker.
//!
//! All knobs live in one `Config` object that is loaded from a JSON file and
//! passed explicitly into the phase entry points; there is no global state.
//! Every key has a built-in default so a partial file (or none at all) works.

use std::path::PathBuf;

use indexmap::IndexMap;

/// File system locations of the pipeline artifacts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Path to the input variant file (plain or gzip-compressed).
    pub vcf_file: PathBuf,
    /// Path of the staged variants CSV file.
    pub variants_csv: PathBuf,
    /// Path of the extracted genes CSV file.
    pub genes_csv: PathBuf,
    /// Path of the drug annotations CSV file.
    pub drug_annotations_csv: PathBuf,
    /// Directory for derived summary tables.
    pub processed_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            vcf_file: PathBuf::from("data/raw/variants.vcf.gz"),
            variants_csv: PathBuf::from("data/interim/variants.csv"),
            genes_csv: PathBuf::from("data/interim/genes.csv"),
            drug_annotations_csv: PathBuf::from("data/interim/drug_annotations.csv"),
            processed_dir: PathBuf::from("data/processed"),
        }
    }
}

/// Knobs of the transform stage.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of records accumulated in memory before a staging file append.
    pub chunk_size: usize,
    /// Record count above which the staging file is the final artifact and
    /// is not read back into memory.
    pub large_dataset_threshold: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100_000,
            large_dataset_threshold: 1_000_000,
        }
    }
}

/// Configuration of the VCF annotation parsing.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VcfParserConfig {
    /// Mapping from numeric clinical significance codes to canonical labels.
    pub clinical_significance_mapping: IndexMap<i64, String>,
}

impl Default for VcfParserConfig {
    fn default() -> Self {
        // The ClinVar CLNSIG code table.
        let clinical_significance_mapping: IndexMap<i64, String> = [
            (0, "Uncertain significance"),
            (1, "not provided"),
            (2, "Benign"),
            (3, "Likely benign"),
            (4, "Likely pathogenic"),
            (5, "Pathogenic"),
            (6, "Drug response"),
            (7, "Histocompatibility"),
            (255, "Other"),
        ]
        .into_iter()
        .map(|(code, label)| (code, label.to_string()))
        .collect();
        Self {
            clinical_significance_mapping,
        }
    }
}

/// Connection and bulk loading configuration of the store.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL of the PostgreSQL server.
    pub url: String,
    /// Rows per bulk insert batch.
    pub batch_size: usize,
    /// Rows per bulk insert batch for very large staging files.
    pub large_file_batch_size: usize,
    /// Staging file size in bytes above which the large batch size is used.
    pub large_file_threshold_bytes: u64,
    /// Maximal number of pooled connections.
    pub pool_max_connections: u32,
    /// Number of pooled connections to keep ready.
    pub pool_min_connections: u32,
    /// Timeout for acquiring a connection, in seconds.
    pub connect_timeout_secs: u64,
    /// Per-statement timeout, in seconds.
    pub statement_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::from("postgres://postgres@localhost:5432/variants"),
            batch_size: 50_000,
            large_file_batch_size: 500_000,
            large_file_threshold_bytes: 1_000 * 1_024 * 1_024,
            pool_max_connections: 200,
            pool_min_connections: 50,
            connect_timeout_secs: 10,
            statement_timeout_secs: 60,
        }
    }
}

/// Top-level configuration object.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// File system locations.
    pub paths: PathsConfig,
    /// Transform stage knobs.
    pub processing: ProcessingConfig,
    /// VCF annotation parsing.
    pub vcf_parser: VcfParserConfig,
    /// Store connection and loading.
    pub database: DatabaseConfig,
}

impl Config {
    /// Load the configuration from a JSON file, expanding a leading `~`.
    pub fn load(path: &str) -> Result<Self, anyhow::Error> {
        let path = shellexpand::tilde(path);
        let file = std::fs::File::open(path.as_ref())
            .map_err(|e| anyhow::anyhow!("could not open configuration file {}: {}", path, e))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| anyhow::anyhow!("could not parse configuration file {}: {}", path, e))
    }

    /// Load the configuration from `path` or fall back to built-in defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self, anyhow::Error> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Config;

    #[test]
    fn default_clinical_significance_mapping() {
        let config = Config::default();
        let mapping = &config.vcf_parser.clinical_significance_mapping;

        assert_eq!(Some(&String::from("Pathogenic")), mapping.get(&5));
        assert_eq!(Some(&String::from("Benign")), mapping.get(&2));
        assert_eq!(Some(&String::from("Drug response")), mapping.get(&6));
        assert_eq!(None, mapping.get(&42));
    }

    #[test]
    fn load_partial_file_keeps_defaults() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("config.json");
        std::fs::write(
            &path,
            r#"{
                "processing": { "chunk_size": 10 },
                "vcf_parser": {
                    "clinical_significance_mapping": { "5": "Pathogenic" }
                }
            }"#,
        )?;

        let config = Config::load(path.to_str().unwrap())?;

        assert_eq!(10, config.processing.chunk_size);
        assert_eq!(1_000_000, config.processing.large_dataset_threshold);
        assert_eq!(50_000, config.database.batch_size);
        assert_eq!(1, config.vcf_parser.clinical_significance_mapping.len());

        Ok(())
    }

    #[test]
    fn load_missing_file_is_an_error() {
        assert!(Config::load("does/not/exist.json").is_err());
    }

    #[test]
    fn example_config_matches_defaults() -> Result<(), anyhow::Error> {
        let config = Config::load("config/etl_config.json")?;
        let defaults = Config::default();

        assert_eq!(
            serde_json::to_value(&defaults)?,
            serde_json::to_value(&config)?
        );

        Ok(())
    }
}
