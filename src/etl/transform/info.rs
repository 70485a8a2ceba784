//! Extraction of named fields from the INFO annotation column.

use indexmap::IndexMap;

/// Return the value of `key` from the semicolon-delimited annotation string.
///
/// Matching is anchored on the exact key followed by `=`, so `AF` does not
/// match `GNOMAD_AF`. Flag entries without a value and empty values yield
/// `None`.
pub fn extract_field<'a>(info: &'a str, key: &str) -> Option<&'a str> {
    info.split(';').find_map(|entry| match entry.split_once('=') {
        Some((k, v)) if k == key && !v.is_empty() => Some(v),
        _ => None,
    })
}

/// Extract gene symbol and gene identifier from the `GENEINFO` annotation.
///
/// The value has the form `SYMBOL:ID`; the identifier may be absent.
pub fn extract_gene_info(info: &str) -> (Option<String>, Option<String>) {
    match extract_field(info, "GENEINFO") {
        Some(value) => {
            let mut parts = value.split(':');
            let symbol = parts.next().map(str::to_string);
            let gene_id = parts.next().map(str::to_string);
            (symbol, gene_id)
        }
        None => (None, None),
    }
}

/// Map a raw `CLNSIG` value to its canonical label.
///
/// Numeric codes go through `mapping` (unmapped codes become `"Unknown"`);
/// pipe-delimited lists use only their first segment; non-numeric free text
/// passes through unchanged.
pub fn classify_clinical_significance(
    raw: Option<&str>,
    mapping: &IndexMap<i64, String>,
) -> String {
    let Some(raw) = raw else {
        return String::from("Unknown");
    };
    let first = raw.split('|').next().unwrap_or(raw);
    match first.parse::<i64>() {
        Ok(code) => mapping
            .get(&code)
            .cloned()
            .unwrap_or_else(|| String::from("Unknown")),
        Err(_) => first.to_string(),
    }
}
