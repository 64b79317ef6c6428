// 📥 Ingestion Boundary - Load facility and financial extracts
//
// CSV files use the same camelCase headers as the JSON registry export.
// Missing optional columns default; empty cells read as absent.

use crate::records::{Facility, FinancialRecord};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

fn load_csv_records<T: DeserializeOwned, P: AsRef<Path>>(path: P, what: &str) -> Result<Vec<T>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {} CSV: {:?}", what, path))?;

    let mut records = Vec::new();
    for (line, result) in reader.deserialize().enumerate() {
        // +2: header row and 1-based numbering
        let record: T = result
            .with_context(|| format!("Failed to parse {} CSV row {} in {:?}", what, line + 2, path))?;
        records.push(record);
    }

    info!(file = %path.display(), count = records.len(), "loaded {} records", what);
    Ok(records)
}

/// Load facilities from CSV
pub fn load_facilities_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Facility>> {
    load_csv_records(path, "facility")
}

/// Load financial records from CSV
pub fn load_financials_csv<P: AsRef<Path>>(path: P) -> Result<Vec<FinancialRecord>> {
    load_csv_records(path, "financial")
}

/// Registry export shape: either a bare array or `{"records": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum FacilityDocument {
    List(Vec<Facility>),
    Wrapped { records: Vec<Facility> },
}

/// Load facilities from a JSON registry export
pub fn load_facilities_json<P: AsRef<Path>>(path: P) -> Result<Vec<Facility>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read facility JSON: {:?}", path))?;

    let document: FacilityDocument = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse facility JSON: {:?}", path))?;

    let facilities = match document {
        FacilityDocument::List(list) => list,
        FacilityDocument::Wrapped { records } => records,
    };

    info!(file = %path.display(), count = facilities.len(), "loaded facility records");
    Ok(facilities)
}

/// Load facilities by file extension (`.json` or CSV otherwise)
pub fn load_facilities<P: AsRef<Path>>(path: P) -> Result<Vec<Facility>> {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        load_facilities_json(path)
    } else {
        load_facilities_csv(path)
    }
}

// ============================================================================
// TESTS
// ============================================================================
