//! Index-aligned lookup tables
//!
//! Row `i` of each table describes class `i`. Rows are parsed into typed
//! records once at startup and never mutated.

use crate::error::TableError;
use crate::types::record::{DiseaseRecord, SupplementRecord};
use crate::types::tensor::ClassIndex;
use encoding_rs::Encoding;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{info, warn};

/// Immutable table of rows addressed by class index
#[derive(Debug, Clone, PartialEq)]
pub struct Table<R> {
    name: String,
    rows: Vec<R>,
}

pub type DiseaseTable = Table<DiseaseRecord>;
pub type SupplementTable = Table<SupplementRecord>;

impl<R> Table<R> {
    pub fn from_rows(name: impl Into<String>, rows: Vec<R>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for a class, or `None` past the end
    pub fn get(&self, index: ClassIndex) -> Option<&R> {
        self.rows.get(index.get())
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    /// Fail unless the table covers every class
    pub fn require_rows(&self, required: usize) -> Result<(), TableError> {
        if self.rows.len() < required {
            return Err(TableError::TooFewRows {
                name: self.name.clone(),
                rows: self.rows.len(),
                required,
            });
        }
        Ok(())
    }
}

impl<R: DeserializeOwned> Table<R> {
    /// Parse a CSV file stored in `encoding` (a WHATWG label such as
    /// `windows-1252` or `utf-8`).
    pub fn from_csv_path<P: AsRef<Path>>(path: P, encoding: &str) -> Result<Self, TableError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let table = Self::from_csv_bytes(name, &bytes, encoding)?;
        info!(table = %table.name, rows = table.len(), "Loaded lookup table");
        Ok(table)
    }

    /// Parse CSV bytes. Headers select columns by name; extra columns are
    /// ignored.
    pub fn from_csv_bytes(
        name: impl Into<String>,
        bytes: &[u8],
        encoding: &str,
    ) -> Result<Self, TableError> {
        let name = name.into();
        let encoding = Encoding::for_label(encoding.trim().as_bytes())
            .ok_or_else(|| TableError::UnknownEncoding(encoding.to_string()))?;
        let (text, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            warn!(table = %name, encoding = encoding.name(), "Table contains undecodable bytes");
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(text.as_bytes());
        let rows = reader
            .deserialize()
            .collect::<Result<Vec<R>, _>>()
            .map_err(|source| TableError::Csv {
                name: name.clone(),
                source,
            })?;

        Ok(Self { name, rows })
    }
}

/// Load both tables and check them against the model's class count.
///
/// Tables shorter than `num_classes` are rejected. Differing lengths are
/// allowed but logged, since only rows below `num_classes` are reachable.
pub fn load_tables(
    disease_path: &Path,
    supplement_path: &Path,
    encoding: &str,
    num_classes: usize,
) -> Result<(DiseaseTable, SupplementTable), TableError> {
    let diseases = DiseaseTable::from_csv_path(disease_path, encoding)?;
    let supplements = SupplementTable::from_csv_path(supplement_path, encoding)?;
    validate_tables(&diseases, &supplements, num_classes)?;
    Ok((diseases, supplements))
}

/// Check both tables cover `num_classes` rows
pub fn validate_tables(
    diseases: &DiseaseTable,
    supplements: &SupplementTable,
    num_classes: usize,
) -> Result<(), TableError> {
    diseases.require_rows(num_classes)?;
    supplements.require_rows(num_classes)?;

    if diseases.len() != supplements.len() {
        warn!(
            disease_rows = diseases.len(),
            supplement_rows = supplements.len(),
            "Lookup tables differ in length"
        );
    }

    let unnamed = diseases
        .rows()
        .iter()
        .take(num_classes)
        .filter(|r| r.disease_name.trim().is_empty())
        .count();
    if unnamed > 0 {
        warn!(rows = unnamed, "Disease table has rows without a disease name");
    }

    Ok(())
}
