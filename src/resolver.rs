//! Class index to diagnosis record resolution
//!
//! Row position is the join key: row `i` of the disease table and row `i`
//! of the supplement table both describe class `i`.

use crate::error::ResolveError;
use crate::tables::{DiseaseTable, SupplementTable};
use crate::types::record::DiagnosisRecord;
use crate::types::tensor::ClassIndex;
use tracing::error;

/// Build the diagnosis record for `index` from both tables.
///
/// Bounds are checked against each table independently.
pub fn resolve(
    index: ClassIndex,
    diseases: &DiseaseTable,
    supplements: &SupplementTable,
) -> Result<DiagnosisRecord, ResolveError> {
    match (diseases.get(index), supplements.get(index)) {
        (Some(disease), Some(supplement)) => {
            Ok(DiagnosisRecord::from_rows(index, disease, supplement))
        }
        _ => Err(ResolveError::IndexOutOfRange {
            index: index.get(),
            disease_rows: diseases.len(),
            supplement_rows: supplements.len(),
        }),
    }
}

/// Owns the lookup tables for the lifetime of the process
#[derive(Debug, Clone)]
pub struct ResultResolver {
    diseases: DiseaseTable,
    supplements: SupplementTable,
}

impl ResultResolver {
    pub fn new(diseases: DiseaseTable, supplements: SupplementTable) -> Self {
        Self {
            diseases,
            supplements,
        }
    }

    /// Number of indices that resolve in both tables
    pub fn capacity(&self) -> usize {
        self.diseases.len().min(self.supplements.len())
    }

    pub fn diseases(&self) -> &DiseaseTable {
        &self.diseases
    }

    pub fn supplements(&self) -> &SupplementTable {
        &self.supplements
    }

    /// Resolve `index`; an out-of-range index means the model and the
    /// tables are out of sync and is logged at error level.
    pub fn resolve(&self, index: ClassIndex) -> Result<DiagnosisRecord, ResolveError> {
        resolve(index, &self.diseases, &self.supplements).inspect_err(|e| {
            error!(
                index = index.get(),
                disease_rows = self.diseases.len(),
                supplement_rows = self.supplements.len(),
                error = %e,
                "Class index does not resolve against lookup tables"
            );
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::types::record::{DiseaseRecord, SupplementRecord};

    pub fn disease_table(rows: usize) -> DiseaseTable {
        DiseaseTable::from_rows(
            "disease_info.csv",
            (0..rows)
                .map(|i| DiseaseRecord {
                    disease_name: format!("Disease {i}"),
                    description: format!("Description {i}"),
                    remediation: format!("Steps {i}"),
                    reference_image_url: format!("https://example.org/disease/{i}.jpg"),
                })
                .collect(),
        )
    }

    pub fn supplement_table(rows: usize) -> SupplementTable {
        SupplementTable::from_rows(
            "supplement_info.csv",
            (0..rows)
                .map(|i| SupplementRecord {
                    name: format!("Supplement {i}"),
                    image_url: format!("https://example.org/supplement/{i}.jpg"),
                    purchase_link: format!("https://example.org/buy/{i}"),
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{disease_table, supplement_table};
    use super::*;

    #[test]
    fn test_resolve_joins_same_row() {
        let record = resolve(ClassIndex(3), &disease_table(39), &supplement_table(39)).unwrap();
        assert_eq!(record.index, ClassIndex(3));
        assert_eq!(record.disease_name, "Disease 3");
        assert_eq!(record.remediation, "Steps 3");
        assert_eq!(record.supplement_name, "Supplement 3");
        assert_eq!(record.purchase_link, "https://example.org/buy/3");
    }

    #[test]
    fn test_last_row_resolves_and_length_fails() {
        let diseases = disease_table(39);
        let supplements = supplement_table(39);

        assert!(resolve(ClassIndex(38), &diseases, &supplements).is_ok());
        assert_eq!(
            resolve(ClassIndex(39), &diseases, &supplements),
            Err(ResolveError::IndexOutOfRange {
                index: 39,
                disease_rows: 39,
                supplement_rows: 39
            })
        );
    }

    #[test]
    fn test_bounds_follow_shorter_table() {
        let diseases = disease_table(39);
        let supplements = supplement_table(38);

        for i in 0..40 {
            let ok = resolve(ClassIndex(i), &diseases, &supplements).is_ok();
            assert_eq!(ok, i < 38, "index {i}");
        }

        // And the other way round
        let resolver = ResultResolver::new(disease_table(10), supplement_table(12));
        assert_eq!(resolver.capacity(), 10);
        assert!(resolver.resolve(ClassIndex(9)).is_ok());
        assert!(resolver.resolve(ClassIndex(10)).is_err());
    }
}
