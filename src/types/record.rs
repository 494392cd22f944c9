//! Lookup table rows and the composed diagnosis record

use super::tensor::ClassIndex;
use serde::{Deserialize, Serialize};

/// One row of the disease table.
///
/// Field names follow the column headers of the deployed `disease_info.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiseaseRecord {
    /// Disease name (e.g. "Tomato : Late Blight")
    pub disease_name: String,

    /// Description of the disease
    #[serde(default)]
    pub description: String,

    /// Remediation steps
    #[serde(rename = "Possible Steps", alias = "possible_steps", alias = "treatment", default)]
    pub remediation: String,

    /// Reference image of an affected leaf
    #[serde(rename = "image_url", default)]
    pub reference_image_url: String,
}

/// One row of the supplement table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SupplementRecord {
    /// Product name
    #[serde(rename = "supplement name", alias = "supplement_name", default)]
    pub name: String,

    /// Product image
    #[serde(rename = "supplement image", alias = "supplement_image", default)]
    pub image_url: String,

    /// Purchase link
    #[serde(rename = "buy link", alias = "buy_link", default)]
    pub purchase_link: String,
}

/// Diagnosis returned for one image.
///
/// Built fresh per request from row `index` of both tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisRecord {
    pub index: ClassIndex,
    pub disease_name: String,
    pub description: String,
    pub remediation: String,
    pub reference_image_url: String,
    pub supplement_name: String,
    pub supplement_image_url: String,
    pub purchase_link: String,
}

impl DiagnosisRecord {
    /// Join one disease row and one supplement row under a class index
    pub fn from_rows(
        index: ClassIndex,
        disease: &DiseaseRecord,
        supplement: &SupplementRecord,
    ) -> Self {
        Self {
            index,
            disease_name: disease.disease_name.clone(),
            description: disease.description.clone(),
            remediation: disease.remediation.clone(),
            reference_image_url: disease.reference_image_url.clone(),
            supplement_name: supplement.name.clone(),
            supplement_image_url: supplement.image_url.clone(),
            purchase_link: supplement.purchase_link.clone(),
        }
    }
}
