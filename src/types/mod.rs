//! Type definitions for the diagnosis pipeline

pub mod record;
pub mod tensor;

pub use record::{DiagnosisRecord, DiseaseRecord, SupplementRecord};
pub use tensor::{ClassIndex, ImageTensor, Prediction, INPUT_SHAPE};
