//! Plant Disease Diagnosis Library
//!
//! Turns a photograph of a plant leaf into a disease diagnosis: the model
//! artifact is fetched once at startup, each upload is normalized into a
//! fixed-shape tensor, a pretrained ONNX classifier picks a class, and the
//! class index is joined against the disease and supplement tables.

pub mod artifact;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod resolver;
pub mod startup;
pub mod tables;
pub mod types;

pub use artifact::{ArtifactOutcome, ArtifactResolver, ModelArtifact};
pub use config::AppConfig;
pub use error::{ArtifactError, InferenceError, LoadError, PreprocessError, ResolveError};
pub use models::inference::InferenceEngine;
pub use pipeline::{DiagnoseError, Diagnosis, ImageInput, Pipeline, ServiceHandle, Stage};
pub use preprocess::Preprocessor;
pub use resolver::ResultResolver;
pub use types::{ClassIndex, DiagnosisRecord, ImageTensor, Prediction};
