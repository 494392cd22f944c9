//! Classifier model loading and inference

pub mod inference;
pub mod loader;

pub use inference::{InferenceEngine, OnnxBackend, ScoringBackend};
pub use loader::ModelLoader;
