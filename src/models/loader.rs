//! ONNX model loader

use crate::error::LoadError;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::info;

/// Loaded ONNX classifier with its graph endpoints
pub struct LoadedModel {
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the image tensor
    pub input_name: String,
    /// Output name for the class scores
    pub output_name: String,
}

/// Loader for ONNX classifier artifacts
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load the classifier graph from file.
    ///
    /// A missing file and an unreadable graph are reported separately.
    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> Result<LoadedModel, LoadError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LoadError::ArtifactAbsent {
                path: path.to_path_buf(),
            });
        }

        info!(path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()
            .map_err(|e| corrupt(path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| corrupt(path, e))?
            .with_intra_threads(self.onnx_threads)
            .map_err(|e| corrupt(path, e))?
            .commit_from_file(path)
            .map_err(|e| corrupt(path, e))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| LoadError::Corrupt {
                path: path.to_path_buf(),
                reason: "graph declares no inputs".to_string(),
            })?;

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("output") || o.name.contains("logits"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .ok_or_else(|| LoadError::Corrupt {
                path: path.to_path_buf(),
                reason: "graph declares no outputs".to_string(),
            })?;

        info!(
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            session,
            input_name,
            output_name,
        })
    }
}

fn corrupt<E: std::fmt::Display>(path: &Path, error: E) -> LoadError {
    LoadError::Corrupt {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}
