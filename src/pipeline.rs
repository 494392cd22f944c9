//! Diagnosis pipeline: preprocess, classify, resolve.
//!
//! [`Pipeline::diagnose`] is the single entry point request handlers call.
//! A `Pipeline` can only be built from a loaded [`InferenceEngine`], and is
//! shared by reference (`Arc<Pipeline>`) across concurrent handlers without
//! locking.

use crate::error::{InferenceError, PreprocessError, ResolveError};
use crate::models::inference::InferenceEngine;
use crate::preprocess::Preprocessor;
use crate::resolver::ResultResolver;
use crate::types::record::DiagnosisRecord;
use crate::types::tensor::Prediction;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::debug;

/// Image handed to the pipeline: uploaded bytes, or an upload persisted to
/// disk.
#[derive(Debug, Clone, Copy)]
pub enum ImageInput<'a> {
    Bytes(&'a [u8]),
    Path(&'a Path),
}

impl<'a> From<&'a [u8]> for ImageInput<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ImageInput::Bytes(bytes)
    }
}

impl<'a> From<&'a Path> for ImageInput<'a> {
    fn from(path: &'a Path) -> Self {
        ImageInput::Path(path)
    }
}

/// Pipeline stage a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Preprocess,
    Inference,
    Resolve,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Preprocess => "preprocess",
            Stage::Inference => "inference",
            Stage::Resolve => "resolve",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request failure tagged by stage
#[derive(Error, Debug)]
pub enum DiagnoseError {
    #[error("preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("result resolution failed: {0}")]
    Resolve(#[from] ResolveError),
}

impl DiagnoseError {
    pub fn stage(&self) -> Stage {
        match self {
            DiagnoseError::Preprocess(_) => Stage::Preprocess,
            DiagnoseError::Inference(_) => Stage::Inference,
            DiagnoseError::Resolve(_) => Stage::Resolve,
        }
    }

    /// Whether the caller sent bad input. Inference and resolution failures
    /// are server-side.
    pub fn is_client_error(&self) -> bool {
        matches!(self, DiagnoseError::Preprocess(_))
    }
}

/// Diagnosis with the classifier's confidence
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
    pub record: DiagnosisRecord,
    pub confidence: f32,
}

/// Preprocessor, engine and resolver composed into one call
#[derive(Debug)]
pub struct Pipeline {
    preprocessor: Preprocessor,
    engine: InferenceEngine,
    resolver: ResultResolver,
}

impl Pipeline {
    pub fn new(preprocessor: Preprocessor, engine: InferenceEngine, resolver: ResultResolver) -> Self {
        Self {
            preprocessor,
            engine,
            resolver,
        }
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn resolver(&self) -> &ResultResolver {
        &self.resolver
    }

    /// Diagnose one image, short-circuiting on the first failing stage
    pub fn diagnose<'a>(
        &self,
        input: impl Into<ImageInput<'a>>,
    ) -> Result<DiagnosisRecord, DiagnoseError> {
        self.diagnose_with_confidence(input).map(|d| d.record)
    }

    /// Like [`diagnose`](Self::diagnose), also returning the confidence of
    /// the winning class
    pub fn diagnose_with_confidence<'a>(
        &self,
        input: impl Into<ImageInput<'a>>,
    ) -> Result<Diagnosis, DiagnoseError> {
        let tensor = match input.into() {
            ImageInput::Bytes(bytes) => self.preprocessor.to_tensor(bytes)?,
            ImageInput::Path(path) => self.preprocessor.to_tensor_from_path(path)?,
        };

        let Prediction { index, confidence } = self.engine.predict(&tensor)?;
        let record = self.resolver.resolve(index)?;

        debug!(
            index = index.get(),
            disease = %record.disease_name,
            confidence = confidence,
            "Diagnosis complete"
        );

        Ok(Diagnosis { record, confidence })
    }
}

/// Readiness gate between startup and request handling.
///
/// Holds the pipeline in a set-once cell: handlers observe either no
/// pipeline or a fully loaded one.
#[derive(Debug, Default)]
pub struct ServiceHandle {
    pipeline: OnceLock<Arc<Pipeline>>,
}

impl ServiceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the loaded pipeline. Returns it back if one was already
    /// installed.
    pub fn install(&self, pipeline: Arc<Pipeline>) -> Result<(), Arc<Pipeline>> {
        self.pipeline.set(pipeline)
    }

    /// Health predicate: true once the model is loaded
    pub fn is_ready(&self) -> bool {
        self.pipeline.get().is_some()
    }

    pub fn pipeline(&self) -> Option<Arc<Pipeline>> {
        self.pipeline.get().cloned()
    }
}
