//! Error taxonomy for the diagnosis pipeline
//!
//! Each stage owns its error type. Startup errors (`ArtifactError`,
//! `LoadError`, `TableError`) are handled once at boot; per-request errors
//! are wrapped into a tagged [`DiagnoseError`](crate::pipeline::DiagnoseError).

use std::path::PathBuf;
use thiserror::Error;

/// Failures while making the model artifact available on local storage.
///
/// Only `Missing` reaches the caller of `ensure_available`; download errors
/// are logged and deferred to model load.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("model artifact missing at {} and no remote url is configured", path.display())]
    Missing { path: PathBuf },

    #[error("download from {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal model load failures. Startup must abort on any of these.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("model artifact not found at {}", path.display())]
    ArtifactAbsent { path: PathBuf },

    #[error("model artifact at {} is unusable: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("model produces {actual} class scores but {expected} classes are configured")]
    ClassCountMismatch { expected: usize, actual: usize },

    #[error("warm-up forward pass failed: {0}")]
    Probe(#[from] InferenceError),
}

/// Per-request input failures. These are client errors.
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("empty image upload")]
    EmptyInput,

    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("unreadable image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed reading image {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Forward pass failures. These are server errors: the caller cannot fix them.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("input tensor shape {actual:?} does not match expected {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("model returned {actual} scores, expected {expected}")]
    OutputSize { expected: usize, actual: usize },

    #[error("model output is unusable: {0}")]
    InvalidOutput(String),

    #[error("backend execution failed: {0}")]
    Execution(String),
}

/// Class index and lookup tables disagree. Indicates the model and the
/// tables are out of sync.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolveError {
    #[error(
        "class index {index} out of range (disease rows: {disease_rows}, supplement rows: {supplement_rows})"
    )]
    IndexOutOfRange {
        index: usize,
        disease_rows: usize,
        supplement_rows: usize,
    },
}

/// Lookup table loading and validation failures.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("failed reading table {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown table encoding label: {0}")]
    UnknownEncoding(String),

    #[error("malformed table {name}: {source}")]
    Csv {
        name: String,
        #[source]
        source: csv::Error,
    },

    #[error("table {name} has {rows} rows but {required} classes are configured")]
    TooFewRows {
        name: String,
        rows: usize,
        required: usize,
    },
}
