//! Startup barrier
//!
//! Runs artifact resolution, model load and table load exactly once, in
//! order, before any request is accepted. Every failure after artifact
//! resolution is fatal.

use crate::artifact::{ArtifactFetcher, ArtifactOutcome, ArtifactResolver, ModelArtifact};
use crate::config::AppConfig;
use crate::models::inference::InferenceEngine;
use crate::pipeline::Pipeline;
use crate::preprocess::Preprocessor;
use crate::resolver::ResultResolver;
use crate::tables;
use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{info, warn};

/// Build a ready pipeline from configuration using HTTP downloads
pub async fn bootstrap(config: &AppConfig) -> Result<Pipeline> {
    let resolver =
        ArtifactResolver::new(&config.download).context("Failed to build download client")?;
    bootstrap_with(config, &resolver).await
}

/// Build a ready pipeline with a caller-supplied artifact resolver
pub async fn bootstrap_with<F: ArtifactFetcher>(
    config: &AppConfig,
    resolver: &ArtifactResolver<F>,
) -> Result<Pipeline> {
    let started = Instant::now();
    config.validate()?;
    let artifact = ModelArtifact::from_config(&config.model);

    match resolver.ensure_artifact(&artifact).await {
        Ok(ArtifactOutcome::Unavailable) => {
            warn!(path = %artifact.path.display(), "Model artifact could not be fetched");
        }
        Ok(outcome) => {
            info!(path = %artifact.path.display(), outcome = ?outcome, "Model artifact resolved");
        }
        Err(e) => {
            // Load below reports the absence with the path
            warn!(error = %e, "Model artifact unavailable");
        }
    }

    let model_config = config.model.clone();
    let path = artifact.path.clone();
    let engine = tokio::task::spawn_blocking(move || InferenceEngine::load(&path, &model_config))
        .await
        .context("Model load task panicked")?
        .with_context(|| format!("Failed to load model from {}", artifact.path.display()))?;

    let (diseases, supplements) = tables::load_tables(
        &config.tables.disease_info,
        &config.tables.supplement_info,
        &config.tables.encoding,
        engine.num_classes(),
    )
    .context("Failed to load lookup tables")?;

    let preprocessor = Preprocessor::from_config(&config.preprocessing);

    info!(
        num_classes = engine.num_classes(),
        normalize = preprocessor.normalizes(),
        disease_rows = diseases.len(),
        supplement_rows = supplements.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Diagnosis pipeline ready"
    );

    Ok(Pipeline::new(
        preprocessor,
        engine,
        ResultResolver::new(diseases, supplements),
    ))
}
