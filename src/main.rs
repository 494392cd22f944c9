//! Plant Disease Diagnosis - Main Entry Point
//!
//! Boots the pipeline once, then diagnoses the given leaf images in
//! parallel and prints one JSON line per image.

use anyhow::{Context, Result};
use clap::Parser;
use plantguard::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    metrics::{MetricsReporter, PipelineMetrics},
    startup, ServiceHandle,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "plantguard", version, about = "Diagnose plant leaf diseases from photographs")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "PLANTGUARD_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Apply ImageNet mean/std normalization regardless of configuration
    #[arg(long)]
    normalize: bool,

    /// Leaf images to diagnose
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load_from_path(&cli.config)?;
    if cli.normalize {
        config.preprocessing.normalize = true;
    }

    // Initialize logging
    config.logging.init_tracing()?;

    info!(config = %cli.config.display(), "Starting diagnosis pipeline");

    let handle = ServiceHandle::new();
    let pipeline = Arc::new(startup::bootstrap(&config).await?);
    if handle.install(pipeline).is_err() {
        warn!("Pipeline was already installed");
    }
    let pipeline = handle.pipeline().context("Pipeline not ready")?;

    info!(
        backend = pipeline.engine().backend_name(),
        num_classes = pipeline.engine().num_classes(),
        "Inference engine initialized"
    );

    let metrics = Arc::new(PipelineMetrics::new());
    let reporter = (config.pipeline.metrics_interval_secs > 0).then(|| {
        let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
        tokio::spawn(reporter.start())
    });

    // Semaphore to limit concurrent processing
    let num_workers = config.pipeline.workers.max(1);
    let semaphore = Arc::new(Semaphore::new(num_workers));
    info!(
        images = cli.images.len(),
        workers = num_workers,
        "Diagnosing images"
    );

    let mut tasks = Vec::with_capacity(cli.images.len());
    for image in cli.images {
        let permit = semaphore.clone().acquire_owned().await?;
        let pipeline = pipeline.clone();
        let metrics = metrics.clone();

        tasks.push(tokio::spawn(async move {
            let start_time = Instant::now();
            let path = image.clone();
            let result =
                tokio::task::spawn_blocking(move || pipeline.diagnose_with_confidence(path.as_path()))
                    .await;
            let processing_time = start_time.elapsed();
            drop(permit);

            match result {
                Ok(Ok(diagnosis)) => {
                    metrics.record_diagnosis(
                        processing_time,
                        diagnosis.record.index,
                        diagnosis.confidence,
                    );
                    debug!(
                        image = %image.display(),
                        index = diagnosis.record.index.get(),
                        confidence = diagnosis.confidence,
                        processing_time_us = processing_time.as_micros() as u64,
                        "Image diagnosed"
                    );
                    serde_json::json!({
                        "image": image.display().to_string(),
                        "diagnosis": diagnosis.record,
                        "confidence": diagnosis.confidence,
                    })
                }
                Ok(Err(e)) => {
                    metrics.record_failure(processing_time, e.stage());
                    if e.is_client_error() {
                        warn!(image = %image.display(), stage = %e.stage(), error = %e, "Image rejected");
                    } else {
                        error!(image = %image.display(), stage = %e.stage(), error = %e, "Diagnosis failed");
                    }
                    serde_json::json!({
                        "image": image.display().to_string(),
                        "stage": e.stage().as_str(),
                        "error": e.to_string(),
                    })
                }
                Err(e) => {
                    error!(image = %image.display(), error = %e, "Diagnosis task panicked");
                    serde_json::json!({
                        "image": image.display().to_string(),
                        "stage": "internal",
                        "error": e.to_string(),
                    })
                }
            }
        }));
    }

    let mut failed = 0usize;
    for task in tasks {
        let line = task.await.context("Diagnosis task panicked")?;
        if line.get("error").is_some() {
            failed += 1;
        }
        println!("{line}");
    }

    if let Some(reporter) = reporter {
        reporter.abort();
    }

    info!("Pipeline shutting down...");
    metrics.print_summary();

    if failed > 0 {
        warn!(failed = failed, "Some images could not be diagnosed");
        std::process::exit(1);
    }
    Ok(())
}
