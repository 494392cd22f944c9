//! Model Fetcher
//!
//! Resolves the configured model artifact without loading it. Useful for
//! warming a volume before the service starts.

use anyhow::{bail, Context, Result};
use clap::Parser;
use plantguard::{
    artifact::{ArtifactOutcome, ArtifactResolver, ModelArtifact},
    config::{AppConfig, DEFAULT_CONFIG_PATH},
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fetch-model", version, about = "Download the diagnosis model if it is missing")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "PLANTGUARD_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load_from_path(&args.config)?;
    config.logging.init_tracing()?;

    let artifact = ModelArtifact::from_config(&config.model);
    let resolver =
        ArtifactResolver::new(&config.download).context("Failed to build download client")?;

    match resolver.ensure_artifact(&artifact).await? {
        ArtifactOutcome::AlreadyPresent => {
            info!(path = %artifact.path.display(), "Model already present, nothing to do");
        }
        ArtifactOutcome::Downloaded { strategy, bytes } => {
            info!(
                path = %artifact.path.display(),
                strategy = ?strategy,
                bytes = bytes,
                "Model downloaded"
            );
        }
        ArtifactOutcome::Unavailable => {
            bail!("Could not download model to {}", artifact.path.display());
        }
    }

    Ok(())
}
