//! Configuration management for the diagnosis pipeline

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use image::imageops::FilterType;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable overriding `model.path`
pub const MODEL_PATH_ENV: &str = "MODEL_PATH";

/// Environment variable overriding `model.url`
pub const MODEL_URL_ENV: &str = "MODEL_URL";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub download: DownloadConfig,
    pub preprocessing: PreprocessingConfig,
    pub tables: TablesConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Local path of the ONNX model file
    pub path: PathBuf,
    /// Remote source, fetched only when `path` does not exist
    pub url: Option<String>,
    /// Number of classes the artifact was trained for
    pub num_classes: usize,
    /// Number of threads for ONNX inference (default: 1)
    pub onnx_threads: usize,
    /// ONNX sessions kept for concurrent forward passes (default: 1).
    /// Each one holds a copy of the weights.
    pub sessions: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("plant_disease_model_1.onnx"),
            url: None,
            num_classes: 39,
            onnx_threads: 1,
            sessions: 1,
        }
    }
}

/// Artifact download configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Size of each write to disk in bytes
    pub chunk_size: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            connect_timeout_secs: 30,
            chunk_size: 8192,
        }
    }
}

/// Resampling filter used to resize uploads to the network input size
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    Bilinear,
    #[default]
    Bicubic,
    Lanczos3,
}

impl ResizeFilter {
    pub fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Bilinear => FilterType::Triangle,
            ResizeFilter::Bicubic => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Image preprocessing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Apply per-channel mean/std normalization after scaling to [0, 1]
    pub normalize: bool,
    /// Per-channel mean (RGB)
    pub mean: [f32; 3],
    /// Per-channel standard deviation (RGB)
    pub std: [f32; 3],
    /// Resampling filter
    pub resize_filter: ResizeFilter,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            normalize: false,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            resize_filter: ResizeFilter::Bicubic,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl PreprocessingConfig {
    /// Reject channel statistics that would turn every tensor value into
    /// `inf` or `NaN`
    pub fn validate(&self) -> Result<()> {
        for (channel, (&mean, &std)) in self.mean.iter().zip(&self.std).enumerate() {
            ensure!(
                std.is_finite() && std > 0.0,
                "preprocessing.std[{channel}] must be positive, got {std}"
            );
            ensure!(
                mean.is_finite(),
                "preprocessing.mean[{channel}] must be finite, got {mean}"
            );
        }
        Ok(())
    }
}

/// Lookup table files
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    /// Disease metadata CSV
    pub disease_info: PathBuf,
    /// Supplement metadata CSV
    pub supplement_info: PathBuf,
    /// Character encoding of both files (WHATWG label)
    pub encoding: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            disease_info: PathBuf::from("disease_info.csv"),
            supplement_info: PathBuf::from("supplement_info.csv"),
            encoding: "windows-1252".to_string(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrent diagnoses
    pub workers: usize,
    /// Interval of the periodic metrics summary, 0 disables it
    pub metrics_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            metrics_interval_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber. `RUST_LOG` takes precedence
    /// over `level`.
    pub fn init_tracing(&self) -> Result<()> {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(format!("plantguard={}", self.level)))
            .context("Invalid log level")?;

        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let installed = if self.format.eq_ignore_ascii_case("json") {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
    }
}

impl AppConfig {
    /// Load configuration from the default file plus environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path plus environment.
    ///
    /// The file is optional; every key has a default.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("PLANTGUARD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("model.path", std::env::var(MODEL_PATH_ENV).ok())?
            .set_override_option("model.url", std::env::var(MODEL_URL_ENV).ok())?
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot work
    pub fn validate(&self) -> Result<()> {
        self.preprocessing
            .validate()
            .context("Invalid preprocessing configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.model.path, PathBuf::from("plant_disease_model_1.onnx"));
        assert_eq!(config.model.num_classes, 39);
        assert!(config.model.url.is_none());
        assert!(!config.preprocessing.normalize);
        assert_eq!(config.download.timeout_secs, 600);
        assert_eq!(config.tables.encoding, "windows-1252");
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[model]\nnum_classes = 38\n\n[preprocessing]\nnormalize = true\nresize_filter = \"bilinear\""
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.model.num_classes, 38);
        assert!(config.preprocessing.normalize);
        assert_eq!(config.preprocessing.resize_filter, ResizeFilter::Bilinear);
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.tables.disease_info, PathBuf::from("disease_info.csv"));
    }

    #[test]
    fn test_zero_std_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[preprocessing]\nnormalize = true\nstd = [0.229, 0.0, 0.225]").unwrap();

        let err = AppConfig::load_from_path(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("std[1] must be positive"));
    }

    #[test]
    fn test_channel_statistics_validation() {
        assert!(PreprocessingConfig::default().validate().is_ok());

        let negative = PreprocessingConfig {
            std: [0.229, 0.224, -0.5],
            ..PreprocessingConfig::default()
        };
        assert!(negative.validate().is_err());

        let nan_mean = PreprocessingConfig {
            mean: [f32::NAN, 0.456, 0.406],
            ..PreprocessingConfig::default()
        };
        assert!(nan_mean.validate().is_err());
    }

    #[test]
    fn test_resize_filter_mapping() {
        assert_eq!(ResizeFilter::Bilinear.filter_type(), FilterType::Triangle);
        assert_eq!(ResizeFilter::Bicubic.filter_type(), FilterType::CatmullRom);
    }
}
