//! Image preprocessing for classifier inference.
//!
//! Turns an uploaded image into the `[1, 3, 224, 224]` tensor the network
//! was trained on. The transform is deterministic: same bytes and same
//! configuration yield the same tensor.

use crate::config::PreprocessingConfig;
use crate::error::PreprocessError;
use crate::types::tensor::{ImageTensor, INPUT_CHANNELS, INPUT_SIZE};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use std::path::Path;
use tracing::debug;

/// Per-channel statistics subtracted and divided after scaling to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// ImageNet channel statistics
    pub fn imagenet() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

/// Converts raw image bytes into model input tensors.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    normalization: Option<Normalization>,
    filter: FilterType,
    max_bytes: usize,
}

impl Preprocessor {
    /// Create a preprocessor with bicubic resizing and an optional ImageNet
    /// normalization step.
    pub fn new(normalize: bool) -> Self {
        Self {
            normalization: normalize.then(Normalization::imagenet),
            filter: FilterType::CatmullRom,
            max_bytes: usize::MAX,
        }
    }

    /// Create a preprocessor from configuration
    pub fn from_config(config: &PreprocessingConfig) -> Self {
        Self {
            normalization: config.normalize.then_some(Normalization {
                mean: config.mean,
                std: config.std,
            }),
            filter: config.resize_filter.filter_type(),
            max_bytes: config.max_upload_bytes,
        }
    }

    /// Whether channel normalization is applied
    pub fn normalizes(&self) -> bool {
        self.normalization.is_some()
    }

    /// Decode, resize and convert an in-memory image.
    pub fn to_tensor(&self, bytes: &[u8]) -> Result<ImageTensor, PreprocessError> {
        if bytes.is_empty() {
            return Err(PreprocessError::EmptyInput);
        }
        if bytes.len() > self.max_bytes {
            return Err(PreprocessError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        let image = image::load_from_memory(bytes)?;
        debug!(
            width = image.width(),
            height = image.height(),
            color = ?image.color(),
            "Decoded upload"
        );

        Ok(self.image_to_tensor(&image))
    }

    /// Read an image persisted on disk and convert it.
    pub fn to_tensor_from_path<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<ImageTensor, PreprocessError> {
        let path = path.as_ref();
        let read_error = |source| PreprocessError::Read {
            path: path.to_path_buf(),
            source,
        };

        // Oversized files are rejected before anything is read
        let size = std::fs::metadata(path).map_err(read_error)?.len();
        if size > self.max_bytes as u64 {
            return Err(PreprocessError::TooLarge {
                size: usize::try_from(size).unwrap_or(usize::MAX),
                limit: self.max_bytes,
            });
        }

        let bytes = std::fs::read(path).map_err(read_error)?;
        self.to_tensor(&bytes)
    }

    /// Convert an already decoded image.
    ///
    /// Grayscale, alpha and high bit depth sources are coerced to 8-bit RGB.
    pub fn image_to_tensor(&self, image: &DynamicImage) -> ImageTensor {
        let rgb = image.to_rgb8();
        let resized = if rgb.dimensions() == (INPUT_SIZE as u32, INPUT_SIZE as u32) {
            rgb
        } else {
            imageops::resize(&rgb, INPUT_SIZE as u32, INPUT_SIZE as u32, self.filter)
        };
        self.rgb_to_tensor(&resized)
    }

    /// Lay out a 224x224 RGB image channels-first, scaled to [0, 1].
    fn rgb_to_tensor(&self, rgb: &RgbImage) -> ImageTensor {
        let plane = INPUT_SIZE * INPUT_SIZE;
        let mut data = vec![0.0_f32; INPUT_CHANNELS * plane];

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = y as usize * INPUT_SIZE + x as usize;
            for channel in 0..INPUT_CHANNELS {
                let mut value = f32::from(pixel[channel]) / 255.0;
                if let Some(norm) = &self.normalization {
                    value = (value - norm.mean[channel]) / norm.std[channel];
                }
                data[channel * plane + offset] = value;
            }
        }

        ImageTensor::from_input_data(data)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::from_config(&PreprocessingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tensor::INPUT_SHAPE;
    use image::{ImageFormat, Luma, Rgb, Rgba};
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    fn leaf_jpeg(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 97) as u8, 120 + (y % 100) as u8, 40])
        });
        encode(DynamicImage::ImageRgb8(image), ImageFormat::Jpeg)
    }

    #[test]
    fn test_empty_input_rejected() {
        let preprocessor = Preprocessor::default();
        assert!(matches!(
            preprocessor.to_tensor(&[]),
            Err(PreprocessError::EmptyInput)
        ));
    }

    #[test]
    fn test_garbage_bytes_fail_decode() {
        let preprocessor = Preprocessor::default();
        let result = preprocessor.to_tensor(b"definitely not an image");
        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }

    #[test]
    fn test_oversized_upload_rejected() {
        let config = PreprocessingConfig {
            max_upload_bytes: 16,
            ..PreprocessingConfig::default()
        };
        let preprocessor = Preprocessor::from_config(&config);
        let result = preprocessor.to_tensor(&leaf_jpeg(32, 32));
        assert!(matches!(result, Err(PreprocessError::TooLarge { limit: 16, .. })));
    }

    #[test]
    fn test_jpeg_resized_to_input_shape_in_unit_range() {
        let preprocessor = Preprocessor::new(false);
        let tensor = preprocessor.to_tensor(&leaf_jpeg(500, 500)).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        let (lo, hi) = tensor.value_range().unwrap();
        assert!(lo >= 0.0 && hi <= 1.0);
    }

    #[test]
    fn test_non_square_and_grayscale_inputs_coerced() {
        let preprocessor = Preprocessor::new(false);
        let gray = image::GrayImage::from_pixel(320, 180, Luma([200]));
        let bytes = encode(DynamicImage::ImageLuma8(gray), ImageFormat::Png);

        let tensor = preprocessor.to_tensor(&bytes).unwrap();
        assert_eq!(tensor.shape(), &INPUT_SHAPE);

        // Grayscale expands to three identical channels
        let plane = INPUT_SIZE * INPUT_SIZE;
        let expected = 200.0 / 255.0;
        for channel in 0..3 {
            assert!((tensor.data()[channel * plane] - expected).abs() < 1.5 / 255.0);
        }
    }

    #[test]
    fn test_alpha_channel_dropped() {
        let preprocessor = Preprocessor::new(false);
        let rgba = image::RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 10]));
        let bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);

        let tensor = preprocessor.to_tensor(&bytes).unwrap();
        let plane = INPUT_SIZE * INPUT_SIZE;
        assert!((tensor.data()[0] - 1.0).abs() < 1.5 / 255.0);
        assert!(tensor.data()[plane].abs() < 1.5 / 255.0);
        assert!(tensor.data()[2 * plane].abs() < 1.5 / 255.0);
    }

    #[test]
    fn test_channel_first_layout_and_normalization() {
        let image = RgbImage::from_pixel(224, 224, Rgb([255, 128, 0]));
        let image = DynamicImage::ImageRgb8(image);
        let plane = INPUT_SIZE * INPUT_SIZE;

        let raw = Preprocessor::new(false).image_to_tensor(&image);
        assert!((raw.data()[0] - 1.0).abs() < 1e-6);
        assert!((raw.data()[plane] - 128.0 / 255.0).abs() < 1e-6);
        assert!(raw.data()[2 * plane].abs() < 1e-6);

        let norm = Normalization::imagenet();
        let normalized = Preprocessor::new(true).image_to_tensor(&image);
        let expected_red = (1.0 - norm.mean[0]) / norm.std[0];
        let expected_blue = (0.0 - norm.mean[2]) / norm.std[2];
        assert!((normalized.data()[0] - expected_red).abs() < 1e-5);
        assert!((normalized.data()[2 * plane + 5] - expected_blue).abs() < 1e-5);
    }

    #[test]
    fn test_preprocessing_is_deterministic() {
        let preprocessor = Preprocessor::default();
        let bytes = leaf_jpeg(300, 200);
        let first = preprocessor.to_tensor(&bytes).unwrap();
        let second = preprocessor.to_tensor(&bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_oversized_file_rejected_from_metadata() {
        let config = PreprocessingConfig {
            max_upload_bytes: 64,
            ..PreprocessingConfig::default()
        };
        let preprocessor = Preprocessor::from_config(&config);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.jpg");
        // Not an image: only the size check may run
        std::fs::write(&path, vec![0_u8; 65]).unwrap();

        assert!(matches!(
            preprocessor.to_tensor_from_path(&path),
            Err(PreprocessError::TooLarge { size: 65, limit: 64 })
        ));

        std::fs::write(&path, vec![0_u8; 64]).unwrap();
        assert!(matches!(
            preprocessor.to_tensor_from_path(&path),
            Err(PreprocessError::Decode(_))
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let preprocessor = Preprocessor::default();
        let result = preprocessor.to_tensor_from_path("/nonexistent/leaf.jpg");
        assert!(matches!(result, Err(PreprocessError::Read { .. })));
    }
}
