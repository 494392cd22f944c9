//! Classifier inference engine
//!
//! The engine is constructed once at startup and shared by reference across
//! request handlers. Weights never change after load; `classify` is a pure
//! function of the loaded weights and the input tensor.

use crate::config::ModelConfig;
use crate::error::{InferenceError, LoadError};
use crate::models::loader::{LoadedModel, ModelLoader};
use crate::types::tensor::{ClassIndex, ImageTensor, Prediction, INPUT_SHAPE};
use ort::value::Tensor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, TryLockError};
use tracing::{debug, info};

/// Computes raw class scores for one input tensor.
///
/// Implementations run in inference mode only: identical input must yield
/// identical scores.
pub trait ScoringBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Run a forward pass, returning one score per class
    fn scores(&self, input: &ImageTensor) -> Result<Vec<f32>, InferenceError>;
}

/// Fixed set of exclusively borrowed items, handed out round robin.
///
/// A caller takes the first free slot starting from its turn and only
/// waits when every slot is busy.
pub struct SessionPool<T> {
    slots: Vec<Mutex<T>>,
    next: AtomicUsize,
}

impl<T> SessionPool<T> {
    /// `None` when `items` is empty
    pub fn new(items: Vec<T>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        Some(Self {
            slots: items.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Run `f` with exclusive access to one item
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, InferenceError> {
        let count = self.slots.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % count;

        for offset in 0..count {
            match self.slots[(start + offset) % count].try_lock() {
                Ok(mut guard) => return Ok(f(&mut guard)),
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(e)) => {
                    return Err(InferenceError::Execution(format!("Lock error: {e}")))
                }
            }
        }

        let mut guard = self.slots[start]
            .lock()
            .map_err(|e| InferenceError::Execution(format!("Lock error: {e}")))?;
        Ok(f(&mut guard))
    }
}

/// ONNX Runtime backend.
///
/// `Session::run` needs `&mut`, so concurrent forward passes are limited to
/// the number of pooled sessions (`model.sessions`). Each session holds its
/// own copy of the weights.
pub struct OnnxBackend {
    sessions: SessionPool<LoadedModel>,
}

impl OnnxBackend {
    pub fn new(model: LoadedModel) -> Self {
        Self {
            sessions: SessionPool {
                slots: vec![Mutex::new(model)],
                next: AtomicUsize::new(0),
            },
        }
    }

    /// Backend over several sessions of the same graph. `None` when
    /// `models` is empty.
    pub fn pooled(models: Vec<LoadedModel>) -> Option<Self> {
        SessionPool::new(models).map(|sessions| Self { sessions })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl ScoringBackend for OnnxBackend {
    fn name(&self) -> &str {
        "onnx"
    }

    fn scores(&self, input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let input_tensor = Tensor::from_array((shape, input.data().to_vec()))
            .map_err(|e| InferenceError::Execution(format!("Failed to create input tensor: {e}")))?;

        self.sessions.with(|model| -> Result<Vec<f32>, InferenceError> {
            let outputs = model
                .session
                .run(ort::inputs![&model.input_name => input_tensor])
                .map_err(|e| InferenceError::Execution(e.to_string()))?;

            let output = outputs.get(model.output_name.as_str()).ok_or_else(|| {
                InferenceError::InvalidOutput(format!("missing output {}", model.output_name))
            })?;
            let (_, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;

            Ok(data.to_vec())
        })?
    }
}

/// Loaded classifier with its fixed class count and input contract
pub struct InferenceEngine {
    backend: Box<dyn ScoringBackend>,
    num_classes: usize,
    input_shape: Vec<usize>,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("backend", &self.backend.name())
            .field("num_classes", &self.num_classes)
            .field("input_shape", &self.input_shape)
            .finish()
    }
}

impl InferenceEngine {
    /// Load the ONNX artifact and verify it against the configured class
    /// count. Any failure here is fatal for startup.
    pub fn load<P: AsRef<Path>>(artifact_path: P, config: &ModelConfig) -> Result<Self, LoadError> {
        let loader = ModelLoader::with_threads(config.onnx_threads);
        let models = (0..config.sessions.max(1))
            .map(|_| loader.load_model(artifact_path.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let backend = OnnxBackend::pooled(models).ok_or_else(|| LoadError::Corrupt {
            path: artifact_path.as_ref().to_path_buf(),
            reason: "no sessions loaded".to_string(),
        })?;
        info!(sessions = backend.session_count(), "ONNX session pool ready");
        Self::with_backend(Box::new(backend), config.num_classes)
    }

    /// Wrap an already constructed backend.
    ///
    /// Runs one forward pass over an all-zero input so a graph with the
    /// wrong class count is rejected before any request is served.
    pub fn with_backend(
        backend: Box<dyn ScoringBackend>,
        num_classes: usize,
    ) -> Result<Self, LoadError> {
        let probe = backend.scores(&ImageTensor::zeros(&INPUT_SHAPE))?;
        if num_classes == 0 || probe.len() != num_classes {
            return Err(LoadError::ClassCountMismatch {
                expected: num_classes,
                actual: probe.len(),
            });
        }

        info!(
            backend = backend.name(),
            num_classes = num_classes,
            "Inference engine initialized"
        );

        Ok(Self {
            backend,
            num_classes,
            input_shape: INPUT_SHAPE.to_vec(),
        })
    }

    /// Number of classes the model distinguishes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Input shape the model expects
    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Index of the highest scoring class
    pub fn classify(&self, tensor: &ImageTensor) -> Result<ClassIndex, InferenceError> {
        self.predict(tensor).map(|p| p.index)
    }

    /// Highest scoring class with its softmax confidence
    pub fn predict(&self, tensor: &ImageTensor) -> Result<Prediction, InferenceError> {
        if tensor.shape() != self.input_shape.as_slice() {
            return Err(InferenceError::ShapeMismatch {
                expected: self.input_shape.clone(),
                actual: tensor.shape().to_vec(),
            });
        }

        let scores = self.backend.scores(tensor)?;
        if scores.len() != self.num_classes {
            return Err(InferenceError::OutputSize {
                expected: self.num_classes,
                actual: scores.len(),
            });
        }
        if scores.iter().any(|s| s.is_nan()) {
            return Err(InferenceError::InvalidOutput(
                "class scores contain NaN".to_string(),
            ));
        }

        let index = argmax(&scores)
            .ok_or_else(|| InferenceError::InvalidOutput("no class scores".to_string()))?;
        let confidence = softmax_at(&scores, index);

        debug!(index = index, confidence = confidence, "Forward pass complete");

        Ok(Prediction {
            index: ClassIndex(index),
            confidence,
        })
    }
}

/// Position of the maximum score; the lowest index wins ties.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// Softmax probability of `scores[index]`
fn softmax_at(scores: &[f32], index: usize) -> f32 {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return 1.0;
    }
    let sum: f32 = scores.iter().map(|&s| (s - max).exp()).sum();
    (scores[index] - max).exp() / sum
}


#[cfg(test)]
mod tests {
    use super::testing::{ChannelMeanBackend, FixedScores};
    use super::*;

    #[test]
    fn test_argmax_first_max_wins() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 0.5]), Some(1));
        assert_eq!(argmax(&[-2.0, -1.0, -3.0]), Some(1));
        assert_eq!(argmax(&[7.0]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_classify_picks_highest_score() {
        let mut scores = vec![0.0; 39];
        scores[12] = 4.5;
        scores[30] = 4.5;
        let engine = InferenceEngine::with_backend(Box::new(FixedScores(scores)), 39).unwrap();

        let tensor = ImageTensor::zeros(&INPUT_SHAPE);
        assert_eq!(engine.classify(&tensor).unwrap(), ClassIndex(12));
    }

    #[test]
    fn test_classify_is_deterministic() {
        let engine =
            InferenceEngine::with_backend(Box::new(ChannelMeanBackend { num_classes: 39 }), 39)
                .unwrap();
        let data: Vec<f32> = (0..3 * 224 * 224).map(|i| (i % 255) as f32 / 255.0).collect();
        let tensor = ImageTensor::from_raw(INPUT_SHAPE.to_vec(), data).unwrap();

        let first = engine.classify(&tensor).unwrap();
        for _ in 0..5 {
            assert_eq!(engine.classify(&tensor).unwrap(), first);
        }
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let engine =
            InferenceEngine::with_backend(Box::new(FixedScores(vec![1.0; 38])), 38).unwrap();
        let tensor = ImageTensor::zeros(&[1, 3, 100, 100]);

        match engine.classify(&tensor) {
            Err(InferenceError::ShapeMismatch { expected, actual }) => {
                assert_eq!(expected, vec![1, 3, 224, 224]);
                assert_eq!(actual, vec![1, 3, 100, 100]);
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_class_count_mismatch_fails_load() {
        let result = InferenceEngine::with_backend(Box::new(FixedScores(vec![0.0; 38])), 39);
        assert!(matches!(
            result,
            Err(LoadError::ClassCountMismatch {
                expected: 39,
                actual: 38
            })
        ));
    }

    #[test]
    fn test_nan_scores_rejected() {
        let mut scores = vec![0.0; 4];
        let engine =
            InferenceEngine::with_backend(Box::new(FixedScores(scores.clone())), 4).unwrap();
        assert!(engine.classify(&ImageTensor::zeros(&INPUT_SHAPE)).is_ok());

        scores[2] = f32::NAN;
        let engine = InferenceEngine::with_backend(Box::new(FixedScores(scores)), 4).unwrap();
        assert!(matches!(
            engine.classify(&ImageTensor::zeros(&INPUT_SHAPE)),
            Err(InferenceError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_prediction_confidence() {
        let engine = InferenceEngine::with_backend(
            Box::new(FixedScores(vec![0.0, 0.0, 0.0, 0.0])),
            4,
        )
        .unwrap();
        let prediction = engine.predict(&ImageTensor::zeros(&INPUT_SHAPE)).unwrap();
        assert_eq!(prediction.index, ClassIndex(0));
        assert!((prediction.confidence - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_session_pool_hands_out_free_slot() {
        let pool = SessionPool::new(vec![10_usize, 20]).unwrap();
        assert_eq!(pool.len(), 2);

        // A nested borrow gets the other slot instead of waiting
        let (outer, inner) = pool.with(|a| (*a, pool.with(|b| *b).unwrap())).unwrap();
        assert_ne!(outer, inner);

        let mut seen: Vec<usize> = (0..4).map(|_| pool.with(|v| *v).unwrap()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![10, 10, 20, 20]);
        assert!(SessionPool::<usize>::new(Vec::new()).is_none());
    }

    #[test]
    fn test_session_pool_items_are_mutable() {
        let pool = SessionPool::new(vec![0_u32]).unwrap();
        for _ in 0..3 {
            pool.with(|count| *count += 1).unwrap();
        }
        assert_eq!(pool.with(|count| *count).unwrap(), 3);
    }

    #[test]
    fn test_missing_artifact_fails_load() {
        let config = ModelConfig::default();
        let result = InferenceEngine::load("/nonexistent/model.onnx", &config);
        assert!(matches!(result, Err(LoadError::ArtifactAbsent { .. })));
    }
}
