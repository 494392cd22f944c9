//! Model input and output value types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Channels of the network input (RGB).
pub const INPUT_CHANNELS: usize = 3;

/// Height and width of the network input.
pub const INPUT_SIZE: usize = 224;

/// Shape the classifier expects: batch of one, channels first.
pub const INPUT_SHAPE: [usize; 4] = [1, INPUT_CHANNELS, INPUT_SIZE, INPUT_SIZE];

/// Dense f32 tensor in row-major (NCHW) layout.
///
/// Produced per request by the preprocessor and consumed by a single
/// forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl ImageTensor {
    /// Build a tensor from a shape and its flat data.
    ///
    /// Returns `None` when the data length disagrees with the shape.
    pub fn from_raw(shape: Vec<usize>, data: Vec<f32>) -> Option<Self> {
        let elements: usize = shape.iter().product();
        if shape.is_empty() || elements != data.len() {
            return None;
        }
        Some(Self { shape, data })
    }

    /// Wrap flat data laid out as [`INPUT_SHAPE`].
    pub(crate) fn from_input_data(data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), INPUT_SHAPE.iter().product::<usize>());
        Self {
            shape: INPUT_SHAPE.to_vec(),
            data,
        }
    }

    /// All-zero tensor of the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        let elements = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; elements],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Smallest and largest element, or `None` for an empty tensor.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        let first = *self.data.first()?;
        Some(
            self.data
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }
}

/// Position of a class in the classifier output, and the row of that class
/// in both lookup tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassIndex(pub usize);

impl ClassIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for ClassIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for ClassIndex {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Winning class of a forward pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub index: ClassIndex,
    /// Softmax probability of the winning class (0.0 - 1.0)
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_rejects_length_mismatch() {
        assert!(ImageTensor::from_raw(vec![1, 3, 2, 2], vec![0.0; 12]).is_some());
        assert!(ImageTensor::from_raw(vec![1, 3, 2, 2], vec![0.0; 11]).is_none());
        assert!(ImageTensor::from_raw(vec![], vec![]).is_none());
    }

    #[test]
    fn test_zeros_matches_input_shape() {
        let tensor = ImageTensor::zeros(&INPUT_SHAPE);
        assert_eq!(tensor.shape(), &INPUT_SHAPE);
        assert_eq!(tensor.len(), 3 * 224 * 224);
        assert_eq!(tensor.value_range(), Some((0.0, 0.0)));
    }

    #[test]
    fn test_class_index_serializes_as_number() {
        let json = serde_json::to_string(&ClassIndex(17)).unwrap();
        assert_eq!(json, "17");
    }
}
