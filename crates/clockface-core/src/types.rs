use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
pub type Landmarks = [(f32, f32); 5];

/// A face found by the detector, in original image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub landmarks: Landmarks,
}

impl Detection {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding has no components")]
    Empty,
    #[error("embedding component {index} is not finite")]
    NonFinite { index: usize },
}

/// Face embedding: an ordered, fixed-length vector of finite floats.
///
/// Immutable once constructed. Two embeddings are only comparable when they
/// share a dimension; see [`Embedding::distance`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    /// Build an embedding, rejecting empty vectors and NaN/infinite components.
    pub fn new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite { index });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance: square root of the summed squared component differences.
    pub fn distance(&self, other: &Embedding) -> Result<f32, MatchError> {
        if self.dim() != other.dim() {
            return Err(MatchError::DimensionMismatch {
                left: self.dim(),
                right: other.dim(),
            });
        }

        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt())
    }
}

/// An employee together with the embedding enrolled for them, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrolledIdentity {
    pub employee_id: String,
    pub embedding: Option<Embedding>,
}

impl EnrolledIdentity {
    pub fn new(employee_id: impl Into<String>, embedding: Option<Embedding>) -> Self {
        Self {
            employee_id: employee_id.into(),
            embedding,
        }
    }
}

/// Outcome of resolving a probe against the enrolled population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchResult {
    Identified { employee_id: String, distance: f32 },
    NoMatch,
}

impl MatchResult {
    pub fn employee_id(&self) -> Option<&str> {
        match self {
            MatchResult::Identified { employee_id, .. } => Some(employee_id),
            MatchResult::NoMatch => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("embedding dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}
