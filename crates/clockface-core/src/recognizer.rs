//! Face descriptor network via ONNX Runtime.
//!
//! Takes a 112×112 aligned RGB crop and produces an L2-normalised descriptor.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::types::Detection;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// Symmetric normalisation: [0, 255] -> [-1, 1].
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 127.5;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognizer model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("expected {expected}-dim descriptor, model produced {actual}")]
    UnexpectedDimension { expected: usize, actual: usize },
    #[error("face landmarks are degenerate, cannot align")]
    DegenerateLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
    dim: usize,
}

impl FaceRecognizer {
    /// Load the descriptor model; `dim` is the descriptor length it must produce.
    pub fn load(model_path: &Path, dim: usize) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            dim,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded face recognizer"
        );

        Ok(Self { session, dim })
    }

    /// Align the detected face and compute its descriptor.
    pub fn describe(
        &mut self,
        image: &RgbImage,
        face: &Detection,
    ) -> Result<Vec<f32>, RecognizerError> {
        let aligned = alignment::align_face(image, &face.landmarks)
            .ok_or(RecognizerError::DegenerateLandmarks)?;
        let input = preprocess(&aligned);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("descriptor output: {e}")))?;

        if raw.len() != self.dim {
            return Err(RecognizerError::UnexpectedDimension {
                expected: self.dim,
                actual: raw.len(),
            });
        }

        Ok(l2_normalize(raw))
    }
}

fn preprocess(aligned: &RgbImage) -> Array4<f32> {
    let size = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        for (c, &value) in pixel.0.iter().enumerate() {
            tensor[[0, c, y as usize, x as usize]] = (value as f32 - PIXEL_MEAN) / PIXEL_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|v| v / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_shape_and_range() {
        let mut crop = RgbImage::from_pixel(ALIGNED_SIZE, ALIGNED_SIZE, Rgb([0, 255, 128]));
        crop.put_pixel(3, 5, Rgb([255, 0, 0]));
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert_eq!(tensor[[0, 0, 0, 0]], -1.0);
        assert_eq!(tensor[[0, 1, 0, 0]], 1.0);
        assert_eq!(tensor[[0, 0, 5, 3]], 1.0);
        assert_eq!(tensor[[0, 1, 5, 3]], -1.0);
    }

    #[test]
    fn test_l2_normalize_unit_length() {
        let v = l2_normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        assert_eq!(l2_normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceRecognizer::load(Path::new("/nonexistent/recognizer.onnx"), 128)
            .err()
            .unwrap();
        assert!(matches!(err, RecognizerError::ModelNotFound(_)));
    }
}
