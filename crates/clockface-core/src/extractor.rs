//! Image bytes to embedding.
//!
//! The face model is an injected dependency: an [`EmbeddingExtractor`] owns a
//! [`ModelLoader`] and loads the model at most once, on first use or through
//! [`EmbeddingExtractor::preload`]. A failed load leaves the extractor
//! unloaded so a later call can retry.

use crate::detector::{self, DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Embedding, EmbeddingError};
use image::RgbImage;
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
    #[error("model state poisoned by an earlier panic")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("image could not be decoded: {0}")]
    InvalidImage(String),
    #[error("no face detected in image")]
    NoFaceDetected,
    #[error("face model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("face model failed: {0}")]
    Model(#[from] ModelError),
    #[error("face model produced {actual} components, expected {expected}")]
    UnexpectedDimension { expected: usize, actual: usize },
    #[error("face model produced an invalid embedding: {0}")]
    InvalidEmbedding(#[from] EmbeddingError),
}

/// Black-box detection + descriptor model.
pub trait FaceModel: Send + Sync {
    /// Describe the most prominent face in `image`, or `None` when there is none.
    fn describe(&self, image: &RgbImage) -> Result<Option<Vec<f32>>, ModelError>;
}

/// Builds a [`FaceModel`]; called at most once per successful load.
pub trait ModelLoader: Send + Sync {
    type Model: FaceModel;

    fn load(&self) -> Result<Self::Model, ModelError>;
}

pub struct EmbeddingExtractor<L: ModelLoader> {
    loader: L,
    model: OnceCell<L::Model>,
    dim: usize,
}

impl<L: ModelLoader> EmbeddingExtractor<L> {
    /// `dim` is the embedding length every extraction must produce.
    pub fn new(loader: L, dim: usize) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
            dim,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// Load the model now rather than on the first extraction.
    pub fn preload(&self) -> Result<(), ExtractError> {
        self.model().map(|_| ())
    }

    /// Concurrent first callers block on a single load; if it fails each
    /// caller sees `ModelUnavailable` and nothing is cached.
    fn model(&self) -> Result<&L::Model, ExtractError> {
        self.model
            .get_or_try_init(|| {
                let started = Instant::now();
                tracing::info!("loading face model");
                let model = self.loader.load()?;
                tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "face model ready");
                Ok::<_, ModelError>(model)
            })
            .map_err(|e| {
                tracing::error!(error = %e, "face model failed to load");
                ExtractError::ModelUnavailable(e.to_string())
            })
    }

    /// Decode `image_bytes` and describe the most prominent face.
    pub fn extract(&self, image_bytes: &[u8]) -> Result<Embedding, ExtractError> {
        let image = decode_image(image_bytes)?;
        self.extract_image(&image)
    }

    pub fn extract_image(&self, image: &RgbImage) -> Result<Embedding, ExtractError> {
        let model = self.model()?;
        let values = model.describe(image)?.ok_or(ExtractError::NoFaceDetected)?;

        if values.len() != self.dim {
            return Err(ExtractError::UnexpectedDimension {
                expected: self.dim,
                actual: values.len(),
            });
        }
        Ok(Embedding::new(values)?)
    }
}

/// Decode any format the `image` crate understands into 8-bit RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, ExtractError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| ExtractError::InvalidImage(e.to_string()))?;
    tracing::debug!(width = decoded.width(), height = decoded.height(), "image decoded");
    Ok(decoded.to_rgb8())
}

/// Loads the SCRFD detector and descriptor network from ONNX files.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    pub detector_path: PathBuf,
    pub recognizer_path: PathBuf,
    pub min_confidence: f32,
    pub dim: usize,
}

impl ModelLoader for OnnxModelLoader {
    type Model = OnnxFaceModel;

    fn load(&self) -> Result<OnnxFaceModel, ModelError> {
        let detector = FaceDetector::load(&self.detector_path, self.min_confidence)?;
        let recognizer = FaceRecognizer::load(&self.recognizer_path, self.dim)?;
        Ok(OnnxFaceModel {
            detector: Mutex::new(detector),
            recognizer: Mutex::new(recognizer),
        })
    }
}

/// ONNX sessions need exclusive access while running, so each sits behind
/// its own lock; the loaded weights are never modified.
pub struct OnnxFaceModel {
    detector: Mutex<FaceDetector>,
    recognizer: Mutex<FaceRecognizer>,
}

impl FaceModel for OnnxFaceModel {
    fn describe(&self, image: &RgbImage) -> Result<Option<Vec<f32>>, ModelError> {
        let faces = self
            .detector
            .lock()
            .map_err(|_| ModelError::Poisoned)?
            .detect(image)?;

        let Some(face) = detector::most_prominent(&faces) else {
            return Ok(None);
        };
        if faces.len() > 1 {
            tracing::debug!(
                faces = faces.len(),
                confidence = face.confidence,
                "several faces found, describing the most prominent"
            );
        }

        let descriptor = self
            .recognizer
            .lock()
            .map_err(|_| ModelError::Poisoned)?
            .describe(image, face)?;
        Ok(Some(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Reports a face only when the top-left pixel is not black.
    struct StubModel;

    impl FaceModel for StubModel {
        fn describe(&self, image: &RgbImage) -> Result<Option<Vec<f32>>, ModelError> {
            let Rgb([r, g, b]) = *image.get_pixel(0, 0);
            if (r, g, b) == (0, 0, 0) {
                return Ok(None);
            }
            Ok(Some(vec![r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]))
        }
    }

    /// Counts load attempts; the first `failures` attempts fail.
    #[derive(Clone)]
    struct CountingLoader {
        attempts: Arc<AtomicUsize>,
        failures: usize,
        delay: Duration,
    }

    impl CountingLoader {
        fn new(failures: usize) -> Self {
            Self {
                attempts: Arc::new(AtomicUsize::new(0)),
                failures,
                delay: Duration::ZERO,
            }
        }
    }

    impl ModelLoader for CountingLoader {
        type Model = StubModel;

        fn load(&self) -> Result<StubModel, ModelError> {
            std::thread::sleep(self.delay);
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(ModelError::Detector(DetectorError::ModelNotFound(
                    "models/det.onnx".into(),
                )));
            }
            Ok(StubModel)
        }
    }

    fn png(colour: [u8; 3]) -> Vec<u8> {
        let image = RgbImage::from_pixel(8, 8, Rgb(colour));
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_extract_returns_embedding() {
        let extractor = EmbeddingExtractor::new(CountingLoader::new(0), 3);
        let embedding = extractor.extract(&png([255, 0, 51])).unwrap();
        assert_eq!(embedding.values(), &[1.0, 0.0, 0.2]);
    }

    #[test]
    fn test_no_face_detected() {
        let extractor = EmbeddingExtractor::new(CountingLoader::new(0), 3);
        assert!(matches!(
            extractor.extract(&png([0, 0, 0])),
            Err(ExtractError::NoFaceDetected)
        ));
    }

    #[test]
    fn test_undecodable_bytes() {
        let extractor = EmbeddingExtractor::new(CountingLoader::new(0), 3);
        assert!(matches!(
            extractor.extract(b"definitely not an image"),
            Err(ExtractError::InvalidImage(_))
        ));
        // Decoding fails before the model is touched.
        assert!(!extractor.is_loaded());
    }

    #[test]
    fn test_dimension_checked() {
        let extractor = EmbeddingExtractor::new(CountingLoader::new(0), 128);
        assert!(matches!(
            extractor.extract(&png([10, 10, 10])),
            Err(ExtractError::UnexpectedDimension { expected: 128, actual: 3 })
        ));
    }

    #[test]
    fn test_model_loaded_lazily_once() {
        let loader = CountingLoader::new(0);
        let attempts = loader.attempts.clone();
        let extractor = EmbeddingExtractor::new(loader, 3);

        assert!(!extractor.is_loaded());
        assert_eq!(attempts.load(Ordering::SeqCst), 0);

        extractor.extract(&png([1, 2, 3])).unwrap();
        extractor.extract(&png([4, 5, 6])).unwrap();
        assert!(extractor.is_loaded());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_load_is_retried() {
        let loader = CountingLoader::new(1);
        let attempts = loader.attempts.clone();
        let extractor = EmbeddingExtractor::new(loader, 3);

        let err = extractor.preload().unwrap_err();
        assert!(matches!(err, ExtractError::ModelUnavailable(ref msg) if msg.contains("det.onnx")));
        assert!(!extractor.is_loaded());

        extractor.extract(&png([9, 9, 9])).unwrap();
        assert!(extractor.is_loaded());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_first_use_loads_once() {
        let mut loader = CountingLoader::new(0);
        loader.delay = Duration::from_millis(50);
        let attempts = loader.attempts.clone();
        let extractor = EmbeddingExtractor::new(loader, 3);
        let image = png([200, 100, 50]);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| extractor.extract(&image)))
                .collect();
            for handle in handles {
                assert!(handle.join().unwrap().is_ok());
            }
        });

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_onnx_loader_reports_missing_files() {
        let loader = OnnxModelLoader {
            detector_path: Path::new("/nonexistent/det_10g.onnx").to_path_buf(),
            recognizer_path: Path::new("/nonexistent/face_descriptor.onnx").to_path_buf(),
            min_confidence: 0.5,
            dim: 128,
        };
        let extractor = EmbeddingExtractor::new(loader, 128);
        let err = extractor.preload().unwrap_err();
        assert!(matches!(err, ExtractError::ModelUnavailable(ref msg) if msg.contains("det_10g.onnx")));
    }
}
