//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes an RGB image into the 640×640 network input, decodes the
//! three anchor-free stride heads and applies non-maximum suppression.

use crate::types::{Detection, Landmarks};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Output tensor positions for one stride head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeadOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// Scale and padding applied when fitting the image into the network input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    width: u32,
    height: u32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let fitted_w = ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        let fitted_h = ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        Self {
            scale,
            width: fitted_w,
            height: fitted_h,
            pad_x: (INPUT_SIZE - fitted_w) / 2,
            pad_y: (INPUT_SIZE - fitted_h) / 2,
        }
    }

    /// Map a point from network input space back to the original image.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

pub struct FaceDetector {
    session: Session,
    heads: [HeadOutputs; 3],
    min_confidence: f32,
}

impl FaceDetector {
    pub fn load(model_path: &Path, min_confidence: f32) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        if names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "detector needs 9 outputs (score/bbox/kps per stride), model has {}",
                names.len()
            )));
        }
        let heads = output_layout(&names);

        tracing::info!(
            path = %model_path.display(),
            outputs = ?names,
            ?heads,
            "loaded face detector"
        );

        Ok(Self {
            session,
            heads,
            min_confidence,
        })
    }

    /// Detect faces, strongest first, with coordinates in `image` space.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let letterbox = Letterbox::fit(image.width(), image.height());
        let input = preprocess(image, &letterbox);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (head, &stride) in self.heads.iter().zip(STRIDES.iter()) {
            let extract = |index: usize, what: &str| {
                outputs[index]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let scores = extract(head.score, "scores")?;
            let bboxes = extract(head.bbox, "bboxes")?;
            let kps = extract(head.kps, "landmarks")?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                kps,
                stride,
                &letterbox,
                self.min_confidence,
            ));
        }

        let faces = suppress(candidates, NMS_IOU_THRESHOLD);
        tracing::debug!(faces = faces.len(), "detection complete");
        Ok(faces)
    }
}

/// Pick the face to describe when several are present: highest confidence,
/// larger box on equal confidence.
pub fn most_prominent(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().reduce(|best, d| {
        let stronger = d.confidence > best.confidence
            || (d.confidence == best.confidence && d.area() > best.area());
        if stronger {
            d
        } else {
            best
        }
    })
}

/// Resize into the letterbox and normalise to an NCHW tensor.
/// Padding stays at zero, which is where the mean pixel normalises to.
fn preprocess(image: &RgbImage, letterbox: &Letterbox) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let resized = imageops::resize(image, letterbox.width, letterbox.height, FilterType::Triangle);
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in resized.enumerate_pixels() {
        let ty = (y + letterbox.pad_y) as usize;
        let tx = (x + letterbox.pad_x) as usize;
        for (c, &value) in pixel.0.iter().enumerate() {
            tensor[[0, c, ty, tx]] = (value as f32 - PIXEL_MEAN) / PIXEL_STD;
        }
    }

    tensor
}

/// Locate each stride's score/bbox/kps tensors.
///
/// Exports that name their outputs `score_8`, `bbox_16`, `kps_32`, ... are
/// mapped by name in any order; anything else gets the conventional layout
/// of scores 0-2, boxes 3-5, landmarks 6-8.
fn output_layout(names: &[String]) -> [HeadOutputs; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let named = |stride: usize| -> Option<HeadOutputs> {
        Some(HeadOutputs {
            score: position("score", stride)?,
            bbox: position("bbox", stride)?,
            kps: position("kps", stride)?,
        })
    };

    match (named(STRIDES[0]), named(STRIDES[1]), named(STRIDES[2])) {
        (Some(a), Some(b), Some(c)) => [a, b, c],
        _ => std::array::from_fn(|i| HeadOutputs {
            score: i,
            bbox: i + 3,
            kps: i + 6,
        }),
    }
}

fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    min_confidence: f32,
) -> Vec<Detection> {
    let grid_w = INPUT_SIZE as usize / stride;
    let grid_h = INPUT_SIZE as usize / stride;
    let anchors = grid_w * grid_h * ANCHORS_PER_CELL;
    let step = stride as f32;

    scores
        .iter()
        .take(anchors)
        .enumerate()
        .filter(|&(_, &score)| score >= min_confidence)
        .filter_map(|(idx, &score)| {
            let cell = idx / ANCHORS_PER_CELL;
            let ax = ((cell % grid_w) * stride) as f32;
            let ay = ((cell / grid_w) * stride) as f32;

            let b = bboxes.get(idx * 4..idx * 4 + 4)?;
            let k = kps.get(idx * 10..idx * 10 + 10)?;

            let (x1, y1) = letterbox.unmap(ax - b[0] * step, ay - b[1] * step);
            let (x2, y2) = letterbox.unmap(ax + b[2] * step, ay + b[3] * step);
            let landmarks: Landmarks = std::array::from_fn(|i| {
                letterbox.unmap(ax + k[2 * i] * step, ay + k[2 * i + 1] * step)
            });

            Some(Detection {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; output is sorted by confidence, descending.
fn suppress(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let left = a.x.max(b.x);
    let top = a.y.max(b.y);
    let right = (a.x + a.width).min(b.x + b.width);
    let bottom = (a.y + a.height).min(b.y + b.height);

    let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
    let union = a.area() + b.area() - overlap;
    if union > 0.0 {
        overlap / union
    } else {
        0.0
    }
}
