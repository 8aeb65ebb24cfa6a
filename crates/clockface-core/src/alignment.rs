//! Face alignment via a 4-DOF similarity transform.
//!
//! Maps the five detected landmarks onto the canonical 112×112 recognition
//! template with a closed-form least-squares fit, then warps the RGB image.

use crate::types::Landmarks;
use image::{Rgb, RgbImage};

pub const ALIGNED_SIZE: u32 = 112;

/// Canonical landmark positions of the 112×112 recognition template.
const TEMPLATE_112: Landmarks = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// `q = [a -b; b a] p + t`: uniform scale, rotation and translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares similarity taking `src` onto `dst`.
    ///
    /// Returns `None` when the source points are coincident.
    pub fn estimate(src: &Landmarks, dst: &Landmarks) -> Option<Self> {
        let n = src.len() as f32;
        let mean = |pts: &Landmarks| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (spx, spy) = mean(src);
        let (sqx, sqy) = mean(dst);

        let mut spread = 0.0f32;
        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        for (&(px, py), &(qx, qy)) in src.iter().zip(dst.iter()) {
            let (px, py) = (px - spx, py - spy);
            let (qx, qy) = (qx - sqx, qy - sqy);
            spread += px * px + py * py;
            dot += px * qx + py * qy;
            cross += px * qy - py * qx;
        }

        if spread < f32::EPSILON {
            return None;
        }

        let a = dot / spread;
        let b = cross / spread;
        Some(Self {
            a,
            b,
            tx: sqx - (a * spx - b * spy),
            ty: sqy - (b * spx + a * spy),
        })
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    fn invert(&self, (x, y): (f32, f32)) -> (f32, f32) {
        let det = self.a * self.a + self.b * self.b;
        let (dx, dy) = (x - self.tx, y - self.ty);
        ((self.a * dx + self.b * dy) / det, (self.a * dy - self.b * dx) / det)
    }

    fn scale(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }
}

/// Warp the face described by `landmarks` into a 112×112 aligned crop.
///
/// Returns `None` for degenerate landmarks. Samples outside the source image
/// are black.
pub fn align_face(image: &RgbImage, landmarks: &Landmarks) -> Option<RgbImage> {
    let transform = Similarity::estimate(landmarks, &TEMPLATE_112)?;
    if transform.scale() < f32::EPSILON {
        return None;
    }

    Some(RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |ox, oy| {
        let (sx, sy) = transform.invert((ox as f32, oy as f32));
        sample_bilinear(image, sx, sy)
    }))
}

fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let texel = |px: i64, py: i64| -> [f32; 3] {
        if px < 0 || py < 0 || px >= w || py >= h {
            return [0.0; 3];
        }
        let Rgb([r, g, b]) = *image.get_pixel(px as u32, py as u32);
        [r as f32, g as f32, b as f32]
    };

    let weights = [
        ((x0, y0), (1.0 - fx) * (1.0 - fy)),
        ((x0 + 1, y0), fx * (1.0 - fy)),
        ((x0, y0 + 1), (1.0 - fx) * fy),
        ((x0 + 1, y0 + 1), fx * fy),
    ];

    let mut out = [0.0f32; 3];
    for ((px, py), weight) in weights {
        let t = texel(px, py);
        for c in 0..3 {
            out[c] += t[c] * weight;
        }
    }
    Rgb(out.map(|v| v.round().clamp(0.0, 255.0) as u8))
}
