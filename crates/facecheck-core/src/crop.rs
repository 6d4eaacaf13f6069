//! Face crop and input normalization for the embedding model.
//!
//! Faces are cut straight out of the frame along the detector box (no
//! landmark alignment), resized to 112×112 and scaled to roughly [-1, 1].

use crate::types::BoundingBox;
use image::{imageops, RgbImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const FACE_INPUT_SIZE: u32 = 112;
const FACE_MEAN: f32 = 127.5;
const FACE_STD: f32 = 127.5;

/// Memory layout of the embedding model input tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, 112, 112, 3]`, as exported from TFLite MobileFaceNet.
    #[default]
    Nhwc,
    /// `[1, 3, 112, 112]`.
    Nchw,
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nhwc" => Ok(Self::Nhwc),
            "nchw" => Ok(Self::Nchw),
            other => Err(format!("unknown tensor layout: {other} (expected nhwc or nchw)")),
        }
    }
}

/// Cut the face region out of `image`, clipped to the image bounds.
///
/// Returns `None` when the clipped region has no area.
pub fn crop_face(image: &RgbImage, face: &BoundingBox) -> Option<RgbImage> {
    let left = face.x.max(0.0);
    let top = face.y.max(0.0);
    let right = face.right().min(image.width() as f32);
    let bottom = face.bottom().min(image.height() as f32);

    // Truncate toward zero; NaN becomes 0 and is rejected below.
    let width = (right - left) as i64;
    let height = (bottom - top) as i64;

    if width <= 0 || height <= 0 {
        tracing::debug!(width, height, ?face, "face crop has no area");
        return None;
    }

    let x = left as u32;
    let y = top as u32;
    let width = (width as u32).min(image.width().saturating_sub(x));
    let height = (height as u32).min(image.height().saturating_sub(y));
    if width == 0 || height == 0 {
        return None;
    }

    Some(imageops::crop_imm(image, x, y, width, height).to_image())
}

/// Resize a face crop to 112×112 (bilinear) and normalize into a float tensor.
pub fn preprocess(crop: &RgbImage, layout: TensorLayout) -> Array4<f32> {
    let size = FACE_INPUT_SIZE as usize;
    let resized = if crop.dimensions() == (FACE_INPUT_SIZE, FACE_INPUT_SIZE) {
        crop.clone()
    } else {
        imageops::resize(crop, FACE_INPUT_SIZE, FACE_INPUT_SIZE, imageops::FilterType::Triangle)
    };

    let mut tensor = match layout {
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, size, size, 3)),
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, size, size)),
    };

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let normalized = (pixel[c] as f32 - FACE_MEAN) / FACE_STD;
            match layout {
                TensorLayout::Nhwc => tensor[[0, y, x, c]] = normalized,
                TensorLayout::Nchw => tensor[[0, c, y, x]] = normalized,
            }
        }
    }

    tensor
}
