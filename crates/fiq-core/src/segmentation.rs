//! Face-parsing and occlusion segmenters via ONNX Runtime.
//!
//! Both run on the aligned BGR face and return a single-channel u8 mask in
//! aligned-face coordinates.

use crate::capabilities::{SegmentationExtractor, StageError};
use crate::imaging::{array_to_rgb, crop_resize, resize_mask, to_tensor, Roi};
use crate::matrix::Matrix;
use crate::onnx::{load_session, run_first_output, ModelLoadError};
use crate::session::Session;
use ndarray::Array3;
use ort::session::Session as OrtSession;
use std::path::Path;

const PARSING_INPUT_SIZE: usize = 512;
const OCCLUSION_INPUT_SIZE: usize = 224;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

fn aligned_pixels(session: &Session) -> Result<&Array3<u8>, StageError> {
    match session.aligned_face() {
        Some(Matrix::U8(pixels)) if pixels.dim().2 == 3 => Ok(pixels),
        Some(_) => Err(StageError::InvalidOutput(
            "aligned face is not a 3-channel u8 image".into(),
        )),
        None => Err(StageError::MissingInput("aligned face")),
    }
}

/// Resize the aligned BGR face, feed it as an RGB ImageNet-normalized tensor.
fn run_on_aligned(
    model: &mut OrtSession,
    pixels: &Array3<u8>,
    size: usize,
) -> Result<Vec<f32>, StageError> {
    let (rows, cols, _) = pixels.dim();
    let bgr = array_to_rgb(pixels)?;
    let resized = crop_resize(&bgr, Roi::full(cols, rows), size as u32);
    let input = to_tensor(&resized, [2, 1, 0], |c, v| {
        (v / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c]
    });
    run_first_output(model, &input)
}

/// Per-pixel argmax over `classes` planes of `size * size` logits.
fn argmax_classes(logits: &[f32], classes: usize, size: usize) -> Vec<u8> {
    let plane = size * size;
    (0..plane)
        .map(|p| {
            let mut best = 0usize;
            let mut best_v = f32::NEG_INFINITY;
            for c in 0..classes {
                let v = logits[c * plane + p];
                if v > best_v {
                    best_v = v;
                    best = c;
                }
            }
            best as u8
        })
        .collect()
}

fn upscale_mask(mask: Vec<u8>, size: usize, rows: usize, cols: usize) -> Result<Matrix, StageError> {
    let data = resize_mask(mask, size, rows, cols)?;
    Matrix::mask(rows, cols, data)
        .ok_or_else(|| StageError::InvalidOutput("mask size mismatch".into()))
}

pub struct FaceParsingSegmenter {
    session: OrtSession,
}

impl FaceParsingSegmenter {
    pub fn load(model_path: &Path) -> Result<Self, ModelLoadError> {
        Ok(Self {
            session: load_session(model_path, "face_parsing")?,
        })
    }
}

impl SegmentationExtractor for FaceParsingSegmenter {
    fn extract_mask(&mut self, session: &Session) -> Result<Matrix, StageError> {
        let pixels = aligned_pixels(session)?;
        let (rows, cols, _) = pixels.dim();
        let logits = run_on_aligned(&mut self.session, pixels, PARSING_INPUT_SIZE)?;

        let plane = PARSING_INPUT_SIZE * PARSING_INPUT_SIZE;
        if logits.is_empty() || logits.len() % plane != 0 || logits.len() / plane > 256 {
            return Err(StageError::InvalidOutput(format!(
                "face parsing output length {} does not hold {PARSING_INPUT_SIZE}x{PARSING_INPUT_SIZE} planes",
                logits.len()
            )));
        }

        let classes = argmax_classes(&logits, logits.len() / plane, PARSING_INPUT_SIZE);
        upscale_mask(classes, PARSING_INPUT_SIZE, rows, cols)
    }
}

/// Binary occlusion mask: 1 where the face is visible, 0 where occluded.
pub struct OcclusionSegmenter {
    session: OrtSession,
}

impl OcclusionSegmenter {
    pub fn load(model_path: &Path) -> Result<Self, ModelLoadError> {
        Ok(Self {
            session: load_session(model_path, "face_occlusion")?,
        })
    }

    fn threshold(logits: &[f32]) -> Vec<u8> {
        logits.iter().map(|&v| u8::from(v > 0.0)).collect()
    }
}

impl SegmentationExtractor for OcclusionSegmenter {
    fn extract_mask(&mut self, session: &Session) -> Result<Matrix, StageError> {
        let pixels = aligned_pixels(session)?;
        let (rows, cols, _) = pixels.dim();
        let logits = run_on_aligned(&mut self.session, pixels, OCCLUSION_INPUT_SIZE)?;

        let plane = OCCLUSION_INPUT_SIZE * OCCLUSION_INPUT_SIZE;
        if logits.len() != plane {
            return Err(StageError::InvalidOutput(format!(
                "occlusion output length {} != {plane}",
                logits.len()
            )));
        }

        upscale_mask(Self::threshold(&logits), OCCLUSION_INPUT_SIZE, rows, cols)
    }
}
