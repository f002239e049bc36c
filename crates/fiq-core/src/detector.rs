//! SSD face detector via ONNX Runtime.
//!
//! Expects the res10 300x300 SSD layout: BGR input with per-channel mean
//! subtraction and a `[1, 1, N, 7]` detection output whose rows are
//! `[image_id, label, confidence, x1, y1, x2, y2]` with normalized corners.

use crate::capabilities::{FaceDetector, StageError};
use crate::imaging::{crop_resize, rgb_view, to_tensor, Roi};
use crate::onnx::{load_session, run_first_output, ModelLoadError};
use crate::session::Session;
use crate::types::{BoundingBox, FaceDetectorKind, Image};
use ndarray::Array4;
use ort::session::Session as OrtSession;
use std::path::Path;

const SSD_INPUT_SIZE: u32 = 300;
const SSD_MEAN_BGR: [f32; 3] = [104.0, 177.0, 123.0];
const SSD_ROW_LEN: usize = 7;

pub struct SsdFaceDetector {
    session: OrtSession,
    confidence_threshold: f32,
    min_face_size: u32,
}

impl SsdFaceDetector {
    pub fn load(
        model_path: &Path,
        confidence_threshold: f32,
        min_face_size: u32,
    ) -> Result<Self, ModelLoadError> {
        let session = load_session(model_path, "face_detector")?;
        Ok(Self {
            session,
            confidence_threshold,
            min_face_size,
        })
    }

    fn preprocess(image: &Image) -> Result<Array4<f32>, StageError> {
        let view = rgb_view(image)?;
        let roi = Roi::full(image.width as usize, image.height as usize);
        let resized = crop_resize(&view, roi, SSD_INPUT_SIZE);
        Ok(to_tensor(&resized, [2, 1, 0], |c, v| v - SSD_MEAN_BGR[c]))
    }

    /// Turn raw detection rows into pixel boxes, largest first.
    fn postprocess(
        raw: &[f32],
        width: u16,
        height: u16,
        confidence_threshold: f32,
        min_face_size: u32,
    ) -> Vec<BoundingBox> {
        let w = width as f32;
        let h = height as f32;

        let mut faces: Vec<BoundingBox> = raw
            .chunks_exact(SSD_ROW_LEN)
            .filter(|row| row[2] >= confidence_threshold)
            .filter_map(|row| {
                let x1 = (row[3].clamp(0.0, 1.0) * w).round();
                let y1 = (row[4].clamp(0.0, 1.0) * h).round();
                let x2 = (row[5].clamp(0.0, 1.0) * w).round();
                let y2 = (row[6].clamp(0.0, 1.0) * h).round();
                let bw = x2 - x1;
                let bh = y2 - y1;
                if bw < min_face_size as f32 || bh < min_face_size as f32 {
                    return None;
                }
                Some(BoundingBox {
                    xleft: x1 as i16,
                    ytop: y1 as i16,
                    width: bw as i16,
                    height: bh as i16,
                    detector: FaceDetectorKind::OpenCvSsd,
                })
            })
            .collect();

        faces.sort_by_key(|b| std::cmp::Reverse(b.area()));
        faces
    }
}

impl FaceDetector for SsdFaceDetector {
    fn detect_faces(&mut self, session: &Session) -> Result<Vec<BoundingBox>, StageError> {
        let image = session.image();
        let input = Self::preprocess(image)?;
        let raw = run_first_output(&mut self.session, &input)?;

        if raw.len() % SSD_ROW_LEN != 0 {
            return Err(StageError::InvalidOutput(format!(
                "detection output length {} is not a multiple of {SSD_ROW_LEN}",
                raw.len()
            )));
        }

        let faces = Self::postprocess(
            &raw,
            image.width,
            image.height,
            self.confidence_threshold,
            self.min_face_size,
        );
        tracing::debug!(count = faces.len(), "faces detected");
        Ok(faces)
    }
}
