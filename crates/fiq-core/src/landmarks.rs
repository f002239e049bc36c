//! 98-point facial landmark regressor via ONNX Runtime.
//!
//! The primary face is cropped to an enlarged square, resized to 256x256 RGB
//! scaled to `[0, 1]`; the model returns 98 `(x, y)` pairs normalized to the
//! crop.

use crate::capabilities::{LandmarkExtractor, StageError};
use crate::imaging::{crop_resize, rgb_view, to_tensor, Roi};
use crate::onnx::{load_session, run_first_output, ModelLoadError};
use crate::session::Session;
use crate::types::{FaceLandmarks, LandmarkKind, LandmarkPoint};
use ort::session::Session as OrtSession;
use std::path::Path;

const LANDMARK_INPUT_SIZE: u32 = 256;
const LANDMARK_COUNT: usize = 98;
const CROP_SCALE: f64 = 1.2;

pub struct AdnetLandmarkExtractor {
    session: OrtSession,
}

impl AdnetLandmarkExtractor {
    pub fn load(model_path: &Path) -> Result<Self, ModelLoadError> {
        Ok(Self {
            session: load_session(model_path, "landmark_extractor")?,
        })
    }

    fn decode(raw: &[f32], roi: Roi) -> Result<FaceLandmarks, StageError> {
        if raw.len() < LANDMARK_COUNT * 2 {
            return Err(StageError::InvalidOutput(format!(
                "expected {} landmark coordinates, got {}",
                LANDMARK_COUNT * 2,
                raw.len()
            )));
        }

        let points = raw[..LANDMARK_COUNT * 2]
            .chunks_exact(2)
            .map(|xy| {
                let (x, y) = roi.denormalize(xy[0] as f64, xy[1] as f64);
                LandmarkPoint::new(x.round() as i16, y.round() as i16)
            })
            .collect();

        Ok(FaceLandmarks {
            kind: LandmarkKind::Lm98,
            points,
        })
    }
}

impl LandmarkExtractor for AdnetLandmarkExtractor {
    fn extract_landmarks(&mut self, session: &Session) -> Result<FaceLandmarks, StageError> {
        let face = session
            .primary_face()
            .ok_or(StageError::MissingInput("detected face"))?;
        let roi = Roi::square_around(face, CROP_SCALE);
        let crop = crop_resize(&rgb_view(session.image())?, roi, LANDMARK_INPUT_SIZE);
        let input = to_tensor(&crop, [0, 1, 2], |_, v| v / 255.0);

        let raw = run_first_output(&mut self.session, &input)?;
        Self::decode(&raw, roi)
    }
}
