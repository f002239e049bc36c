//! Head pose regressor via ONNX Runtime: face crop in, yaw/pitch/roll out.

use crate::capabilities::{PoseEstimator, StageError};
use crate::imaging::{crop_resize, rgb_view, to_tensor, Roi};
use crate::onnx::{load_session, run_first_output, ModelLoadError};
use crate::session::Session;
use crate::types::Pose;
use ort::session::Session as OrtSession;
use std::path::Path;

const POSE_INPUT_SIZE: u32 = 120;
const POSE_MEAN: f32 = 127.5;
const POSE_STD: f32 = 128.0;
const CROP_SCALE: f64 = 1.4;

pub struct HeadPoseRegressor {
    session: OrtSession,
}

impl HeadPoseRegressor {
    pub fn load(model_path: &Path) -> Result<Self, ModelLoadError> {
        Ok(Self {
            session: load_session(model_path, "pose_estimator")?,
        })
    }

    fn decode(raw: &[f32]) -> Result<Pose, StageError> {
        match raw {
            [yaw, pitch, roll, ..] if raw.iter().take(3).all(|v| v.is_finite()) => Ok(Pose {
                yaw: *yaw as f64,
                pitch: *pitch as f64,
                roll: *roll as f64,
            }),
            _ => Err(StageError::InvalidOutput(format!(
                "expected 3 finite angles, got {:?}",
                raw.iter().take(3).collect::<Vec<_>>()
            ))),
        }
    }
}

impl PoseEstimator for HeadPoseRegressor {
    fn estimate_pose(&mut self, session: &Session) -> Result<Pose, StageError> {
        let face = session
            .primary_face()
            .ok_or(StageError::MissingInput("detected face"))?;
        let roi = Roi::square_around(face, CROP_SCALE);
        let crop = crop_resize(&rgb_view(session.image())?, roi, POSE_INPUT_SIZE);
        let input = to_tensor(&crop, [2, 1, 0], |_, v| (v - POSE_MEAN) / POSE_STD);

        let raw = run_first_output(&mut self.session, &input)?;
        let pose = Self::decode(&raw)?;
        tracing::debug!(yaw = pose.yaw, pitch = pose.pitch, roll = pose.roll, "pose estimated");
        Ok(pose)
    }
}
