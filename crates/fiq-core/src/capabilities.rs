//! Capability interfaces consumed by the preprocessing pipeline.
//!
//! Each model-backed stage is a trait taking the session read-only and
//! returning its artifact; the pipeline decides where the artifact is stored.
//! The ONNX implementations live in [`crate::detector`], [`crate::landmarks`],
//! [`crate::pose`] and [`crate::segmentation`].

use crate::matrix::Matrix;
use crate::session::Session;
use crate::types::{BoundingBox, FaceLandmarks, Pose};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("required input missing: {0}")]
    MissingInput(&'static str),
    #[error("unusable input: {0}")]
    InvalidInput(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("unexpected model output: {0}")]
    InvalidOutput(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub trait FaceDetector {
    /// Detect faces in the session image, largest face first. An empty result
    /// is not an error here; the pipeline turns it into an abort.
    fn detect_faces(&mut self, session: &Session) -> Result<Vec<BoundingBox>, StageError>;
}

pub trait PoseEstimator {
    fn estimate_pose(&mut self, session: &Session) -> Result<Pose, StageError>;
}

pub trait LandmarkExtractor {
    fn extract_landmarks(&mut self, session: &Session) -> Result<FaceLandmarks, StageError>;
}

pub trait SegmentationExtractor {
    /// Per-pixel mask in aligned-face coordinates.
    fn extract_mask(&mut self, session: &Session) -> Result<Matrix, StageError>;
}

/// The set of model-backed capabilities the pipeline runs.
pub struct Networks {
    pub face_detector: Box<dyn FaceDetector + Send>,
    pub pose_estimator: Box<dyn PoseEstimator + Send>,
    pub landmark_extractor: Box<dyn LandmarkExtractor + Send>,
    pub face_parsing: Box<dyn SegmentationExtractor + Send>,
    pub face_occlusion: Box<dyn SegmentationExtractor + Send>,
}
