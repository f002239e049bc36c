//! fiq-core: face image quality engine.
//!
//! A per-request [`Session`] is filled by the preprocessing pipeline (face
//! detection, pose, landmarks, alignment, segmentation masks), then scored by
//! the configured measures. When preprocessing stops early, every configured
//! measure is reported as not assessable.

pub mod aggregate;
pub mod alignment;
pub mod capabilities;
pub mod config;
pub mod detector;
pub mod engine;
pub mod executor;
pub mod face_region;
pub mod fallback;
pub mod imaging;
pub mod landmarks;
pub mod matrix;
pub mod measures;
pub mod onnx;
pub mod pipeline;
pub mod pose;
pub mod segmentation;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::scalar_quality;
pub use engine::{Assessment, EngineError, QualityEngine};
pub use matrix::{ElementDepth, Matrix};
pub use pipeline::{PipelineError, Stage};
pub use session::{ExposedSession, Session};
pub use types::{
    BoundingBox, FaceDetectorKind, FaceImageQualityAssessment, FaceLandmarks, Image, ImageError,
    LandmarkKind, LandmarkPoint, MeasureStatus, Pose, QualityAssessments, QualityMeasure,
    QualityMeasureResult, NOT_ASSESSABLE,
};
