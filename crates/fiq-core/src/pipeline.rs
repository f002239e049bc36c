//! Preprocessing pipeline: populates a [`Session`] stage by stage and stops at
//! the first failure.

use crate::alignment::align_face;
use crate::capabilities::{Networks, StageError};
use crate::face_region::face_region_mask;
use crate::matrix::Matrix;
use crate::session::Session;
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FaceDetection,
    PoseEstimation,
    LandmarkExtraction,
    Alignment,
    FaceParsing,
    FaceOcclusion,
    FaceRegion,
}

impl Stage {
    pub const ORDER: [Stage; 7] = [
        Stage::FaceDetection,
        Stage::PoseEstimation,
        Stage::LandmarkExtraction,
        Stage::Alignment,
        Stage::FaceParsing,
        Stage::FaceOcclusion,
        Stage::FaceRegion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::FaceDetection => "face_detection",
            Stage::PoseEstimation => "pose_estimation",
            Stage::LandmarkExtraction => "landmark_extraction",
            Stage::Alignment => "alignment",
            Stage::FaceParsing => "face_parsing",
            Stage::FaceOcclusion => "face_occlusion",
            Stage::FaceRegion => "face_region",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    /// The stage that aborted the pipeline.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::NoFaceDetected => Stage::FaceDetection,
            PipelineError::Stage { stage, .. } => *stage,
        }
    }
}

fn timed<T>(stage: Stage, run: impl FnOnce() -> Result<T, StageError>) -> Result<T, PipelineError> {
    let start = Instant::now();
    let result = run();
    tracing::debug!(
        stage = %stage,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        ok = result.is_ok(),
        "stage finished"
    );
    result.map_err(|source| PipelineError::Stage { stage, source })
}

/// Run every stage against `session`.
///
/// On error the session keeps the artifacts of the stages that completed and
/// nothing from the failed stage onward.
pub fn preprocess(
    session: &mut Session,
    networks: &mut Networks,
    face_region_alpha: f64,
) -> Result<(), PipelineError> {
    let faces = timed(Stage::FaceDetection, || {
        networks.face_detector.detect_faces(session)
    })?;
    if faces.is_empty() {
        tracing::debug!("no face detected, aborting pipeline");
        return Err(PipelineError::NoFaceDetected);
    }
    session.set_detected_faces(faces);

    let pose = timed(Stage::PoseEstimation, || {
        networks.pose_estimator.estimate_pose(session)
    })?;
    session.set_pose(pose);

    let landmarks = timed(Stage::LandmarkExtraction, || {
        networks.landmark_extractor.extract_landmarks(session)
    })?;
    session.set_landmarks(landmarks);

    let alignment = timed(Stage::Alignment, || {
        let landmarks = session
            .landmarks()
            .ok_or(StageError::MissingInput("landmarks"))?;
        align_face(session.image(), landmarks)
    })?;
    session.set_alignment(alignment.face, alignment.landmarks, alignment.transform);

    let parsing = timed(Stage::FaceParsing, || {
        networks.face_parsing.extract_mask(session)
    })?;
    session.set_face_parsing_mask(parsing);

    let occlusion = timed(Stage::FaceOcclusion, || {
        networks.face_occlusion.extract_mask(session)
    })?;
    session.set_occlusion_mask(occlusion);

    let region = timed(Stage::FaceRegion, || {
        let landmarks = session
            .aligned_landmarks()
            .ok_or(StageError::MissingInput("aligned landmarks"))?;
        let (rows, cols, _) = session
            .aligned_face()
            .map(Matrix::dim)
            .ok_or(StageError::MissingInput("aligned face"))?;
        Ok(face_region_mask(landmarks, rows, cols, face_region_alpha))
    })?;
    session.set_face_region_mask(region);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::ALIGNED_SIZE;
    use crate::testing::{face_box, grey_image, networks, networks_failing_at};

    #[test]
    fn test_full_pipeline_populates_every_artifact() {
        let mut session = Session::new(grey_image(320, 320));
        let mut nets = networks(vec![face_box(80, 60, 160, 200)]);

        preprocess(&mut session, &mut nets, 0.0).unwrap();

        assert!(session.is_fully_preprocessed());
        assert_eq!(session.assessment().bounding_box, face_box(80, 60, 160, 200));
        assert_eq!(
            session.face_region_mask().map(Matrix::dim),
            Some((ALIGNED_SIZE, ALIGNED_SIZE, 1))
        );
        assert!(session.assessment().assessments.is_empty());
    }

    #[test]
    fn test_no_face_is_distinguished_abort() {
        let mut session = Session::new(grey_image(64, 64));
        let mut nets = networks(vec![]);

        let err = preprocess(&mut session, &mut nets, 0.0).unwrap_err();

        assert!(matches!(err, PipelineError::NoFaceDetected));
        assert_eq!(err.stage(), Stage::FaceDetection);
        assert!(session.detected_faces().is_none());
        assert!(session.pose().is_none());
    }

    #[test]
    fn test_failure_leaves_later_artifacts_unset() {
        let mut session = Session::new(grey_image(320, 320));
        let mut nets = networks_failing_at(vec![face_box(80, 60, 160, 200)], Stage::FaceParsing);

        let err = preprocess(&mut session, &mut nets, 0.0).unwrap_err();

        assert_eq!(err.stage(), Stage::FaceParsing);
        assert!(session.aligned_face().is_some());
        assert!(session.face_parsing_mask().is_none());
        assert!(session.occlusion_mask().is_none());
        assert!(session.face_region_mask().is_none());
        assert!(!session.is_fully_preprocessed());
    }

    #[test]
    fn test_each_model_stage_failure_is_reported_with_its_stage() {
        for stage in [
            Stage::FaceDetection,
            Stage::PoseEstimation,
            Stage::LandmarkExtraction,
            Stage::FaceOcclusion,
        ] {
            let mut session = Session::new(grey_image(320, 320));
            let mut nets = networks_failing_at(vec![face_box(80, 60, 160, 200)], stage);
            let err = preprocess(&mut session, &mut nets, 0.0).unwrap_err();
            assert_eq!(err.stage(), stage);
            assert!(matches!(err, PipelineError::Stage { .. }));
        }
    }

    #[test]
    fn test_alpha_shrinks_face_region() {
        let count = |alpha: f64| {
            let mut session = Session::new(grey_image(320, 320));
            let mut nets = networks(vec![face_box(80, 60, 160, 200)]);
            preprocess(&mut session, &mut nets, alpha).unwrap();
            match session.face_region_mask() {
                Some(Matrix::U8(m)) => m.iter().filter(|&&v| v == 1).count(),
                other => panic!("unexpected mask {other:?}"),
            }
        };
        let full = count(0.0);
        let shrunk = count(0.5);
        assert!(full > 0);
        assert!(shrunk < full);
    }
}
