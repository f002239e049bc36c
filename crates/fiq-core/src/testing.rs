//! Capability fakes shared by the unit tests.

use crate::alignment::{template, ALIGNED_SIZE};
use crate::capabilities::{
    FaceDetector, LandmarkExtractor, Networks, PoseEstimator, SegmentationExtractor, StageError,
};
use crate::matrix::Matrix;
use crate::pipeline::Stage;
use crate::session::Session;
use crate::types::{
    BoundingBox, FaceDetectorKind, FaceLandmarks, Image, LandmarkKind, LandmarkPoint, Pose,
};

pub fn grey_image(width: u16, height: u16) -> Image {
    Image::from_rgb(width, height, vec![128; width as usize * height as usize * 3]).unwrap()
}

pub fn face_box(xleft: i16, ytop: i16, width: i16, height: i16) -> BoundingBox {
    BoundingBox {
        xleft,
        ytop,
        width,
        height,
        detector: FaceDetectorKind::OpenCvSsd,
    }
}

/// 98 plausible landmarks inside `face`: contour points on the inscribed
/// ellipse, alignment anchors at the template positions scaled into the box.
pub fn landmarks_for(face: &BoundingBox) -> FaceLandmarks {
    let (x0, y0) = (face.xleft as f64, face.ytop as f64);
    let (w, h) = (face.width as f64, face.height as f64);
    let mut points: Vec<LandmarkPoint> = (0..98)
        .map(|i| {
            let t = i as f64 / 98.0 * std::f64::consts::TAU;
            LandmarkPoint::new(
                (x0 + w / 2.0 + 0.45 * w * t.cos()).round() as i16,
                (y0 + h / 2.0 + 0.45 * h * t.sin()).round() as i16,
            )
        })
        .collect();

    let side = ALIGNED_SIZE as f64;
    for (idx, (tx, ty)) in [96, 97, 54, 76, 82].into_iter().zip(template()) {
        points[idx] = LandmarkPoint::new(
            (x0 + tx / side * w).round() as i16,
            (y0 + ty / side * h).round() as i16,
        );
    }

    FaceLandmarks {
        kind: LandmarkKind::Lm98,
        points,
    }
}

fn injected(stage: Stage) -> StageError {
    StageError::InferenceFailed(format!("injected {stage} failure"))
}

struct FakeDetector {
    faces: Vec<BoundingBox>,
    fail: bool,
}

impl FaceDetector for FakeDetector {
    fn detect_faces(&mut self, _session: &Session) -> Result<Vec<BoundingBox>, StageError> {
        if self.fail {
            return Err(injected(Stage::FaceDetection));
        }
        Ok(self.faces.clone())
    }
}

struct FakePose {
    fail: bool,
}

impl PoseEstimator for FakePose {
    fn estimate_pose(&mut self, _session: &Session) -> Result<Pose, StageError> {
        if self.fail {
            return Err(injected(Stage::PoseEstimation));
        }
        Ok(Pose {
            yaw: 5.0,
            pitch: -3.0,
            roll: 1.0,
        })
    }
}

struct FakeLandmarks {
    fail: bool,
}

impl LandmarkExtractor for FakeLandmarks {
    fn extract_landmarks(&mut self, session: &Session) -> Result<FaceLandmarks, StageError> {
        if self.fail {
            return Err(injected(Stage::LandmarkExtraction));
        }
        let face = session
            .primary_face()
            .ok_or(StageError::MissingInput("detected face"))?;
        Ok(landmarks_for(face))
    }
}

struct FakeMask {
    stage: Stage,
    value: u8,
    fail: bool,
}

impl SegmentationExtractor for FakeMask {
    fn extract_mask(&mut self, session: &Session) -> Result<Matrix, StageError> {
        if self.fail {
            return Err(injected(self.stage));
        }
        let (rows, cols, _) = session
            .aligned_face()
            .map(Matrix::dim)
            .ok_or(StageError::MissingInput("aligned face"))?;
        Matrix::mask(rows, cols, vec![self.value; rows * cols])
            .ok_or_else(|| StageError::InvalidOutput("mask size".into()))
    }
}

fn build(faces: Vec<BoundingBox>, fail_at: Option<Stage>) -> Networks {
    let fails = |stage| fail_at == Some(stage);
    Networks {
        face_detector: Box::new(FakeDetector {
            faces,
            fail: fails(Stage::FaceDetection),
        }),
        pose_estimator: Box::new(FakePose {
            fail: fails(Stage::PoseEstimation),
        }),
        landmark_extractor: Box::new(FakeLandmarks {
            fail: fails(Stage::LandmarkExtraction),
        }),
        face_parsing: Box::new(FakeMask {
            stage: Stage::FaceParsing,
            value: 1,
            fail: fails(Stage::FaceParsing),
        }),
        face_occlusion: Box::new(FakeMask {
            stage: Stage::FaceOcclusion,
            value: 1,
            fail: fails(Stage::FaceOcclusion),
        }),
    }
}

/// Networks that always succeed, detecting `faces`.
pub fn networks(faces: Vec<BoundingBox>) -> Networks {
    build(faces, None)
}

/// Networks whose capability for `stage` returns an error.
pub fn networks_failing_at(faces: Vec<BoundingBox>, stage: Stage) -> Networks {
    build(faces, Some(stage))
}
