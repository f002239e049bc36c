//! Built-in reference measures.

use crate::executor::{Measure, MeasureError};
use crate::matrix::Matrix;
use crate::session::Session;
use crate::types::{QualityMeasure, QualityMeasureResult, NOT_ASSESSABLE};

type Results = Vec<(QualityMeasure, QualityMeasureResult)>;

// WFLW pupil indices.
const LEFT_PUPIL: usize = 96;
const RIGHT_PUPIL: usize = 97;

/// Minimum inter-eye distance, in pixels, that scores 100.
const IED_FULL_SCORE_PX: f64 = 90.0;

/// Standard deviation of luma (0..1) at which the variance measure saturates.
const LUMA_STD_FULL_SCORE: f64 = 0.25;

/// Measures implemented by the engine itself.
pub fn builtin_measure(measure: QualityMeasure) -> Option<Box<dyn Measure>> {
    match measure {
        QualityMeasure::Luminance => Some(Box::new(Luminance)),
        QualityMeasure::HeadPose => Some(Box::new(HeadPose)),
        QualityMeasure::InterEyeDistance => Some(Box::new(InterEyeDistance)),
        QualityMeasure::SingleFacePresent => Some(Box::new(SingleFacePresent)),
        _ => None,
    }
}

/// Mean and variance of aligned-face luma inside the face region.
pub struct Luminance;

impl Luminance {
    fn luma_stats(face: &Matrix, region: &Matrix) -> Result<(f64, f64), MeasureError> {
        let (Matrix::U8(face), Matrix::U8(region)) = (face, region) else {
            return Err(MeasureError::Computation("aligned face and region must be u8".into()));
        };
        let (rows, cols, channels) = face.dim();
        if channels != 3 || region.dim() != (rows, cols, 1) {
            return Err(MeasureError::Computation(format!(
                "face {:?} and region {:?} disagree",
                face.dim(),
                region.dim()
            )));
        }

        let lumas: Vec<f64> = (0..rows)
            .flat_map(|y| (0..cols).map(move |x| (y, x)))
            .filter(|&(y, x)| region[[y, x, 0]] != 0)
            .map(|(y, x)| {
                // BGR
                let b = face[[y, x, 0]] as f64;
                let g = face[[y, x, 1]] as f64;
                let r = face[[y, x, 2]] as f64;
                (0.299 * r + 0.587 * g + 0.114 * b) / 255.0
            })
            .collect();

        if lumas.is_empty() {
            return Err(MeasureError::Computation("face region is empty".into()));
        }
        let n = lumas.len() as f64;
        let mean = lumas.iter().sum::<f64>() / n;
        let variance = lumas.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / n;
        Ok((mean, variance))
    }
}

impl Measure for Luminance {
    fn measure(&self) -> QualityMeasure {
        QualityMeasure::Luminance
    }

    fn execute(&self, session: &Session) -> Result<Results, MeasureError> {
        let face = session
            .aligned_face()
            .ok_or(MeasureError::MissingArtifact("aligned face"))?;
        let region = session
            .face_region_mask()
            .ok_or(MeasureError::MissingArtifact("face region mask"))?;
        let (mean, variance) = Self::luma_stats(face, region)?;

        let mean_scalar = (100.0 * (1.0 - 2.0 * (mean - 0.5).abs())).clamp(0.0, 100.0);
        let variance_scalar = (100.0 * variance.sqrt() / LUMA_STD_FULL_SCORE).min(100.0);
        Ok(vec![
            (
                QualityMeasure::LuminanceMean,
                QualityMeasureResult::success(mean, mean_scalar),
            ),
            (
                QualityMeasure::LuminanceVariance,
                QualityMeasureResult::success(variance, variance_scalar),
            ),
        ])
    }
}

/// Yaw, pitch and roll; each scores `100 * max(0, cos(angle))^2`.
pub struct HeadPose;

fn angle_scalar(degrees: f64) -> f64 {
    100.0 * degrees.to_radians().cos().max(0.0).powi(2)
}

/// An angle of exactly -1° would collide with the not-assessable value;
/// move it one step toward zero.
fn angle_raw(degrees: f64) -> f64 {
    if degrees == NOT_ASSESSABLE {
        NOT_ASSESSABLE + f64::EPSILON
    } else {
        degrees
    }
}

impl Measure for HeadPose {
    fn measure(&self) -> QualityMeasure {
        QualityMeasure::HeadPose
    }

    fn execute(&self, session: &Session) -> Result<Results, MeasureError> {
        let pose = session.pose().ok_or(MeasureError::MissingArtifact("pose"))?;
        Ok([
            (QualityMeasure::HeadPoseYaw, pose.yaw),
            (QualityMeasure::HeadPosePitch, pose.pitch),
            (QualityMeasure::HeadPoseRoll, pose.roll),
        ]
        .into_iter()
        .map(|(id, angle)| (id, QualityMeasureResult::success(angle_raw(angle), angle_scalar(angle))))
        .collect())
    }
}

/// Pupil distance in input-image pixels.
pub struct InterEyeDistance;

impl Measure for InterEyeDistance {
    fn measure(&self) -> QualityMeasure {
        QualityMeasure::InterEyeDistance
    }

    fn execute(&self, session: &Session) -> Result<Results, MeasureError> {
        let landmarks = session
            .landmarks()
            .ok_or(MeasureError::MissingArtifact("landmarks"))?;
        let (Some(left), Some(right)) = (
            landmarks.points.get(LEFT_PUPIL),
            landmarks.points.get(RIGHT_PUPIL),
        ) else {
            return Err(MeasureError::Computation(format!(
                "{} landmarks carry no pupils",
                landmarks.points.len()
            )));
        };

        let dx = right.x as f64 - left.x as f64;
        let dy = right.y as f64 - left.y as f64;
        let distance = dx.hypot(dy);
        let scalar = (100.0 * distance / IED_FULL_SCORE_PX).min(100.0);
        Ok(vec![(
            QualityMeasure::InterEyeDistance,
            QualityMeasureResult::success(distance, scalar),
        )])
    }
}

/// Share of the total detected face area taken by the primary face.
pub struct SingleFacePresent;

impl Measure for SingleFacePresent {
    fn measure(&self) -> QualityMeasure {
        QualityMeasure::SingleFacePresent
    }

    fn execute(&self, session: &Session) -> Result<Results, MeasureError> {
        let faces = session
            .detected_faces()
            .ok_or(MeasureError::MissingArtifact("detected faces"))?;
        let primary = faces
            .first()
            .ok_or(MeasureError::MissingArtifact("primary face"))?;

        let total: i64 = faces.iter().map(|f| f.area().max(0)).sum();
        if total == 0 {
            return Err(MeasureError::Computation("detected faces have no area".into()));
        }
        let ratio = primary.area().max(0) as f64 / total as f64;
        Ok(vec![(
            QualityMeasure::SingleFacePresent,
            QualityMeasureResult::success(ratio, 100.0 * ratio),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Networks;
    use crate::pipeline::preprocess;
    use crate::testing::{face_box, grey_image, networks};

    fn processed(mut nets: Networks) -> Session {
        let mut session = Session::new(grey_image(320, 320));
        preprocess(&mut session, &mut nets, 0.0).unwrap();
        session
    }

    fn result(results: &Results, id: QualityMeasure) -> QualityMeasureResult {
        results
            .iter()
            .find(|(m, _)| *m == id)
            .map(|(_, r)| *r)
            .unwrap()
    }

    #[test]
    fn test_builtin_lookup() {
        assert!(builtin_measure(QualityMeasure::Luminance).is_some());
        assert!(builtin_measure(QualityMeasure::Sharpness).is_none());
        for m in [
            QualityMeasure::Luminance,
            QualityMeasure::HeadPose,
            QualityMeasure::InterEyeDistance,
            QualityMeasure::SingleFacePresent,
        ] {
            assert_eq!(builtin_measure(m).map(|b| b.measure()), Some(m));
        }
    }

    #[test]
    fn test_luminance_of_uniform_grey_face() {
        let session = processed(networks(vec![face_box(80, 60, 160, 200)]));
        let results = Luminance.execute(&session).unwrap();

        let mean = result(&results, QualityMeasure::LuminanceMean);
        assert!((mean.raw_score - 128.0 / 255.0).abs() < 1e-3);
        assert!(mean.scalar > 95.0);

        // Region pixels all sample the grey source, so no spread.
        let variance = result(&results, QualityMeasure::LuminanceVariance);
        assert!(variance.raw_score < 1e-3);
    }

    #[test]
    fn test_luminance_without_artifacts_fails() {
        let session = Session::new(grey_image(4, 4));
        assert!(matches!(
            Luminance.execute(&session),
            Err(MeasureError::MissingArtifact(_))
        ));
    }

    #[test]
    fn test_head_pose_scalar_from_angles() {
        let session = processed(networks(vec![face_box(80, 60, 160, 200)]));
        let results = HeadPose.execute(&session).unwrap();
        assert_eq!(results.len(), 3);

        let yaw = result(&results, QualityMeasure::HeadPoseYaw);
        assert_eq!(yaw.raw_score, 5.0);
        assert!((yaw.scalar - angle_scalar(5.0)).abs() < 1e-9);
        assert_eq!(angle_scalar(0.0), 100.0);
        assert!(angle_scalar(120.0) < 1e-9);
    }

    #[test]
    fn test_minus_one_degree_is_not_the_sentinel() {
        let raw = angle_raw(-1.0);
        assert_ne!(raw, NOT_ASSESSABLE);
        assert!((raw + 1.0).abs() < 1e-12);
        assert_eq!(angle_raw(-1.5), -1.5);
        assert_eq!(angle_raw(0.0), 0.0);
    }

    #[test]
    fn test_single_face_ratio() {
        let session = processed(networks(vec![
            face_box(80, 60, 160, 200),
            face_box(0, 0, 40, 40),
        ]));
        let results = SingleFacePresent.execute(&session).unwrap();
        let r = result(&results, QualityMeasure::SingleFacePresent);
        let expected = 32000.0 / (32000.0 + 1600.0);
        assert!((r.raw_score - expected).abs() < 1e-9);
        assert!((r.scalar - 100.0 * expected).abs() < 1e-9);
    }

    #[test]
    fn test_inter_eye_distance_in_input_pixels() {
        let session = processed(networks(vec![face_box(80, 60, 160, 200)]));
        let results = InterEyeDistance.execute(&session).unwrap();
        let r = result(&results, QualityMeasure::InterEyeDistance);
        // Template pupils are ~97 canvas px apart; the box is 160/616 of that.
        assert!(r.raw_score > 20.0 && r.raw_score < 30.0);
        assert!(r.scalar > 0.0 && r.scalar < 100.0);
    }
}
