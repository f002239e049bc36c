use crate::capabilities::Networks;
use crate::config::{ConfigError, EngineConfig, ModelEntry};
use crate::detector::SsdFaceDetector;
use crate::executor::{Executor, Measure};
use crate::fallback::apply_fallback;
use crate::landmarks::AdnetLandmarkExtractor;
use crate::measures::builtin_measure;
use crate::onnx::ModelLoadError;
use crate::pipeline::{preprocess, PipelineError};
use crate::pose::HeadPoseRegressor;
use crate::segmentation::{FaceParsingSegmenter, OcclusionSegmenter};
use crate::session::{ExposedSession, Session};
use crate::types::{FaceImageQualityAssessment, Image, ImageError, RGB_BIT_DEPTH};
use fiq_models::{verify_manifest, ModelIntegrityError};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("model integrity error: {0}")]
    ModelIntegrity(#[from] ModelIntegrityError),
    #[error("failed to load {name} model: {source}")]
    ModelLoad {
        name: &'static str,
        #[source]
        source: ModelLoadError,
    },
    #[error("unsupported image depth {0}, expected 24-bit RGB")]
    UnsupportedImage(u8),
    #[error("invalid image: {0}")]
    InvalidImage(#[from] ImageError),
}

/// Outcome of assessing one image.
#[derive(Debug)]
pub struct Assessment {
    pub result: FaceImageQualityAssessment,
    /// Why preprocessing stopped, when it did; `result` then holds the
    /// fallback entries.
    pub aborted: Option<PipelineError>,
}

impl Assessment {
    /// Whether preprocessing completed and the measures actually ran.
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }
}

/// Preprocessing networks plus the configured measures.
pub struct QualityEngine {
    networks: Networks,
    executor: Executor,
    face_region_alpha: f64,
}

impl QualityEngine {
    /// Load `config_dir/config_file`, verify the model files, load the models
    /// and build the measure executor.
    pub fn initialize(config_dir: &Path, config_file: &str) -> Result<Self, EngineError> {
        let config = EngineConfig::load(config_dir, config_file)?;

        let measures = config
            .enabled_measures()?
            .into_iter()
            .map(|m| builtin_measure(m).ok_or(ConfigError::UnsupportedMeasure(m)))
            .collect::<Result<Vec<Box<dyn Measure>>, _>>()?;
        let executor = Executor::new(measures);

        let manifest = config.model_manifest();
        verify_manifest(config_dir, &manifest)?;
        tracing::info!(count = manifest.len(), "model files verified");

        let models = &config.models;
        // Absolute entries replace the base on join.
        let path = |entry: &ModelEntry| config_dir.join(&entry.path);
        let load_err =
            |name: &'static str| move |source: ModelLoadError| EngineError::ModelLoad { name, source };

        let networks = Networks {
            face_detector: Box::new(
                SsdFaceDetector::load(
                    &path(&models.face_detector),
                    config.detector.confidence_threshold,
                    config.detector.min_face_size,
                )
                .map_err(load_err("face_detector"))?,
            ),
            pose_estimator: Box::new(
                HeadPoseRegressor::load(&path(&models.pose_estimator))
                    .map_err(load_err("pose_estimator"))?,
            ),
            landmark_extractor: Box::new(
                AdnetLandmarkExtractor::load(&path(&models.landmark_extractor))
                    .map_err(load_err("landmark_extractor"))?,
            ),
            face_parsing: Box::new(
                FaceParsingSegmenter::load(&path(&models.face_parsing))
                    .map_err(load_err("face_parsing"))?,
            ),
            face_occlusion: Box::new(
                OcclusionSegmenter::load(&path(&models.face_occlusion))
                    .map_err(load_err("face_occlusion"))?,
            ),
        };

        tracing::info!(
            measures = ?executor.configured_measures(),
            alpha = config.params.face_region.alpha,
            "quality engine initialized"
        );

        Ok(Self::from_parts(
            networks,
            executor,
            config.params.face_region.alpha,
        ))
    }

    /// Assemble an engine from already-built capabilities.
    pub fn from_parts(networks: Networks, executor: Executor, face_region_alpha: f64) -> Self {
        Self {
            networks,
            executor,
            face_region_alpha,
        }
    }

    /// Engine version as `(major, minor, patch)`.
    pub fn version() -> (u32, u32, u32) {
        let part = |s: &str| s.parse().unwrap_or(0);
        (
            part(env!("CARGO_PKG_VERSION_MAJOR")),
            part(env!("CARGO_PKG_VERSION_MINOR")),
            part(env!("CARGO_PKG_VERSION_PATCH")),
        )
    }

    /// Assess one image. A failed preprocessing stage is not an error: the
    /// result carries failure entries for every configured measure.
    pub fn assess(&mut self, image: Image) -> Result<Assessment, EngineError> {
        let (session, aborted) = self.run(image)?;
        Ok(Assessment {
            result: session.into_assessment(),
            aborted,
        })
    }

    /// Like [`assess`](Self::assess), also handing back the processed session.
    pub fn assess_exposing_session(
        &mut self,
        image: Image,
    ) -> Result<(Assessment, ExposedSession), EngineError> {
        let (session, aborted) = self.run(image)?;
        let assessment = Assessment {
            result: session.assessment().clone(),
            aborted,
        };
        Ok((assessment, ExposedSession::new(session)))
    }

    fn run(&mut self, image: Image) -> Result<(Session, Option<PipelineError>), EngineError> {
        if image.depth != RGB_BIT_DEPTH {
            return Err(EngineError::UnsupportedImage(image.depth));
        }
        image.check_dimensions()?;
        let (width, height) = (image.width, image.height);
        let start = Instant::now();

        let mut session = Session::new(image);
        let aborted = match preprocess(&mut session, &mut self.networks, self.face_region_alpha) {
            Ok(()) => {
                self.executor.execute_all(&mut session);
                None
            }
            Err(e) => {
                let configured = self.executor.configured_measures();
                apply_fallback(session.assessments_mut(), &configured, &e);
                Some(e)
            }
        };

        tracing::info!(
            width,
            height,
            faces = session.detected_faces().map_or(0, |f| f.len()),
            measures = session.assessment().assessments.len(),
            complete = aborted.is_none(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "image assessed"
        );

        Ok((session, aborted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::scalar_quality;
    use crate::pipeline::Stage;
    use crate::testing::{face_box, grey_image, networks, networks_failing_at};
    use crate::types::{MeasureStatus, QualityMeasure, NOT_ASSESSABLE};
    use std::collections::BTreeSet;

    fn engine(nets: Networks) -> QualityEngine {
        let measures = [
            QualityMeasure::Luminance,
            QualityMeasure::HeadPose,
            QualityMeasure::InterEyeDistance,
            QualityMeasure::SingleFacePresent,
        ]
        .into_iter()
        .filter_map(builtin_measure)
        .collect();
        QualityEngine::from_parts(nets, Executor::new(measures), 0.0)
    }

    fn expanded_keys() -> BTreeSet<QualityMeasure> {
        use QualityMeasure::*;
        [
            LuminanceMean,
            LuminanceVariance,
            HeadPoseYaw,
            HeadPosePitch,
            HeadPoseRoll,
            InterEyeDistance,
            SingleFacePresent,
        ]
        .into_iter()
        .collect()
    }

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("fiq-engine-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_zero_faces_yields_full_fallback() {
        let mut engine = engine(networks(vec![]));
        let outcome = engine.assess(grey_image(64, 64)).unwrap();

        assert!(!outcome.is_complete());
        assert!(matches!(outcome.aborted, Some(PipelineError::NoFaceDetected)));
        let keys: BTreeSet<_> = outcome.result.assessments.keys().copied().collect();
        assert_eq!(keys, expanded_keys());
        for r in outcome.result.assessments.values() {
            assert_eq!(r.raw_score, NOT_ASSESSABLE);
            assert_eq!(r.scalar, NOT_ASSESSABLE);
            assert_eq!(r.status, MeasureStatus::FailureToAssess);
        }
        assert_eq!(scalar_quality(&outcome.result.assessments), 0.0);
    }

    #[test]
    fn test_successful_assessment_runs_every_measure() {
        let mut engine = engine(networks(vec![face_box(80, 60, 160, 200)]));
        let outcome = engine.assess(grey_image(320, 320)).unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.result.bounding_box, face_box(80, 60, 160, 200));
        let keys: BTreeSet<_> = outcome.result.assessments.keys().copied().collect();
        assert_eq!(keys, expanded_keys());
        assert!(outcome.result.assessments.values().all(|r| r.is_success()));
    }

    #[test]
    fn test_assessment_is_deterministic() {
        let mut engine = engine(networks(vec![face_box(80, 60, 160, 200)]));
        let a = engine.assess(grey_image(320, 320)).unwrap();
        let b = engine.assess(grey_image(320, 320)).unwrap();
        assert_eq!(a.result, b.result);
    }

    #[test]
    fn test_stage_failure_keeps_primary_box_and_falls_back() {
        let mut engine = engine(networks_failing_at(
            vec![face_box(80, 60, 160, 200)],
            Stage::FaceOcclusion,
        ));
        let outcome = engine.assess(grey_image(320, 320)).unwrap();

        assert_eq!(outcome.aborted.as_ref().map(|e| e.stage()), Some(Stage::FaceOcclusion));
        assert_eq!(outcome.result.bounding_box, face_box(80, 60, 160, 200));
        assert!(outcome.result.assessments.values().all(|r| !r.is_success()));
    }

    #[test]
    fn test_exposed_session_carries_artifacts() {
        let mut engine = engine(networks(vec![face_box(80, 60, 160, 200)]));
        let (outcome, exposed) = engine.assess_exposing_session(grey_image(320, 320)).unwrap();

        assert!(outcome.is_complete());
        assert!(exposed.is_fully_preprocessed());
        assert_eq!(exposed.detected_faces().map(|f| f.len()), Some(1));
        exposed.dispose();
    }

    #[test]
    fn test_rejects_non_rgb_depth() {
        let mut engine = engine(networks(vec![]));
        let mut image = grey_image(2, 2);
        image.depth = 8;
        assert!(matches!(
            engine.assess(image),
            Err(EngineError::UnsupportedImage(8))
        ));
    }

    #[test]
    fn test_rejects_buffer_not_matching_dimensions() {
        let mut engine = engine(networks(vec![face_box(2, 2, 6, 6)]));
        let short = Image {
            width: 10,
            height: 10,
            depth: RGB_BIT_DEPTH,
            data: vec![0; 3],
        };
        assert!(matches!(
            engine.assess(short),
            Err(EngineError::InvalidImage(ImageError::BufferSize {
                expected: 300,
                actual: 3,
                ..
            }))
        ));

        let empty = Image {
            width: 0,
            height: 4,
            depth: RGB_BIT_DEPTH,
            data: Vec::new(),
        };
        assert!(matches!(
            engine.assess_exposing_session(empty),
            Err(EngineError::InvalidImage(ImageError::EmptyImage { .. }))
        ));
    }

    #[test]
    fn test_version_matches_package() {
        let (major, minor, patch) = QualityEngine::version();
        assert_eq!(
            format!("{major}.{minor}.{patch}"),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_initialize_missing_config() {
        let dir = temp_dir("noconfig");
        assert!(matches!(
            QualityEngine::initialize(&dir, "absent.toml"),
            Err(EngineError::Config(ConfigError::Read { .. }))
        ));
    }

    #[test]
    fn test_initialize_missing_model_file() {
        let dir = temp_dir("nomodel");
        std::fs::write(
            dir.join("fiq_config.toml"),
            r#"
[models]
face_detector = { path = "missing/ssd.onnx" }
pose_estimator = { path = "missing/pose.onnx" }
landmark_extractor = { path = "missing/lm.onnx" }
face_parsing = { path = "missing/parse.onnx" }
face_occlusion = { path = "missing/occ.onnx" }
"#,
        )
        .unwrap();

        let err = QualityEngine::initialize(&dir, "fiq_config.toml").err().unwrap();
        assert!(matches!(
            err,
            EngineError::ModelIntegrity(ModelIntegrityError::MissingModel { ref name, .. })
                if name == "face_detector"
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_initialize_checksum_mismatch() {
        let dir = temp_dir("badsum");
        for f in ["ssd", "pose", "lm", "parse", "occ"] {
            std::fs::write(dir.join(format!("{f}.onnx")), b"not a model").unwrap();
        }
        std::fs::write(
            dir.join("fiq_config.toml"),
            r#"
[models]
face_detector = { path = "ssd.onnx" }
pose_estimator = { path = "pose.onnx", sha256 = "00" }
landmark_extractor = { path = "lm.onnx" }
face_parsing = { path = "parse.onnx" }
face_occlusion = { path = "occ.onnx" }
"#,
        )
        .unwrap();

        let err = QualityEngine::initialize(&dir, "fiq_config.toml").err().unwrap();
        assert!(matches!(
            err,
            EngineError::ModelIntegrity(ModelIntegrityError::ChecksumMismatch { .. })
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_initialize_rejects_measure_without_implementation() {
        let dir = temp_dir("unsupported");
        std::fs::write(
            dir.join("fiq_config.toml"),
            r#"
[models]
face_detector = { path = "ssd.onnx" }
pose_estimator = { path = "pose.onnx" }
landmark_extractor = { path = "lm.onnx" }
face_parsing = { path = "parse.onnx" }
face_occlusion = { path = "occ.onnx" }

[measures]
enabled = ["HeadPose", "Sharpness"]
"#,
        )
        .unwrap();

        let err = QualityEngine::initialize(&dir, "fiq_config.toml").err().unwrap();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::UnsupportedMeasure(QualityMeasure::Sharpness))
        ));
        std::fs::remove_dir_all(&dir).ok();
    }
}
