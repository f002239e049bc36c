//! Engine configuration file (TOML).

use crate::types::QualityMeasure;
use fiq_models::ModelSpec;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown quality measure '{0}'")]
    UnknownMeasure(String),
    #[error("quality measure {0} has no implementation")]
    UnsupportedMeasure(QualityMeasure),
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelEntry {
    /// Relative to the configuration directory unless absolute.
    pub path: PathBuf,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    pub face_detector: ModelEntry,
    pub pose_estimator: ModelEntry,
    pub landmark_extractor: ModelEntry,
    pub face_parsing: ModelEntry,
    pub face_occlusion: ModelEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    pub confidence_threshold: f32,
    pub min_face_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.4,
            min_face_size: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeasuresConfig {
    /// Measure names as in [`QualityMeasure::name`].
    pub enabled: Vec<String>,
}

impl Default for MeasuresConfig {
    fn default() -> Self {
        Self {
            enabled: [
                QualityMeasure::Luminance,
                QualityMeasure::HeadPose,
                QualityMeasure::InterEyeDistance,
                QualityMeasure::SingleFacePresent,
            ]
            .iter()
            .map(|m| m.name().to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaceRegionParams {
    /// Shrink factor of the landmark hull toward its centroid, in `[0, 1)`.
    pub alpha: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParamsConfig {
    pub face_region: FaceRegionParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub models: ModelsConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub measures: MeasuresConfig,
    #[serde(default)]
    pub params: ParamsConfig,
}

impl EngineConfig {
    /// Read and validate `config_dir/config_file`.
    pub fn load(config_dir: &Path, config_file: &str) -> Result<Self, ConfigError> {
        let path = config_dir.join(config_file);
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "engine configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let alpha = self.params.face_region.alpha;
        if !(0.0..1.0).contains(&alpha) {
            return Err(ConfigError::InvalidParameter {
                name: "params.face_region.alpha",
                reason: format!("{alpha} is outside [0, 1)"),
            });
        }
        let threshold = self.detector.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidParameter {
                name: "detector.confidence_threshold",
                reason: format!("{threshold} is outside [0, 1]"),
            });
        }
        self.enabled_measures().map(|_| ())
    }

    /// Enabled measures in configuration order, duplicates dropped.
    pub fn enabled_measures(&self) -> Result<Vec<QualityMeasure>, ConfigError> {
        let mut measures = Vec::with_capacity(self.measures.enabled.len());
        for name in &self.measures.enabled {
            let measure = QualityMeasure::ALL
                .iter()
                .copied()
                .find(|m| m.name().eq_ignore_ascii_case(name) && *m != QualityMeasure::NotSet)
                .ok_or_else(|| ConfigError::UnknownMeasure(name.clone()))?;
            if !measures.contains(&measure) {
                measures.push(measure);
            }
        }
        Ok(measures)
    }

    /// Model files with their expected digests, in pipeline order.
    pub fn model_manifest(&self) -> Vec<ModelSpec> {
        let m = &self.models;
        [
            ("face_detector", &m.face_detector),
            ("pose_estimator", &m.pose_estimator),
            ("landmark_extractor", &m.landmark_extractor),
            ("face_parsing", &m.face_parsing),
            ("face_occlusion", &m.face_occlusion),
        ]
        .into_iter()
        .map(|(name, entry)| {
            let spec = ModelSpec::new(name, entry.path.clone());
            match &entry.sha256 {
                Some(digest) => spec.with_sha256(digest.clone()),
                None => spec,
            }
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[models]
face_detector = { path = "models/ssd.onnx", sha256 = "abc" }
pose_estimator = { path = "models/pose.onnx" }
landmark_extractor = { path = "models/lm.onnx" }
face_parsing = { path = "models/parse.onnx" }
face_occlusion = { path = "/abs/occ.onnx" }
"#;

    #[test]
    fn test_defaults_applied() {
        let config = EngineConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.detector.confidence_threshold, 0.4);
        assert_eq!(config.detector.min_face_size, 16);
        assert_eq!(config.params.face_region.alpha, 0.0);
        assert_eq!(
            config.enabled_measures().unwrap(),
            vec![
                QualityMeasure::Luminance,
                QualityMeasure::HeadPose,
                QualityMeasure::InterEyeDistance,
                QualityMeasure::SingleFacePresent,
            ]
        );
    }

    #[test]
    fn test_manifest_resolves_relative_paths() {
        let config = EngineConfig::from_toml_str(MINIMAL).unwrap();
        let manifest = config.model_manifest();
        assert_eq!(manifest.len(), 5);
        assert_eq!(manifest[0].name, "face_detector");
        assert_eq!(manifest[0].sha256.as_deref(), Some("abc"));
        assert_eq!(
            manifest[0].resolved(Path::new("/etc/fiq")),
            PathBuf::from("/etc/fiq/models/ssd.onnx")
        );
        assert_eq!(
            manifest[4].resolved(Path::new("/etc/fiq")),
            PathBuf::from("/abs/occ.onnx")
        );
    }

    #[test]
    fn test_measure_names_parse_case_insensitively_and_dedup() {
        let text = format!(
            "{MINIMAL}\n[measures]\nenabled = [\"headpose\", \"Sharpness\", \"HeadPose\"]\n"
        );
        let config = EngineConfig::from_toml_str(&text).unwrap();
        assert_eq!(
            config.enabled_measures().unwrap(),
            vec![QualityMeasure::HeadPose, QualityMeasure::Sharpness]
        );
    }

    #[test]
    fn test_unknown_measure_rejected() {
        let text = format!("{MINIMAL}\n[measures]\nenabled = [\"Charisma\"]\n");
        let err = EngineConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMeasure(name) if name == "Charisma"));
    }

    #[test]
    fn test_alpha_out_of_range_rejected() {
        let text = format!("{MINIMAL}\n[params.face_region]\nalpha = 1.5\n");
        assert!(matches!(
            EngineConfig::from_toml_str(&text),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_missing_models_section_is_parse_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("[detector]\nmin_face_size = 8\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = std::env::temp_dir().join(format!("fiq-config-missing-{}", std::process::id()));
        let err = EngineConfig::load(&dir, "nope.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
