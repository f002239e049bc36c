use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Bits per pixel of the RGB images the engine accepts.
pub const RGB_BIT_DEPTH: u8 = 24;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ImageError {
    #[error("image dimensions must be non-zero (got {width}x{height})")]
    EmptyImage { width: u16, height: u16 },
    #[error("pixel buffer has {actual} bytes, expected {expected} for a {width}x{height} RGB image")]
    BufferSize {
        width: u16,
        height: u16,
        expected: usize,
        actual: usize,
    },
}

/// Raw input pixels: row-major, interleaved R, G, B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u16,
    pub height: u16,
    pub depth: u8,
    pub data: Vec<u8>,
}

impl Image {
    /// Wrap an RGB buffer, checking that its length matches the dimensions.
    pub fn from_rgb(width: u16, height: u16, data: Vec<u8>) -> Result<Self, ImageError> {
        let image = Self {
            width,
            height,
            depth: RGB_BIT_DEPTH,
            data,
        };
        image.check_dimensions()?;
        Ok(image)
    }

    /// Non-zero size and a buffer of exactly `width * height * 3` bytes.
    pub fn check_dimensions(&self) -> Result<(), ImageError> {
        let (width, height) = (self.width, self.height);
        if width == 0 || height == 0 {
            return Err(ImageError::EmptyImage { width, height });
        }
        let expected = width as usize * height as usize * 3;
        if self.data.len() != expected {
            return Err(ImageError::BufferSize {
                width,
                height,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// RGB triple at `(x, y)`. Caller guarantees the coordinate is in bounds.
    pub fn rgb(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width as usize + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

/// Which detector implementation produced a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FaceDetectorKind {
    OpenCvSsd,
    #[default]
    NotSet,
}

impl FaceDetectorKind {
    pub fn code(self) -> u8 {
        match self {
            Self::OpenCvSsd => 0,
            Self::NotSet => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::OpenCvSsd),
            1 => Some(Self::NotSet),
            _ => None,
        }
    }
}

/// A detected face region in input-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xleft: i16,
    pub ytop: i16,
    pub width: i16,
    pub height: i16,
    pub detector: FaceDetectorKind,
}

impl BoundingBox {
    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }
}

/// Landmark scheme of a [`FaceLandmarks`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LandmarkKind {
    /// 98-point WFLW layout (ADNet).
    Lm98,
    #[default]
    NotSet,
}

impl LandmarkKind {
    pub fn code(self) -> u8 {
        match self {
            Self::Lm98 => 0,
            Self::NotSet => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Lm98),
            1 => Some(Self::NotSet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: i16,
    pub y: i16,
}

impl LandmarkPoint {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub kind: LandmarkKind,
    pub points: Vec<LandmarkPoint>,
}

/// Head orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

macro_rules! quality_measures {
    ($($(#[$doc:meta])* $name:ident = $id:expr),* $(,)?) => {
        /// Quality measure identifiers, with their wire ids.
        ///
        /// Negative ids are composite measures that never appear bare in an
        /// assessment; see [`QualityMeasure::expand`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum QualityMeasure {
            $($(#[$doc])* $name,)*
        }

        impl QualityMeasure {
            pub const ALL: &'static [QualityMeasure] = &[$(QualityMeasure::$name,)*];

            pub fn id(self) -> i16 {
                match self {
                    $(QualityMeasure::$name => $id,)*
                }
            }

            pub fn from_id(id: i16) -> Option<Self> {
                match id {
                    $(x if x == $id => Some(QualityMeasure::$name),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(QualityMeasure::$name => stringify!($name),)*
                }
            }
        }
    };
}

quality_measures! {
    UnifiedQualityScore = 0x41,
    BackgroundUniformity = 0x42,
    IlluminationUniformity = 0x43,
    /// Composite: LuminanceMean, LuminanceVariance.
    Luminance = -0x44,
    LuminanceMean = 0x44,
    LuminanceVariance = 0x45,
    UnderExposurePrevention = 0x46,
    OverExposurePrevention = 0x47,
    DynamicRange = 0x48,
    Sharpness = 0x49,
    CompressionArtifacts = 0x4a,
    NaturalColour = 0x4b,
    SingleFacePresent = 0x4c,
    EyesOpen = 0x4d,
    MouthClosed = 0x4e,
    EyesVisible = 0x4f,
    MouthOcclusionPrevention = 0x50,
    FaceOcclusionPrevention = 0x51,
    InterEyeDistance = 0x52,
    HeadSize = 0x53,
    /// Composite: leftward/rightward crop and margins below/above.
    CropOfTheFaceImage = -0x54,
    LeftwardCropOfTheFaceImage = 0x54,
    RightwardCropOfTheFaceImage = 0x55,
    MarginBelowOfTheFaceImage = 0x56,
    MarginAboveOfTheFaceImage = 0x57,
    /// Composite: yaw, pitch, roll.
    HeadPose = -0x58,
    HeadPoseYaw = 0x58,
    HeadPosePitch = 0x59,
    HeadPoseRoll = 0x5a,
    ExpressionNeutrality = 0x5b,
    NoHeadCoverings = 0x5c,
    NotSet = -1,
}

impl QualityMeasure {
    /// The measures reported for this configured measure.
    ///
    /// Composite measures expand to their sub-measures; every other measure
    /// reports under its own id.
    pub fn expand(self) -> &'static [QualityMeasure] {
        use QualityMeasure::*;
        match self {
            Luminance => &[LuminanceMean, LuminanceVariance],
            CropOfTheFaceImage => &[
                LeftwardCropOfTheFaceImage,
                RightwardCropOfTheFaceImage,
                MarginBelowOfTheFaceImage,
                MarginAboveOfTheFaceImage,
            ],
            HeadPose => &[HeadPoseYaw, HeadPosePitch, HeadPoseRoll],
            UnifiedQualityScore => &[UnifiedQualityScore],
            BackgroundUniformity => &[BackgroundUniformity],
            IlluminationUniformity => &[IlluminationUniformity],
            LuminanceMean => &[LuminanceMean],
            LuminanceVariance => &[LuminanceVariance],
            UnderExposurePrevention => &[UnderExposurePrevention],
            OverExposurePrevention => &[OverExposurePrevention],
            DynamicRange => &[DynamicRange],
            Sharpness => &[Sharpness],
            CompressionArtifacts => &[CompressionArtifacts],
            NaturalColour => &[NaturalColour],
            SingleFacePresent => &[SingleFacePresent],
            EyesOpen => &[EyesOpen],
            MouthClosed => &[MouthClosed],
            EyesVisible => &[EyesVisible],
            MouthOcclusionPrevention => &[MouthOcclusionPrevention],
            FaceOcclusionPrevention => &[FaceOcclusionPrevention],
            InterEyeDistance => &[InterEyeDistance],
            HeadSize => &[HeadSize],
            LeftwardCropOfTheFaceImage => &[LeftwardCropOfTheFaceImage],
            RightwardCropOfTheFaceImage => &[RightwardCropOfTheFaceImage],
            MarginBelowOfTheFaceImage => &[MarginBelowOfTheFaceImage],
            MarginAboveOfTheFaceImage => &[MarginAboveOfTheFaceImage],
            HeadPoseYaw => &[HeadPoseYaw],
            HeadPosePitch => &[HeadPosePitch],
            HeadPoseRoll => &[HeadPoseRoll],
            ExpressionNeutrality => &[ExpressionNeutrality],
            NoHeadCoverings => &[NoHeadCoverings],
            NotSet => &[NotSet],
        }
    }
}

impl std::fmt::Display for QualityMeasure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a single measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeasureStatus {
    #[default]
    Success,
    FailureToAssess,
    NotInitialized,
}

impl MeasureStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::FailureToAssess => 1,
            Self::NotInitialized => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::FailureToAssess),
            2 => Some(Self::NotInitialized),
            _ => None,
        }
    }
}

/// Reserved "not assessable" value for raw and scalar scores.
pub const NOT_ASSESSABLE: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMeasureResult {
    pub raw_score: f64,
    /// Normalized to [0, 100], or [`NOT_ASSESSABLE`].
    pub scalar: f64,
    pub status: MeasureStatus,
}

impl QualityMeasureResult {
    pub fn success(raw_score: f64, scalar: f64) -> Self {
        Self {
            raw_score,
            scalar,
            status: MeasureStatus::Success,
        }
    }

    pub fn failure_to_assess() -> Self {
        Self {
            raw_score: NOT_ASSESSABLE,
            scalar: NOT_ASSESSABLE,
            status: MeasureStatus::FailureToAssess,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == MeasureStatus::Success
    }
}

/// Measure id → result. Ordered by measure so encodings are deterministic.
pub type QualityAssessments = BTreeMap<QualityMeasure, QualityMeasureResult>;

/// Everything the engine reports for one image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceImageQualityAssessment {
    /// Primary face, or the default box when detection never succeeded.
    pub bounding_box: BoundingBox,
    pub assessments: QualityAssessments,
}
