//! Request and reply messages of the fiq request/reply protocol.
//!
//! Every message starts with the header written by
//! [`Writer::write_header`]: the format version and a command code.

use crate::codec::{DecodeError, Reader, Writer};
use fiq_core::{
    BoundingBox, ExposedSession, FaceImageQualityAssessment, FaceLandmarks, Image, Matrix, Pose,
    QualityAssessments,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Shutdown,
    ProcessImage,
    ErrorNotify,
    Unrecognized(u8),
}

impl Command {
    pub fn code(self) -> u8 {
        match self {
            Command::Ping => 0,
            Command::Shutdown => 1,
            Command::ProcessImage => 2,
            Command::ErrorNotify => 255,
            Command::Unrecognized(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Command::Ping,
            1 => Command::Shutdown,
            2 => Command::ProcessImage,
            255 => Command::ErrorNotify,
            other => Command::Unrecognized(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ping,
    Shutdown,
    ProcessImage { image_id: u32, image: Image },
    ErrorNotify,
    /// Valid header with a command this server does not handle.
    Unrecognized(u8),
}

impl Request {
    pub fn command(&self) -> Command {
        match self {
            Request::Ping => Command::Ping,
            Request::Shutdown => Command::Shutdown,
            Request::ProcessImage { .. } => Command::ProcessImage,
            Request::ErrorNotify => Command::ErrorNotify,
            Request::Unrecognized(code) => Command::Unrecognized(*code),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let request = match Command::from_code(r.read_header()?) {
            Command::Ping => Request::Ping,
            Command::Shutdown => Request::Shutdown,
            Command::ErrorNotify => Request::ErrorNotify,
            Command::ProcessImage => {
                let image_id: u32 = r.read()?;
                let width: u16 = r.read()?;
                let height: u16 = r.read()?;
                let pixels = r.read_bytes(width as usize * height as usize * 3)?;
                let image = Image::from_rgb(width, height, pixels.to_vec())
                    .map_err(|e| DecodeError::InvalidDimensions(e.to_string()))?;
                Request::ProcessImage { image_id, image }
            }
            // Body layout unknown, nothing to check.
            Command::Unrecognized(code) => return Ok(Request::Unrecognized(code)),
        };
        r.check_end();
        Ok(request)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_header(self.command().code());
        if let Request::ProcessImage { image_id, image } = self {
            w.write(*image_id);
            w.write(image.width);
            w.write(image.height);
            w.write_bytes(&image.data);
        }
        w.into_bytes()
    }
}

/// Everything a successful ProcessImage reply carries after the flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessImageResult {
    pub bounding_box: BoundingBox,
    pub assessments: QualityAssessments,
    pub detected_faces: Vec<BoundingBox>,
    pub pose: Pose,
    pub landmarks: FaceLandmarks,
    pub aligned_landmarks: FaceLandmarks,
    pub transformation_matrix: Option<Matrix>,
    pub aligned_face: Option<Matrix>,
    pub face_region_mask: Option<Matrix>,
    pub face_parsing_mask: Option<Matrix>,
    pub occlusion_mask: Option<Matrix>,
}

impl ProcessImageResult {
    /// Collect the reply payload; `None` unless every non-matrix artifact
    /// is present.
    pub fn from_session(
        assessment: &FaceImageQualityAssessment,
        session: &ExposedSession,
    ) -> Option<Self> {
        Some(Self {
            bounding_box: assessment.bounding_box,
            assessments: assessment.assessments.clone(),
            detected_faces: session.detected_faces()?.to_vec(),
            pose: *session.pose()?,
            landmarks: session.landmarks()?.clone(),
            aligned_landmarks: session.aligned_landmarks()?.clone(),
            transformation_matrix: session.transformation_matrix().cloned(),
            aligned_face: session.aligned_face().cloned(),
            face_region_mask: session.face_region_mask().cloned(),
            face_parsing_mask: session.face_parsing_mask().cloned(),
            occlusion_mask: session.occlusion_mask().cloned(),
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_bounding_box(&self.bounding_box);

        w.write(self.assessments.len() as u16);
        for (measure, result) in &self.assessments {
            w.write_measure(*measure, result);
        }

        w.write(self.detected_faces.len() as u16);
        for face in &self.detected_faces {
            w.write_bounding_box(face);
        }

        w.write(self.pose.yaw);
        w.write(self.pose.pitch);
        w.write(self.pose.roll);

        w.write_landmarks(&self.landmarks);
        w.write_landmarks(&self.aligned_landmarks);

        w.write_optional_matrix(self.transformation_matrix.as_ref());
        w.write_optional_matrix(self.aligned_face.as_ref());
        w.write_optional_matrix(self.face_region_mask.as_ref());
        w.write_optional_matrix(self.face_parsing_mask.as_ref());
        w.write_optional_matrix(self.occlusion_mask.as_ref());
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let bounding_box = r.read_bounding_box()?;

        let measure_count: u16 = r.read()?;
        let mut assessments = QualityAssessments::new();
        for _ in 0..measure_count {
            let (measure, result) = r.read_measure()?;
            assessments.insert(measure, result);
        }

        let face_count: u16 = r.read()?;
        let detected_faces = (0..face_count)
            .map(|_| r.read_bounding_box())
            .collect::<Result<Vec<_>, _>>()?;

        let pose = Pose {
            yaw: r.read()?,
            pitch: r.read()?,
            roll: r.read()?,
        };

        Ok(Self {
            bounding_box,
            assessments,
            detected_faces,
            pose,
            landmarks: r.read_landmarks()?,
            aligned_landmarks: r.read_landmarks()?,
            transformation_matrix: r.read_matrix()?,
            aligned_face: r.read_matrix()?,
            face_region_mask: r.read_matrix()?,
            face_parsing_mask: r.read_matrix()?,
            occlusion_mask: r.read_matrix()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ping,
    Shutdown,
    /// `result` is `None` when the image could not be fully processed.
    ProcessImage {
        image_id: u32,
        result: Option<Box<ProcessImageResult>>,
    },
    ErrorNotify,
}

impl Reply {
    pub fn command(&self) -> Command {
        match self {
            Reply::Ping => Command::Ping,
            Reply::Shutdown => Command::Shutdown,
            Reply::ProcessImage { .. } => Command::ProcessImage,
            Reply::ErrorNotify => Command::ErrorNotify,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_header(self.command().code());
        if let Reply::ProcessImage { image_id, result } = self {
            w.write(*image_id);
            match result {
                Some(result) => {
                    w.write(1u8);
                    result.encode(&mut w);
                }
                None => w.write(0u8),
            }
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let reply = match Command::from_code(r.read_header()?) {
            Command::Ping => Reply::Ping,
            Command::Shutdown => Reply::Shutdown,
            Command::ErrorNotify => Reply::ErrorNotify,
            Command::ProcessImage => {
                let image_id: u32 = r.read()?;
                let result = match r.read::<u8>()? {
                    0 => None,
                    1 => Some(Box::new(ProcessImageResult::decode(&mut r)?)),
                    flag => {
                        return Err(DecodeError::InvalidTag {
                            what: "success flag",
                            value: flag as i64,
                        })
                    }
                };
                Reply::ProcessImage { image_id, result }
            }
            Command::Unrecognized(code) => {
                return Err(DecodeError::InvalidTag {
                    what: "reply command",
                    value: code as i64,
                })
            }
        };
        r.check_end();
        Ok(reply)
    }
}
