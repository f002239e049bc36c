use crate::matrix::Matrix;
use crate::types::{
    BoundingBox, FaceImageQualityAssessment, FaceLandmarks, Image, Pose, QualityAssessments,
};

/// Per-request state: the input image and every artifact derived from it.
///
/// Artifact setters are crate-private so only the preprocessing pipeline can
/// populate them; measures get read access through the getters and write
/// access to the assessment map only.
#[derive(Debug, Clone)]
pub struct Session {
    image: Image,
    detected_faces: Option<Vec<BoundingBox>>,
    pose: Option<Pose>,
    landmarks: Option<FaceLandmarks>,
    aligned_face: Option<Matrix>,
    aligned_landmarks: Option<FaceLandmarks>,
    transformation_matrix: Option<Matrix>,
    face_parsing_mask: Option<Matrix>,
    occlusion_mask: Option<Matrix>,
    face_region_mask: Option<Matrix>,
    assessment: FaceImageQualityAssessment,
}

impl Session {
    pub fn new(image: Image) -> Self {
        Self {
            image,
            detected_faces: None,
            pose: None,
            landmarks: None,
            aligned_face: None,
            aligned_landmarks: None,
            transformation_matrix: None,
            face_parsing_mask: None,
            occlusion_mask: None,
            face_region_mask: None,
            assessment: FaceImageQualityAssessment::default(),
        }
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn detected_faces(&self) -> Option<&[BoundingBox]> {
        self.detected_faces.as_deref()
    }

    /// First detected face; detectors order faces largest first.
    pub fn primary_face(&self) -> Option<&BoundingBox> {
        self.detected_faces.as_ref().and_then(|faces| faces.first())
    }

    pub fn pose(&self) -> Option<&Pose> {
        self.pose.as_ref()
    }

    pub fn landmarks(&self) -> Option<&FaceLandmarks> {
        self.landmarks.as_ref()
    }

    pub fn aligned_face(&self) -> Option<&Matrix> {
        self.aligned_face.as_ref()
    }

    pub fn aligned_landmarks(&self) -> Option<&FaceLandmarks> {
        self.aligned_landmarks.as_ref()
    }

    pub fn transformation_matrix(&self) -> Option<&Matrix> {
        self.transformation_matrix.as_ref()
    }

    pub fn face_parsing_mask(&self) -> Option<&Matrix> {
        self.face_parsing_mask.as_ref()
    }

    pub fn occlusion_mask(&self) -> Option<&Matrix> {
        self.occlusion_mask.as_ref()
    }

    pub fn face_region_mask(&self) -> Option<&Matrix> {
        self.face_region_mask.as_ref()
    }

    pub fn assessment(&self) -> &FaceImageQualityAssessment {
        &self.assessment
    }

    pub fn assessments_mut(&mut self) -> &mut QualityAssessments {
        &mut self.assessment.assessments
    }

    pub(crate) fn into_assessment(self) -> FaceImageQualityAssessment {
        self.assessment
    }

    /// Whether every artifact the pipeline produces is present.
    pub fn is_fully_preprocessed(&self) -> bool {
        self.detected_faces.is_some()
            && self.pose.is_some()
            && self.landmarks.is_some()
            && self.aligned_face.is_some()
            && self.aligned_landmarks.is_some()
            && self.transformation_matrix.is_some()
            && self.face_parsing_mask.is_some()
            && self.occlusion_mask.is_some()
            && self.face_region_mask.is_some()
    }

    pub(crate) fn set_detected_faces(&mut self, faces: Vec<BoundingBox>) {
        if let Some(primary) = faces.first() {
            self.assessment.bounding_box = *primary;
        }
        self.detected_faces = Some(faces);
    }

    pub(crate) fn set_pose(&mut self, pose: Pose) {
        self.pose = Some(pose);
    }

    pub(crate) fn set_landmarks(&mut self, landmarks: FaceLandmarks) {
        self.landmarks = Some(landmarks);
    }

    pub(crate) fn set_alignment(
        &mut self,
        aligned_face: Matrix,
        aligned_landmarks: FaceLandmarks,
        transformation_matrix: Matrix,
    ) {
        self.aligned_face = Some(aligned_face);
        self.aligned_landmarks = Some(aligned_landmarks);
        self.transformation_matrix = Some(transformation_matrix);
    }

    pub(crate) fn set_face_parsing_mask(&mut self, mask: Matrix) {
        self.face_parsing_mask = Some(mask);
    }

    pub(crate) fn set_occlusion_mask(&mut self, mask: Matrix) {
        self.occlusion_mask = Some(mask);
    }

    pub(crate) fn set_face_region_mask(&mut self, mask: Matrix) {
        self.face_region_mask = Some(mask);
    }
}

/// Read-only handle on a processed [`Session`], returned by
/// [`QualityEngine::assess_exposing_session`](crate::QualityEngine::assess_exposing_session).
///
/// The handle owns its session. [`ExposedSession::dispose`] consumes it, so a
/// disposed handle cannot be read again.
#[derive(Debug)]
pub struct ExposedSession {
    session: Box<Session>,
}

impl ExposedSession {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            session: Box::new(session),
        }
    }

    pub fn detected_faces(&self) -> Option<&[BoundingBox]> {
        self.session.detected_faces()
    }

    pub fn pose(&self) -> Option<&Pose> {
        self.session.pose()
    }

    pub fn landmarks(&self) -> Option<&FaceLandmarks> {
        self.session.landmarks()
    }

    pub fn aligned_landmarks(&self) -> Option<&FaceLandmarks> {
        self.session.aligned_landmarks()
    }

    pub fn transformation_matrix(&self) -> Option<&Matrix> {
        self.session.transformation_matrix()
    }

    pub fn aligned_face(&self) -> Option<&Matrix> {
        self.session.aligned_face()
    }

    pub fn face_region_mask(&self) -> Option<&Matrix> {
        self.session.face_region_mask()
    }

    pub fn face_parsing_mask(&self) -> Option<&Matrix> {
        self.session.face_parsing_mask()
    }

    pub fn occlusion_mask(&self) -> Option<&Matrix> {
        self.session.occlusion_mask()
    }

    pub fn is_fully_preprocessed(&self) -> bool {
        self.session.is_fully_preprocessed()
    }

    /// Release the session and all artifacts it holds.
    pub fn dispose(self) {
        tracing::trace!("exposed session disposed");
        drop(self.session);
    }
}
