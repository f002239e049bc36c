//! Request/reply loop: one request in flight, replies sent before the next
//! receive.

use crate::transport::{Transport, TransportError};
use fiq_core::{Image, QualityEngine};
use fiq_wire::{ProcessImageResult, Reply, Request};
use std::time::Duration;

/// Why the loop ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    IdleTimeout,
    Shutdown,
}

enum Step {
    Reply(Reply),
    ReplyAndStop(Reply),
    Ignore,
}

pub struct Server<T> {
    transport: T,
    engine: QualityEngine,
    idle_timeout: Option<Duration>,
}

impl<T: Transport> Server<T> {
    pub fn new(transport: T, engine: QualityEngine, idle_timeout: Option<Duration>) -> Self {
        Self {
            transport,
            engine,
            idle_timeout,
        }
    }

    /// Serve until shutdown or idle timeout. Transport failures end the loop
    /// with an error.
    pub async fn run(&mut self) -> Result<Exit, TransportError> {
        loop {
            let message = match self.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, self.transport.recv()).await {
                    Ok(received) => received?,
                    Err(_) => {
                        tracing::info!(
                            idle_ms = limit.as_millis() as u64,
                            "no request within idle timeout"
                        );
                        return Ok(Exit::IdleTimeout);
                    }
                },
                None => self.transport.recv().await?,
            };

            match self.handle(&message) {
                Step::Reply(reply) => self.transport.send(reply.encode()).await?,
                Step::ReplyAndStop(reply) => {
                    self.transport.send(reply.encode()).await?;
                    return Ok(Exit::Shutdown);
                }
                Step::Ignore => {}
            }
        }
    }

    fn handle(&mut self, message: &[u8]) -> Step {
        let request = match Request::decode(message) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, len = message.len(), "undecodable message");
                return Step::Reply(Reply::ErrorNotify);
            }
        };

        match request {
            Request::Ping => {
                tracing::debug!("ping");
                Step::Reply(Reply::Ping)
            }
            Request::Shutdown => {
                tracing::info!("shutdown requested");
                Step::ReplyAndStop(Reply::Shutdown)
            }
            Request::ProcessImage { image_id, image } => {
                Step::Reply(self.process_image(image_id, image))
            }
            other => {
                tracing::warn!(command = other.command().code(), "ignoring command");
                Step::Ignore
            }
        }
    }

    fn process_image(&mut self, image_id: u32, image: Image) -> Reply {
        tracing::info!(image_id, width = image.width, height = image.height, "process image");

        let result = match self.engine.assess_exposing_session(image) {
            Ok((assessment, session)) => {
                let result = match &assessment.aborted {
                    Some(e) => {
                        tracing::info!(image_id, error = %e, "preprocessing incomplete");
                        None
                    }
                    None => ProcessImageResult::from_session(&assessment.result, &session),
                };
                session.dispose();
                result
            }
            Err(e) => {
                tracing::error!(image_id, error = %e, "assessment failed");
                None
            }
        };

        Reply::ProcessImage {
            image_id,
            result: result.map(Box::new),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::reassemble;
    use fiq_core::alignment::{template, ALIGNED_SIZE};
    use fiq_core::capabilities::{
        FaceDetector, LandmarkExtractor, Networks, PoseEstimator, SegmentationExtractor,
        StageError,
    };
    use fiq_core::executor::Executor;
    use fiq_core::measures::builtin_measure;
    use fiq_core::{
        BoundingBox, FaceDetectorKind, FaceLandmarks, LandmarkKind, LandmarkPoint, Matrix, Pose,
        QualityMeasure, Session,
    };
    use fiq_wire::{Command, FORMAT_VERSION};
    use std::collections::VecDeque;

    const FACE: BoundingBox = BoundingBox {
        xleft: 40,
        ytop: 30,
        width: 120,
        height: 140,
        detector: FaceDetectorKind::OpenCvSsd,
    };

    struct Detector(Vec<BoundingBox>);

    impl FaceDetector for Detector {
        fn detect_faces(&mut self, _: &Session) -> Result<Vec<BoundingBox>, StageError> {
            Ok(self.0.clone())
        }
    }

    struct LevelPose;

    impl PoseEstimator for LevelPose {
        fn estimate_pose(&mut self, _: &Session) -> Result<Pose, StageError> {
            Ok(Pose::default())
        }
    }

    /// Every point sits on one of the template anchors scaled into the face.
    struct TemplateLandmarks;

    impl LandmarkExtractor for TemplateLandmarks {
        fn extract_landmarks(&mut self, session: &Session) -> Result<FaceLandmarks, StageError> {
            let face = session
                .primary_face()
                .ok_or(StageError::MissingInput("detected face"))?;
            let side = ALIGNED_SIZE as f64;
            let anchors: Vec<LandmarkPoint> = template()
                .iter()
                .map(|&(x, y)| {
                    LandmarkPoint::new(
                        (face.xleft as f64 + x / side * face.width as f64) as i16,
                        (face.ytop as f64 + y / side * face.height as f64) as i16,
                    )
                })
                .collect();
            let mut points: Vec<LandmarkPoint> = (0..98).map(|i| anchors[i % 5]).collect();
            for (idx, anchor) in [96, 97, 54, 76, 82].into_iter().zip(&anchors) {
                points[idx] = *anchor;
            }
            Ok(FaceLandmarks {
                kind: LandmarkKind::Lm98,
                points,
            })
        }
    }

    struct FullMask;

    impl SegmentationExtractor for FullMask {
        fn extract_mask(&mut self, session: &Session) -> Result<Matrix, StageError> {
            let (rows, cols, _) = session
                .aligned_face()
                .map(Matrix::dim)
                .ok_or(StageError::MissingInput("aligned face"))?;
            Matrix::mask(rows, cols, vec![1; rows * cols])
                .ok_or(StageError::InvalidOutput("mask".into()))
        }
    }

    fn engine(faces: Vec<BoundingBox>) -> QualityEngine {
        let networks = Networks {
            face_detector: Box::new(Detector(faces)),
            pose_estimator: Box::new(LevelPose),
            landmark_extractor: Box::new(TemplateLandmarks),
            face_parsing: Box::new(FullMask),
            face_occlusion: Box::new(FullMask),
        };
        let measures = builtin_measure(QualityMeasure::HeadPose).into_iter().collect();
        QualityEngine::from_parts(networks, Executor::new(measures), 0.0)
    }

    #[derive(Default)]
    struct MemoryTransport {
        inbox: VecDeque<Vec<Vec<u8>>>,
        outbox: Vec<Vec<u8>>,
    }

    impl MemoryTransport {
        fn with(messages: Vec<Vec<Vec<u8>>>) -> Self {
            Self {
                inbox: messages.into(),
                outbox: Vec::new(),
            }
        }
    }

    impl Transport for MemoryTransport {
        async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
            match self.inbox.pop_front() {
                Some(parts) => Ok(reassemble(parts)),
                None => std::future::pending().await,
            }
        }

        async fn send(&mut self, message: Vec<u8>) -> Result<(), TransportError> {
            self.outbox.push(message);
            Ok(())
        }
    }

    fn header(command: Command) -> Vec<u8> {
        let mut bytes = FORMAT_VERSION.to_be_bytes().to_vec();
        bytes.push(command.code());
        bytes
    }

    fn process_image(image_id: u32, width: u16, height: u16) -> Vec<u8> {
        let image = Image::from_rgb(
            width,
            height,
            vec![90; width as usize * height as usize * 3],
        )
        .unwrap();
        Request::ProcessImage { image_id, image }.encode()
    }

    fn server(messages: Vec<Vec<Vec<u8>>>, faces: Vec<BoundingBox>) -> Server<MemoryTransport> {
        Server::new(
            MemoryTransport::with(messages),
            engine(faces),
            Some(Duration::from_millis(20)),
        )
    }

    #[tokio::test]
    async fn test_ping_then_idle_timeout() {
        let mut server = server(vec![vec![header(Command::Ping)]], vec![]);
        assert_eq!(server.run().await.unwrap(), Exit::IdleTimeout);
        assert_eq!(server.transport.outbox, vec![header(Command::Ping)]);
    }

    #[tokio::test]
    async fn test_idle_timeout_without_any_message() {
        let mut server = server(vec![], vec![]);
        assert_eq!(server.run().await.unwrap(), Exit::IdleTimeout);
        assert!(server.transport.outbox.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_replies_once_and_stops() {
        let mut server = server(
            vec![vec![header(Command::Shutdown)], vec![header(Command::Ping)]],
            vec![],
        );
        assert_eq!(server.run().await.unwrap(), Exit::Shutdown);
        assert_eq!(server.transport.outbox, vec![header(Command::Shutdown)]);
        assert_eq!(server.transport.inbox.len(), 1);
    }

    #[tokio::test]
    async fn test_multipart_ping_is_reassembled() {
        let ping = header(Command::Ping);
        let parts = vec![ping[..3].to_vec(), ping[3..4].to_vec(), ping[4..].to_vec()];
        assert_eq!(parts.iter().map(Vec::len).sum::<usize>(), 9);

        let mut server = server(vec![parts], vec![]);
        server.run().await.unwrap();
        assert_eq!(server.transport.outbox, vec![ping]);
    }

    #[tokio::test]
    async fn test_undecodable_messages_get_error_notify() {
        let mut wrong_version = 2u64.to_be_bytes().to_vec();
        wrong_version.push(0);
        let mut truncated = header(Command::ProcessImage);
        truncated.extend_from_slice(&[0, 0, 0, 1, 0, 4, 0, 4, 1, 2, 3]);

        let mut server = server(
            vec![vec![vec![1, 2, 3]], vec![wrong_version], vec![truncated]],
            vec![],
        );
        assert_eq!(server.run().await.unwrap(), Exit::IdleTimeout);
        assert_eq!(server.transport.outbox, vec![header(Command::ErrorNotify); 3]);
    }

    #[tokio::test]
    async fn test_unrecognized_command_gets_no_reply() {
        let mut server = server(
            vec![vec![header(Command::Unrecognized(9))], vec![header(Command::Ping)]],
            vec![],
        );
        server.run().await.unwrap();
        assert_eq!(server.transport.outbox, vec![header(Command::Ping)]);
    }

    #[tokio::test]
    async fn test_no_face_replies_with_failure_flag() {
        let mut server = server(vec![vec![process_image(77, 32, 32)]], vec![]);
        server.run().await.unwrap();

        let mut expected = header(Command::ProcessImage);
        expected.extend_from_slice(&77u32.to_be_bytes());
        expected.push(0);
        assert_eq!(server.transport.outbox, vec![expected]);
    }

    #[tokio::test]
    async fn test_processed_image_reply_carries_session() {
        let mut server = server(vec![vec![process_image(3, 200, 200)]], vec![FACE]);
        server.run().await.unwrap();
        assert_eq!(server.transport.outbox.len(), 1);

        let Reply::ProcessImage {
            image_id,
            result: Some(result),
        } = Reply::decode(&server.transport.outbox[0]).unwrap()
        else {
            panic!("expected a successful process image reply");
        };
        assert_eq!(image_id, 3);
        assert_eq!(result.bounding_box, FACE);
        assert_eq!(result.detected_faces, vec![FACE]);
        assert_eq!(
            result.assessments.keys().copied().collect::<Vec<_>>(),
            vec![
                QualityMeasure::HeadPoseYaw,
                QualityMeasure::HeadPosePitch,
                QualityMeasure::HeadPoseRoll,
            ]
        );
        assert!(result.assessments.values().all(|r| r.scalar == 100.0));
        assert_eq!(result.landmarks.points.len(), 98);
        assert_eq!(
            result.aligned_face.as_ref().map(Matrix::dim),
            Some((ALIGNED_SIZE, ALIGNED_SIZE, 3))
        );
        assert_eq!(
            result.transformation_matrix.as_ref().map(Matrix::dim),
            Some((2, 3, 1))
        );
        assert!(result.face_region_mask.is_some());
        assert!(result.face_parsing_mask.is_some());
        assert!(result.occlusion_mask.is_some());
    }
}
