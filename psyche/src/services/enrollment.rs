//! Records a few close frames of a new user and feeds them to the recognizer.

use super::{CloseFaceCriteria, FaceObservation, FrameSampling};
use crate::camera::{CameraManager, Frame};
use crate::notification::Notification;
use crate::queue::EventSender;
use crate::traits::{BoundingBox, EnrollmentService, FaceDetector, FaceRecognizer};
use crate::worker::ServiceRunner;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const SERVICE: &str = "enrollment";

#[derive(Clone, Copy, Debug)]
pub struct EnrollmentSettings {
    pub sampling: FrameSampling,
    pub criteria: CloseFaceCriteria,
    /// Close looking frames to record.
    pub frames: u32,
    /// Consecutive frames without any face before giving up.
    pub max_faceless_frames: u32,
}

impl Default for EnrollmentSettings {
    fn default() -> Self {
        Self {
            sampling: FrameSampling::default(),
            criteria: CloseFaceCriteria::default(),
            frames: 6,
            max_faceless_frames: 10,
        }
    }
}

struct Sample {
    username: String,
    frame: Frame,
    face: BoundingBox,
}

/// Face enrolment as a recorder loop plus an encoder task.
///
/// The recorder holds the camera lease and is joined by [`stop`]. The encoder
/// only touches the recognizer; it drains whatever the recorder queued and
/// exits once the recorder is gone, and is awaited on the next enrolment or by
/// [`shutdown`].
///
/// [`stop`]: EnrollmentService::stop
/// [`shutdown`]: EnrollmentService::shutdown
pub struct EnrollmentRecorder {
    recorder: ServiceRunner,
    encoder: Mutex<Option<JoinHandle<()>>>,
    camera: Arc<CameraManager>,
    detector: Arc<dyn FaceDetector>,
    recognizer: Arc<dyn FaceRecognizer>,
    events: EventSender,
    settings: EnrollmentSettings,
}

impl EnrollmentRecorder {
    pub fn new(
        camera: Arc<CameraManager>,
        detector: Arc<dyn FaceDetector>,
        recognizer: Arc<dyn FaceRecognizer>,
        events: EventSender,
        settings: EnrollmentSettings,
    ) -> Self {
        Self {
            recorder: ServiceRunner::new(SERVICE),
            encoder: Mutex::new(None),
            camera,
            detector,
            recognizer,
            events,
            settings,
        }
    }

    pub async fn is_recording(&self) -> bool {
        self.recorder.is_running().await
    }

    async fn join_encoder(&self) {
        let handle = self.encoder.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("face encoder panicked");
                }
            }
        }
    }
}

#[async_trait]
impl EnrollmentService for EnrollmentRecorder {
    async fn enroll(&self, username: &str) {
        self.recorder.stop().await;
        self.join_encoder().await;

        let (tx, rx) = mpsc::unbounded_channel();
        let username = username.to_string();
        info!(%username, "face enrolment started");
        self.recorder
            .start(|group| {
                group.spawn(record_loop(
                    group.token(),
                    username,
                    self.camera.clone(),
                    self.detector.clone(),
                    tx,
                    self.events.clone(),
                    self.settings,
                ));
            })
            .await;
        let encoder = tokio::spawn(encode_loop(rx, self.recognizer.clone()));
        *self.encoder.lock().await = Some(encoder);
    }

    async fn stop(&self) {
        self.recorder.stop().await;
    }

    async fn shutdown(&self) {
        self.recorder.stop().await;
        self.join_encoder().await;
    }
}

async fn record_loop(
    token: CancellationToken,
    username: String,
    camera: Arc<CameraManager>,
    detector: Arc<dyn FaceDetector>,
    samples: mpsc::UnboundedSender<Sample>,
    events: EventSender,
    settings: EnrollmentSettings,
) {
    let lease = match camera.lease(SERVICE) {
        Ok(lease) => lease,
        Err(e) => {
            error!(error = %e, "face recorder cannot use the camera");
            return;
        }
    };
    let mut ticker = tokio::time::interval(settings.sampling.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut recorded = 0u32;
    let mut faceless = 0u32;

    while recorded < settings.frames {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(frame) = lease.camera().frame(Some(settings.sampling.width)) else {
            continue;
        };
        let faces = tokio::select! {
            _ = token.cancelled() => break,
            faces = detector.detect_faces(&frame) => faces,
        };
        let faces = match faces {
            Ok(faces) => faces,
            Err(e) => {
                warn!(error = %e, "face detection failed");
                continue;
            }
        };
        match settings.criteria.observe(&faces) {
            FaceObservation::NoFace => {
                faceless += 1;
                if faceless >= settings.max_faceless_frames {
                    info!(faceless, "no face in view; enrolment abandoned");
                    events.post(Notification::EnrollmentAbandoned);
                    break;
                }
            }
            FaceObservation::Close(face) => {
                faceless = 0;
                recorded += 1;
                let sample = Sample {
                    username: username.clone(),
                    frame,
                    face,
                };
                if samples.send(sample).is_err() {
                    warn!("face encoder gone");
                    break;
                }
                let progress = recorded as f32 * 100.0 / settings.frames as f32;
                info!(progress, "face frame recorded");
                events.post(Notification::EnrollmentProgress(progress));
            }
            FaceObservation::NotLooking | FaceObservation::TooFar => faceless = 0,
        }
    }
    drop(lease);
    info!(recorded, "face recorder stopped");
}

async fn encode_loop(mut samples: mpsc::UnboundedReceiver<Sample>, recognizer: Arc<dyn FaceRecognizer>) {
    while let Some(sample) = samples.recv().await {
        if let Err(e) = recognizer
            .enroll(&sample.username, &sample.frame, &sample.face)
            .await
        {
            warn!(error = %e, username = %sample.username, "face encoding failed");
        }
    }
    info!("face encoder finished");
}
