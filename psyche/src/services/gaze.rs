//! Wake-on-gaze detector with a pipelined face recognizer.

use super::{CloseFaceCriteria, FaceObservation, FrameSampling};
use crate::camera::{CameraManager, Frame};
use crate::handoff::HandOff;
use crate::notification::{Candidates, Notification};
use crate::queue::EventSender;
use crate::traits::{BoundingBox, FaceDetector, FaceRecognizer, SensorService};
use crate::worker::ServiceRunner;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SERVICE: &str = "gaze";

#[derive(Clone, Copy, Debug)]
pub struct GazeSettings {
    pub sampling: FrameSampling,
    pub criteria: CloseFaceCriteria,
    /// Consecutive close frames before [`Notification::GazeConfirmedClose`].
    pub close_streak: u32,
    /// Sightings of one name after which the recognizer stops.
    pub known_sightings: u32,
    /// Unknown sightings after which the recognizer stops.
    pub unknown_sightings: u32,
    /// How long the recognizer waits for a frame before rechecking cancellation.
    pub handoff_wait: Duration,
    pub handoff_capacity: usize,
}

impl Default for GazeSettings {
    fn default() -> Self {
        Self {
            sampling: FrameSampling::default(),
            criteria: CloseFaceCriteria::default(),
            close_streak: 3,
            known_sightings: 3,
            unknown_sightings: 15,
            handoff_wait: Duration::from_millis(500),
            handoff_capacity: 4,
        }
    }
}

/// Work item for the recognizer; `None` means nobody is close and looking.
type Sighting = Option<(Frame, BoundingBox)>;

/// Turns per-frame observations into edge-triggered notifications.
#[derive(Debug, Default)]
struct GazeTracker {
    streak: u32,
    last: Option<Notification>,
}

impl GazeTracker {
    fn observe(&mut self, observation: FaceObservation, close_streak: u32) -> Option<Notification> {
        let notification = match observation {
            FaceObservation::Close(_) => {
                self.streak += 1;
                if self.streak != close_streak {
                    return None;
                }
                Notification::GazeConfirmedClose
            }
            FaceObservation::TooFar => {
                self.streak = 0;
                Notification::GazeTooFar
            }
            FaceObservation::NoFace | FaceObservation::NotLooking => {
                self.streak = 0;
                Notification::GazeLost
            }
        };
        if self.last.as_ref() == Some(&notification) {
            return None;
        }
        self.last = Some(notification.clone());
        Some(notification)
    }
}

/// Whether the recognizer should look at another frame.
fn needs_identification(history: &Candidates, settings: &GazeSettings) -> bool {
    history.iter().all(|(name, count)| match name {
        Some(_) => *count < settings.known_sightings,
        None => *count < settings.unknown_sightings,
    })
}

/// Count each name once per frame; names not seen in this frame are dropped.
fn update_history(history: &Candidates, names: Vec<Option<String>>) -> Candidates {
    names
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|name| {
            let count = history.get(&name).copied().unwrap_or(0) + 1;
            (name, count)
        })
        .collect()
}

/// Watches for someone looking at the robot from close by and identifies them.
pub struct GazeService {
    runner: ServiceRunner,
    camera: Arc<CameraManager>,
    detector: Arc<dyn FaceDetector>,
    recognizer: Arc<dyn FaceRecognizer>,
    events: EventSender,
    settings: GazeSettings,
}

impl GazeService {
    pub fn new(
        camera: Arc<CameraManager>,
        detector: Arc<dyn FaceDetector>,
        recognizer: Arc<dyn FaceRecognizer>,
        events: EventSender,
        settings: GazeSettings,
    ) -> Self {
        Self {
            runner: ServiceRunner::new(SERVICE),
            camera,
            detector,
            recognizer,
            events,
            settings,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.runner.is_running().await
    }
}

#[async_trait]
impl SensorService for GazeService {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn start(&self) {
        self.runner
            .start(|group| {
                let handoff = Arc::new(HandOff::<Sighting>::new(self.settings.handoff_capacity));
                group.spawn(detect_loop(
                    group.token(),
                    self.camera.clone(),
                    self.detector.clone(),
                    handoff.clone(),
                    self.events.clone(),
                    self.settings,
                ));
                group.spawn(recognize_loop(
                    group.token(),
                    self.recognizer.clone(),
                    handoff,
                    self.events.clone(),
                    self.settings,
                ));
            })
            .await;
    }

    async fn stop(&self) {
        self.runner.stop().await;
    }
}

async fn detect_loop(
    token: CancellationToken,
    camera: Arc<CameraManager>,
    detector: Arc<dyn FaceDetector>,
    handoff: Arc<HandOff<Sighting>>,
    events: EventSender,
    settings: GazeSettings,
) {
    let lease = match camera.lease(SERVICE) {
        Ok(lease) => lease,
        Err(e) => {
            error!(error = %e, "gaze detector cannot use the camera");
            return;
        }
    };
    info!("gaze detector started");
    let mut ticker = tokio::time::interval(settings.sampling.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tracker = GazeTracker::default();

    loop {
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
        let observation = settings.criteria.observe(&faces);
        if let Some(notification) = tracker.observe(observation, settings.close_streak) {
            events.post(notification);
        }
        match observation {
            FaceObservation::Close(bbox) => {
                let dropped = handoff.push_fresh(Some((frame, bbox)));
                if dropped > 0 {
                    debug!(dropped, "recognizer behind; stale faces dropped");
                }
            }
            _ => handoff.replace_with(None),
        }
    }
    drop(lease);
    info!("gaze detector stopped");
}

async fn recognize_loop(
    token: CancellationToken,
    recognizer: Arc<dyn FaceRecognizer>,
    handoff: Arc<HandOff<Sighting>>,
    events: EventSender,
    settings: GazeSettings,
) {
    info!("recognizer started");
    let mut history = Candidates::new();
    loop {
        let item = tokio::select! {
            _ = token.cancelled() => break,
            item = handoff.pop_timeout(settings.handoff_wait) => item,
        };
        let Some(sighting) = item else { continue };
        let Some((frame, bbox)) = sighting else {
            history.clear();
            continue;
        };
        if !needs_identification(&history, &settings) {
            continue;
        }
        let bboxes = [bbox];
        let names = tokio::select! {
            _ = token.cancelled() => break,
            names = recognizer.identify(&frame, &bboxes) => names,
        };
        match names {
            Ok(names) => {
                history = update_history(&history, names);
                debug!(?history, "recognition history updated");
                events.post(Notification::IdentityMatched(history.clone()));
            }
            Err(e) => warn!(error = %e, "face recognition failed"),
        }
    }
    info!("recognizer stopped");
}
