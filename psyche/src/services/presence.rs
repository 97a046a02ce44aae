use super::FrameSampling;
use crate::camera::CameraManager;
use crate::notification::Notification;
use crate::queue::EventSender;
use crate::traits::{PersonDetector, SensorService};
use crate::worker::ServiceRunner;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const SERVICE: &str = "presence";

#[derive(Clone, Copy, Debug)]
pub struct PresenceSettings {
    pub sampling: FrameSampling,
    /// Consecutive person frames before [`Notification::PersonDetected`].
    pub detected_after: u32,
    /// Period, in consecutive person frames, of
    /// [`Notification::PersonDetectedLongTime`].
    pub lingering_every: u32,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            sampling: FrameSampling::default(),
            detected_after: 3,
            lingering_every: 12,
        }
    }
}

#[derive(Debug, Default)]
struct PresenceTracker {
    streak: u32,
    reported_empty: bool,
}

impl PresenceTracker {
    fn observe(&mut self, present: bool, settings: &PresenceSettings) -> Option<Notification> {
        if !present {
            self.streak = 0;
            if self.reported_empty {
                return None;
            }
            self.reported_empty = true;
            return Some(Notification::RoomEmpty);
        }
        self.reported_empty = false;
        self.streak += 1;
        if self.streak % settings.lingering_every.max(1) == 0 {
            Some(Notification::PersonDetectedLongTime)
        } else if self.streak == settings.detected_after {
            Some(Notification::PersonDetected)
        } else {
            None
        }
    }
}

/// Person detector driving the idle/idle-presence transitions.
pub struct PresenceService {
    runner: ServiceRunner,
    camera: Arc<CameraManager>,
    detector: Arc<dyn PersonDetector>,
    events: EventSender,
    settings: PresenceSettings,
}

impl PresenceService {
    pub fn new(
        camera: Arc<CameraManager>,
        detector: Arc<dyn PersonDetector>,
        events: EventSender,
        settings: PresenceSettings,
    ) -> Self {
        Self {
            runner: ServiceRunner::new(SERVICE),
            camera,
            detector,
            events,
            settings,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.runner.is_running().await
    }
}

#[async_trait]
impl SensorService for PresenceService {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn start(&self) {
        self.runner
            .start(|group| {
                group.spawn(detect_loop(
                    group.token(),
                    self.camera.clone(),
                    self.detector.clone(),
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
    detector: Arc<dyn PersonDetector>,
    events: EventSender,
    settings: PresenceSettings,
) {
    let lease = match camera.lease(SERVICE) {
        Ok(lease) => lease,
        Err(e) => {
            error!(error = %e, "presence detector cannot use the camera");
            return;
        }
    };
    info!("presence detector started");
    let mut ticker = tokio::time::interval(settings.sampling.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tracker = PresenceTracker::default();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(frame) = lease.camera().frame(Some(settings.sampling.width)) else {
            continue;
        };
        if frame.width() == 0 || frame.height() == 0 {
            continue;
        }
        let present = tokio::select! {
            _ = token.cancelled() => break,
            present = detector.person_present(&frame) => present,
        };
        match present {
            Ok(present) => {
                if let Some(notification) = tracker.observe(present, &settings) {
                    events.post(notification);
                }
            }
            Err(e) => warn!(error = %e, "person detection failed"),
        }
    }
    drop(lease);
    info!("presence detector stopped");
}
