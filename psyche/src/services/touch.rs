//! Three-finger hold shutdown gesture.

use crate::error::{Error, Result};
use crate::notification::Notification;
use crate::queue::EventSender;
use crate::timer::Timer;
use crate::traits::{SensorService, TouchDevice, TouchEvent};
use crate::worker::ServiceRunner;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const SERVICE: &str = "touch";

#[derive(Clone, Copy, Debug)]
pub struct TouchSettings {
    pub fingers: usize,
    pub hold: Duration,
}

impl Default for TouchSettings {
    fn default() -> Self {
        Self {
            fingers: 3,
            hold: Duration::from_secs(3),
        }
    }
}

/// Multi-touch slot bookkeeping.
#[derive(Debug, Default)]
struct Fingers {
    slot: Option<i32>,
    active: BTreeMap<i32, i32>,
}

impl Fingers {
    /// Apply `event`; returns the finger count when it changed.
    fn apply(&mut self, event: TouchEvent) -> Option<usize> {
        match event {
            TouchEvent::Slot(slot) => {
                self.slot = Some(slot);
                None
            }
            TouchEvent::TrackingId(id) => {
                let Some(slot) = self.slot else {
                    debug!("tracking id before any slot; skipped");
                    return None;
                };
                if id < 0 {
                    self.active.remove(&slot)?;
                } else {
                    self.active.insert(slot, id);
                }
                Some(self.active.len())
            }
            TouchEvent::Other => None,
        }
    }
}

/// Watches the touch panel for the shutdown gesture.
pub struct TouchService {
    runner: ServiceRunner,
    device: Arc<Mutex<Box<dyn TouchDevice>>>,
    events: EventSender,
    settings: TouchSettings,
}

impl TouchService {
    /// Pick the first device that looks like a touch panel.
    pub fn open(
        devices: Vec<Box<dyn TouchDevice>>,
        events: EventSender,
        settings: TouchSettings,
    ) -> Result<Self> {
        let device = devices
            .into_iter()
            .find(|d| {
                let name = d.name().to_lowercase();
                name.contains("touch") || name.contains("waveshare")
            })
            .ok_or_else(|| Error::DeviceNotFound("touch panel".into()))?;
        info!(device = device.name(), "touch panel found");
        Ok(Self {
            runner: ServiceRunner::new(SERVICE),
            device: Arc::new(Mutex::new(device)),
            events,
            settings,
        })
    }
}

#[async_trait]
impl SensorService for TouchService {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn start(&self) {
        self.runner
            .start(|group| {
                group.spawn(touch_loop(
                    group.token(),
                    self.device.clone(),
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

async fn touch_loop(
    token: CancellationToken,
    device: Arc<Mutex<Box<dyn TouchDevice>>>,
    events: EventSender,
    settings: TouchSettings,
) {
    let mut device = device.lock().await;
    let hold = Timer::new("touch_hold");
    let count = Arc::new(AtomicUsize::new(0));
    let mut fingers = Fingers::default();
    info!("touch monitor started");

    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = device.next_event() => event,
        };
        let event = match event {
            Ok(Some(event)) => event,
            Ok(None) => {
                error!("touch device disappeared");
                break;
            }
            Err(e) => {
                error!(error = %e, "touch read failed");
                break;
            }
        };
        let Some(now) = fingers.apply(event) else {
            continue;
        };
        let before = count.swap(now, Ordering::SeqCst);
        if now == settings.fingers && before != settings.fingers {
            info!(fingers = now, "gesture hold started");
            let count = count.clone();
            let events = events.clone();
            let wanted = settings.fingers;
            hold.arm(settings.hold, move || {
                if count.load(Ordering::SeqCst) == wanted {
                    info!("shutdown gesture recognised");
                    events.post(Notification::TouchShutdownGesture);
                }
            });
        } else if now != settings.fingers && hold.is_armed() {
            debug!(fingers = now, "gesture hold cancelled");
            hold.cancel();
        }
    }
    hold.cancel();
    info!("touch monitor stopped");
}
