//! Reference-counted access to the single physical camera.
//!
//! Several perception services time-share one capture device. Each service
//! takes a lease under its own id; the hardware runs while at least one lease
//! is held and is stopped when the last one is released.

use crate::error::{Error, Result};
use image::RgbImage;
use image::imageops::{self, FilterType};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// A decoded colour frame.
pub type Frame = RgbImage;

/// Name a service registers its lease under.
pub type ServiceId = &'static str;

/// The capture hardware behind the manager.
pub trait CaptureDevice: Send + Sync {
    /// Begin streaming frames into `sink`.
    fn start(&self, sink: FrameSink) -> anyhow::Result<()>;
    /// Stop streaming. Called only when no lease is held.
    fn stop(&self);
}

/// Latest-frame slot written by the capture device.
#[derive(Clone, Default)]
pub struct FrameSink {
    slot: Arc<Mutex<Option<Arc<Frame>>>>,
}

impl FrameSink {
    /// Replace the current frame.
    pub fn publish(&self, frame: Frame) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(frame));
    }

    fn latest(&self) -> Option<Arc<Frame>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Process-wide owner of the camera.
pub struct CameraManager {
    device: Arc<dyn CaptureDevice>,
    leases: Mutex<BTreeSet<ServiceId>>,
    frames: FrameSink,
}

impl CameraManager {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            leases: Mutex::new(BTreeSet::new()),
            frames: FrameSink::default(),
        }
    }

    /// Register `service` as a camera user, starting the hardware if it was
    /// idle. Acquiring twice under the same id is a no-op.
    pub fn acquire(&self, service: ServiceId) -> Result<()> {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        if leases.contains(service) {
            return Ok(());
        }
        if leases.is_empty() {
            self.device
                .start(self.frames.clone())
                .map_err(|e| Error::CameraStart(e.to_string()))?;
            info!("camera started");
        }
        leases.insert(service);
        info!(%service, "camera lease acquired");
        Ok(())
    }

    /// Drop the lease held by `service`, stopping the hardware when it was
    /// the last one. Releasing an id that holds nothing is a no-op.
    pub fn release(&self, service: ServiceId) {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        if !leases.remove(service) {
            return;
        }
        info!(%service, "camera lease released");
        if leases.is_empty() {
            self.device.stop();
            self.frames.clear();
            info!("camera stopped");
        }
    }

    /// Acquire a lease that is released when the guard drops.
    pub fn lease(self: &Arc<Self>, service: ServiceId) -> Result<CameraLease> {
        self.acquire(service)?;
        Ok(CameraLease {
            camera: Arc::clone(self),
            service,
        })
    }

    /// Most recent frame, downscaled to `max_width` when it is wider.
    pub fn frame(&self, max_width: Option<u32>) -> Option<Frame> {
        let frame = self.frames.latest()?;
        match max_width {
            Some(max) if max > 0 && frame.width() > max => {
                let height = (u64::from(frame.height()) * u64::from(max)
                    / u64::from(frame.width()))
                .max(1) as u32;
                Some(imageops::resize(frame.as_ref(), max, height, FilterType::Triangle))
            }
            _ => Some(frame.as_ref().clone()),
        }
    }

    /// Whether the hardware is currently streaming.
    pub fn is_active(&self) -> bool {
        !self
            .leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Services currently holding a lease.
    pub fn holders(&self) -> Vec<ServiceId> {
        self.leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    /// Stop the hardware regardless of outstanding leases. Used at teardown
    /// after every service has been stopped.
    pub fn shutdown(&self) {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        if leases.is_empty() {
            return;
        }
        let holders: Vec<ServiceId> = leases.iter().copied().collect();
        warn!(?holders, "camera still leased at shutdown");
        leases.clear();
        self.device.stop();
        self.frames.clear();
    }
}

/// A held camera lease. Dropping it releases the camera for its service,
/// including when the owning worker exits early or panics.
pub struct CameraLease {
    camera: Arc<CameraManager>,
    service: ServiceId,
}

impl CameraLease {
    pub fn camera(&self) -> &CameraManager {
        &self.camera
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.camera.release(self.service);
    }
}
