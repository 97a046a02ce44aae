//! Perception and IO services.
//!
//! Every service follows the same shape: a [`ServiceRunner`] owning one or
//! more worker loops that watch a cancellation token, optional [`HandOff`]
//! pipelining between a fast loop and a slow one, and camera access through a
//! [`CameraLease`] held by the loop itself so that a joined loop has always
//! released the camera.
//!
//! [`ServiceRunner`]: crate::worker::ServiceRunner
//! [`HandOff`]: crate::handoff::HandOff
//! [`CameraLease`]: crate::camera::CameraLease

pub mod enrollment;
pub mod gaze;
pub mod microphone;
pub mod presence;
pub mod touch;

pub use enrollment::{EnrollmentRecorder, EnrollmentSettings};
pub use gaze::{GazeService, GazeSettings};
pub use microphone::{MicSettings, MicrophoneService};
pub use presence::{PresenceService, PresenceSettings};
pub use touch::{TouchService, TouchSettings};

use crate::traits::{BoundingBox, DetectedFace};
use std::time::Duration;

/// How camera-driven loops sample frames.
#[derive(Clone, Copy, Debug)]
pub struct FrameSampling {
    /// Pause between two processed frames.
    pub interval: Duration,
    /// Frames are downscaled to this width before detection.
    pub width: u32,
}

impl Default for FrameSampling {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            width: 500,
        }
    }
}

/// Geometry thresholds for "a face is looking at the robot from close by".
#[derive(Clone, Copy, Debug)]
pub struct CloseFaceCriteria {
    /// Minimum bounding-box area, in pixels of the downscaled frame.
    pub min_area: f32,
    /// Landmark margin passed to [`crate::traits::FaceLandmarks::is_looking`].
    pub looking_margin: f32,
}

impl Default for CloseFaceCriteria {
    fn default() -> Self {
        Self {
            min_area: 5000.0,
            looking_margin: 0.25,
        }
    }
}

/// Classification of one frame's faces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum FaceObservation {
    NoFace,
    NotLooking,
    TooFar,
    Close(BoundingBox),
}

impl CloseFaceCriteria {
    /// Pick the largest looking face and check it is close enough.
    pub(crate) fn observe(&self, faces: &[DetectedFace]) -> FaceObservation {
        if faces.is_empty() {
            return FaceObservation::NoFace;
        }
        let closest = faces
            .iter()
            .filter(|f| f.landmarks.is_looking(self.looking_margin))
            .map(|f| f.bbox)
            .max_by(|a, b| a.area().total_cmp(&b.area()));
        match closest {
            None => FaceObservation::NotLooking,
            Some(bbox) if bbox.area() >= self.min_area => FaceObservation::Close(bbox),
            Some(_) => FaceObservation::TooFar,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::face;
    use super::*;

    #[test]
    fn classifies_faces() {
        let c = CloseFaceCriteria::default();
        assert_eq!(c.observe(&[]), FaceObservation::NoFace);
        assert_eq!(c.observe(&[face(100.0, false)]), FaceObservation::NotLooking);
        assert_eq!(c.observe(&[face(50.0, true)]), FaceObservation::TooFar);
        assert!(matches!(
            c.observe(&[face(50.0, true), face(100.0, true)]),
            FaceObservation::Close(b) if b.area() == 10_000.0
        ));
    }
}
