//! Perception and raw-input collaborators.
//!
//! Detection models, voice-activity detection and device drivers live outside
//! the control core; sensor services only depend on these contracts.

use crate::camera::Frame;
use anyhow::Result;
use async_trait::async_trait;

/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// Keypoints of a detected face, in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceLandmarks {
    pub left_eye: (f32, f32),
    pub right_eye: (f32, f32),
    pub left_eye_tragion: (f32, f32),
    pub right_eye_tragion: (f32, f32),
    pub nose_tip: (f32, f32),
    pub mouth: (f32, f32),
}

impl FaceLandmarks {
    /// Whether the face is turned towards the camera.
    ///
    /// The nose tip, normalised horizontally between the eye tragions and
    /// vertically between the eye line and the mouth, must stay inside
    /// `[margin, 1 - margin]` on both axes.
    pub fn is_looking(&self, margin: f32) -> bool {
        let span_x = self.right_eye_tragion.0 - self.left_eye_tragion.0;
        let eyes_y = (self.left_eye.1 + self.right_eye.1) / 2.0;
        let span_y = self.mouth.1 - eyes_y;
        if span_x.abs() < f32::EPSILON || span_y.abs() < f32::EPSILON {
            return false;
        }
        let xn = (self.nose_tip.0 - self.left_eye_tragion.0) / span_x;
        let yn = (self.nose_tip.1 - eyes_y) / span_y;
        let inside = |v: f32| v >= margin && v <= 1.0 - margin;
        inside(xn) && inside(yn)
    }
}

/// A face found by the detector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub landmarks: FaceLandmarks,
}

/// Finds faces in a frame.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect_faces(&self, frame: &Frame) -> Result<Vec<DetectedFace>>;
}

/// Matches faces against the enrolled face database.
#[async_trait]
pub trait FaceRecognizer: Send + Sync {
    /// One entry per box: the matched username, or `None` for a stranger.
    async fn identify(&self, frame: &Frame, faces: &[BoundingBox]) -> Result<Vec<Option<String>>>;
    /// Add the face in `face` to `username`'s samples.
    async fn enroll(&self, username: &str, frame: &Frame, face: &BoundingBox) -> Result<()>;
}

/// Decides whether a person is visible.
#[async_trait]
pub trait PersonDetector: Send + Sync {
    async fn person_present(&self, frame: &Frame) -> Result<bool>;
}

/// Voice-activity detection over a window of 16-bit little-endian PCM.
pub trait VoiceActivity: Send + Sync {
    fn is_speech(&self, window: &[u8]) -> bool;
}

/// Microphone that can be opened for a recording session.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn AudioStream>>;
}

/// An open microphone stream yielding fixed-size PCM chunks.
#[async_trait]
pub trait AudioStream: Send {
    /// Next chunk, or `None` once the stream has ended.
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Multi-touch protocol events relevant to gesture tracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TouchEvent {
    /// Subsequent events refer to this slot.
    Slot(i32),
    /// A finger landed in the current slot (`id >= 0`) or was lifted (`-1`).
    TrackingId(i32),
    Other,
}

/// Touch panel input device.
#[async_trait]
pub trait TouchDevice: Send {
    /// Kernel-reported device name.
    fn name(&self) -> &str;
    /// Next event, or `None` once the device has gone away.
    async fn next_event(&mut self) -> Result<Option<TouchEvent>>;
}
