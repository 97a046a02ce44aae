//! Contracts between the control core and its collaborators.

pub mod dialogue;
pub mod face;
pub mod leds;
pub mod mouth;
pub mod perception;
pub mod service;

pub use dialogue::{DialogueBackend, QueryRequest, QueryResponse, ResponseAction};
pub use face::{Expression, Face, NoFace};
pub use leds::{LedState, Leds, NoopLeds, Rgb, palette};
pub use mouth::{AudioSink, Mouth};
pub use perception::{
    AudioSource, AudioStream, BoundingBox, DetectedFace, FaceDetector, FaceLandmarks,
    FaceRecognizer, PersonDetector, TouchDevice, TouchEvent, VoiceActivity,
};
pub use service::{EnrollmentService, SensorService};
