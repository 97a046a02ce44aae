//! Robot process: concrete collaborators for the `psyche` control core.
//!
//! Perception and dialogue run in HTTP sidecars, audio goes through
//! `arecord`/`aplay`-style commands, the touch panel is read from evdev and
//! the LED strip speaks WLED JSON over a serial line.

pub mod app;
pub mod audio;
pub mod backend;
pub mod camera;
pub mod config;
pub mod face;
pub mod leds;
pub mod logging;
pub mod touch;
pub mod vad;
pub mod vision;

pub use app::run;
pub use audio::{CommandMicrophone, CommandSpeaker};
pub use backend::HttpDialogue;
pub use camera::SnapshotCamera;
pub use config::Cli;
pub use face::LogFace;
pub use leds::SerialLeds;
pub use logging::init_logging;
pub use touch::EvdevTouch;
pub use vad::EnergyVad;
pub use vision::HttpVision;
