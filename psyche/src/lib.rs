//! Control core of a social robot.
//!
//! Sensor services post [`Notification`]s onto a single [`EventQueue`]; the
//! [`Dispatcher`] consumes them one at a time, owns the [`RobotContext`] and
//! drives every service and actuator in response.

pub mod camera;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod handoff;
pub mod notification;
pub mod playback;
pub mod proactive;
pub mod queue;
pub mod services;
pub mod state;
pub mod timer;
pub mod traits;
pub mod worker;

pub use camera::{CameraLease, CameraManager, CaptureDevice, Frame, FrameSink, ServiceId};
pub use config::{AlarmHorizons, CoreConfig};
pub use conversation::{ConversationStore, JsonConversationStore, Message, Role};
pub use dispatcher::{Collaborators, Dispatcher, Flow};
pub use error::{Error, Result};
pub use gateway::{Outcome, PendingQuery, QueryGateway};
pub use handoff::HandOff;
pub use notification::{AlarmKind, Candidates, Notification, ProactiveQuestion, Transition};
pub use playback::PlaybackMouth;
pub use proactive::{AlarmTable, ProactiveScheduler, ScheduleKind, SensorCue};
pub use queue::{EventQueue, EventReceiver, EventSender};
pub use state::{RobotContext, RobotState};
pub use timer::{ListenWatchdog, Timer};
pub use traits::*;
pub use worker::{ServiceRunner, WorkerGroup};
