use crate::state::RobotState;
use std::collections::BTreeMap;
use std::fmt;

/// Per-name sighting counts reported by the face recognizer.
///
/// `None` counts faces that matched nobody in the face database.
pub type Candidates = BTreeMap<Option<String>, u32>;

/// Proactive question tag sent to the dialogue backend.
pub const HOW_ARE_YOU: &str = "how_are_you";
/// Proactive question tag asking an unknown person for their name.
pub const WHO_ARE_YOU: &str = "who_are_you";
/// Tag carried by the query that answers [`WHO_ARE_YOU`].
pub const WHO_ARE_YOU_RESPONSE: &str = "who_are_you_response";
/// Tag nudging the backend to casually ask an unknown speaker's name.
pub const CASUAL_ASK_KNOWN_USERNAME: &str = "casual_ask_known_username";

/// Why a "how are you" question became due.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlarmKind {
    /// Someone has been in the room for a while without engaging.
    Presence,
    /// A recognized user is looking at the robot.
    CloseFace,
}

/// A question the robot asks without being spoken to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProactiveQuestion {
    HowAreYou {
        reason: AlarmKind,
        username: Option<String>,
    },
    WhoAreYou,
}

impl ProactiveQuestion {
    pub fn tag(&self) -> &'static str {
        match self {
            ProactiveQuestion::HowAreYou { .. } => HOW_ARE_YOU,
            ProactiveQuestion::WhoAreYou => WHO_ARE_YOU,
        }
    }
}

/// A message posted to the event queue.
///
/// Sensor services, the speaker, the proactive scheduler and the listen
/// watchdog only ever communicate with the dispatcher through these.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    PersonDetected,
    PersonDetectedLongTime,
    RoomEmpty,
    GazeConfirmedClose,
    GazeLost,
    GazeTooFar,
    IdentityMatched(Candidates),
    EnrollmentProgress(f32),
    /// The recorder gave up: nobody stayed in front of the camera.
    EnrollmentAbandoned,
    SpeechStarted,
    SpeechFinished(Vec<u8>),
    PlaybackFinished,
    TouchShutdownGesture,
    ProactiveQuestionRequested(ProactiveQuestion),
    ListenTimedOut,
    Shutdown,
}

impl Notification {
    /// The guarded transition this notification asks for.
    pub fn transition(&self) -> Transition {
        match self {
            Notification::PersonDetected => Transition::IdleToIdlePresence,
            Notification::PersonDetectedLongTime => Transition::PresenceLingering,
            Notification::RoomEmpty => Transition::IdlePresenceToIdle,
            Notification::GazeConfirmedClose => Transition::IdlePresenceToListening,
            Notification::GazeLost | Notification::GazeTooFar => Transition::LookedAway,
            Notification::IdentityMatched(_) => Transition::IdentityUpdate,
            Notification::EnrollmentProgress(_) => Transition::EnrollmentProgress,
            Notification::EnrollmentAbandoned => Transition::EnrollmentAbandoned,
            Notification::SpeechStarted => Transition::StartRecording,
            Notification::SpeechFinished(_) => Transition::RecordingToProcessingQuery,
            Notification::PlaybackFinished => Transition::FinishSpeaking,
            Notification::ListenTimedOut => Transition::ListeningWithoutCamToIdlePresence,
            Notification::ProactiveQuestionRequested(ProactiveQuestion::HowAreYou { .. }) => {
                Transition::AskHowAreYou
            }
            Notification::ProactiveQuestionRequested(ProactiveQuestion::WhoAreYou) => {
                Transition::AskWhoAreYou
            }
            Notification::TouchShutdownGesture | Notification::Shutdown => Transition::Shutdown,
        }
    }
}

/// Identifier of a guarded `(source states -> destination)` action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    IdleToIdlePresence,
    IdlePresenceToIdle,
    PresenceLingering,
    IdlePresenceToListening,
    LookedAway,
    IdentityUpdate,
    EnrollmentProgress,
    EnrollmentAbandoned,
    StartRecording,
    RecordingToProcessingQuery,
    FinishSpeaking,
    ListeningWithoutCamToIdlePresence,
    AskHowAreYou,
    AskWhoAreYou,
    Shutdown,
}

impl Transition {
    pub const ALL: [Transition; 15] = [
        Transition::IdleToIdlePresence,
        Transition::IdlePresenceToIdle,
        Transition::PresenceLingering,
        Transition::IdlePresenceToListening,
        Transition::LookedAway,
        Transition::IdentityUpdate,
        Transition::EnrollmentProgress,
        Transition::EnrollmentAbandoned,
        Transition::StartRecording,
        Transition::RecordingToProcessingQuery,
        Transition::FinishSpeaking,
        Transition::ListeningWithoutCamToIdlePresence,
        Transition::AskHowAreYou,
        Transition::AskWhoAreYou,
        Transition::Shutdown,
    ];

    /// States in which the transition may fire.
    pub const fn sources(self) -> &'static [RobotState] {
        use RobotState::*;
        match self {
            Transition::IdleToIdlePresence => &[Idle],
            Transition::IdlePresenceToIdle
            | Transition::PresenceLingering
            | Transition::IdlePresenceToListening => &[IdlePresence],
            Transition::LookedAway | Transition::IdentityUpdate | Transition::AskHowAreYou => {
                &[IdlePresence, Listening]
            }
            Transition::EnrollmentProgress
            | Transition::EnrollmentAbandoned
            | Transition::Shutdown => &RobotState::ALL,
            Transition::StartRecording => &[Listening, ListeningWithoutCam],
            Transition::RecordingToProcessingQuery => &[Recording],
            Transition::FinishSpeaking => &[Speaking],
            Transition::ListeningWithoutCamToIdlePresence => &[ListeningWithoutCam],
            Transition::AskWhoAreYou => &[Listening],
        }
    }

    /// Whether the transition is allowed from `state`.
    pub fn accepts(self, state: RobotState) -> bool {
        self.sources().contains(&state)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Transition::IdleToIdlePresence => "idle2idle_presence",
            Transition::IdlePresenceToIdle => "idle_presence2idle",
            Transition::PresenceLingering => "idle_presence_lingering",
            Transition::IdlePresenceToListening => "idle_presence2listening",
            Transition::LookedAway => "looked_away",
            Transition::IdentityUpdate => "identity_update",
            Transition::EnrollmentProgress => "recording_face",
            Transition::EnrollmentAbandoned => "recording_face_abandoned",
            Transition::StartRecording => "listening2recording",
            Transition::RecordingToProcessingQuery => "recording2processing_query",
            Transition::FinishSpeaking => "speaking_finished",
            Transition::ListeningWithoutCamToIdlePresence => "listening_without_cam2idle_presence",
            Transition::AskHowAreYou => "proactive_how_are_you",
            Transition::AskWhoAreYou => "proactive_who_are_you",
            Transition::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
