use std::fmt;

/// Behavioural state of the robot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RobotState {
    Idle,
    IdlePresence,
    Listening,
    ListeningWithoutCam,
    Recording,
    ProcessingQuery,
    Speaking,
}

impl RobotState {
    /// Every state, in declaration order.
    pub const ALL: [RobotState; 7] = [
        RobotState::Idle,
        RobotState::IdlePresence,
        RobotState::Listening,
        RobotState::ListeningWithoutCam,
        RobotState::Recording,
        RobotState::ProcessingQuery,
        RobotState::Speaking,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            RobotState::Idle => "idle",
            RobotState::IdlePresence => "idle_presence",
            RobotState::Listening => "listening",
            RobotState::ListeningWithoutCam => "listening_without_cam",
            RobotState::Recording => "recording",
            RobotState::ProcessingQuery => "processing_query",
            RobotState::Speaking => "speaking",
        }
    }
}

impl fmt::Display for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything the dispatcher knows about the current interaction.
///
/// Owned by the dispatcher task; other components only see it through
/// notifications they post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RobotContext {
    pub state: RobotState,
    pub username: Option<String>,
    pub continue_conversation: bool,
    pub pending_proactive_question: Option<String>,
    pub unknown_user_streak: u32,
}

impl Default for RobotContext {
    fn default() -> Self {
        Self {
            state: RobotState::Idle,
            username: None,
            continue_conversation: false,
            pending_proactive_question: None,
            unknown_user_streak: 0,
        }
    }
}

impl RobotContext {
    /// Forget the current interlocutor and conversation flags.
    pub fn reset_conversation(&mut self) {
        self.username = None;
        self.pending_proactive_question = None;
        self.continue_conversation = false;
        self.unknown_user_streak = 0;
    }

    /// Drop the speaker's identity after a query that heard nothing.
    ///
    /// The unknown-user streak is kept: the next unidentified reply still
    /// counts towards asking for a name.
    pub fn forget_speaker(&mut self) {
        self.username = None;
        self.pending_proactive_question = None;
    }
}
