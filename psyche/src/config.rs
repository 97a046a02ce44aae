use chrono::Duration as ChronoDuration;
use std::time::Duration;

/// Timing and threshold knobs for the control core.
///
/// The binary builds this from its command line; tests shrink the timeouts.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Inactivity bound while listening after a reply that invites speech.
    pub listen_timeout: Duration,
    /// Hard bound on a single dialogue backend call.
    pub query_timeout: Duration,
    /// Number of workers serving the dialogue backend.
    pub query_workers: usize,
    /// Replies to an unknown user before the next query asks for a name.
    pub unknown_user_threshold: u32,
    /// Proactive alarm horizons.
    pub alarms: AlarmHorizons,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            listen_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(15),
            query_workers: 10,
            unknown_user_threshold: 1,
            alarms: AlarmHorizons::default(),
        }
    }
}

/// How far ahead proactive deadlines are placed.
#[derive(Clone, Debug)]
pub struct AlarmHorizons {
    /// First presence question after startup.
    pub first_presence: ChronoDuration,
    /// Next presence question after one was asked.
    pub after_presence_question: ChronoDuration,
    /// Next presence question after a per-user question or a conversation.
    pub after_user_question: ChronoDuration,
    /// Next per-user question.
    pub per_user: ChronoDuration,
    /// Shift applied to every per-user deadline when no user is known.
    pub grace: ChronoDuration,
}

impl Default for AlarmHorizons {
    fn default() -> Self {
        Self {
            first_presence: ChronoDuration::minutes(30),
            after_presence_question: ChronoDuration::hours(4),
            after_user_question: ChronoDuration::hours(2),
            per_user: ChronoDuration::minutes(30),
            grace: ChronoDuration::minutes(10),
        }
    }
}
