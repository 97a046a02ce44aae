//! Deadlines for unprompted check-in questions.
//!
//! The scheduler has no loop of its own: sensor cues check deadlines, and the
//! dispatcher advances them once a question was asked or a conversation ended.
//! Every operation takes the current time so behaviour is reproducible.

use crate::config::AlarmHorizons;
use crate::notification::{AlarmKind, ProactiveQuestion};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Current proactive deadlines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AlarmTable {
    pub next_presence_question_at: DateTime<Utc>,
    /// Users without an entry have no alarm armed.
    pub next_per_user_question_at: BTreeMap<String, DateTime<Utc>>,
}

/// Sensor observation that may make a question due.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SensorCue {
    /// Someone has lingered in front of the robot.
    Presence,
    /// A recognized user is close and looking.
    CloseFace(String),
    /// An unknown face has been seen repeatedly.
    UnknownFace,
}

/// Event that moves deadlines forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduleKind {
    /// The presence "how are you" was asked.
    PresenceAsked,
    /// The per-user "how are you" was asked to this user.
    UserAsked(String),
    /// A conversation ended, with the user if one was identified.
    ConversationEnded(Option<String>),
}

type Callback = Box<dyn Fn(ProactiveQuestion) + Send + Sync>;

pub struct ProactiveScheduler {
    table: AlarmTable,
    horizons: AlarmHorizons,
    request: Callback,
}

impl ProactiveScheduler {
    /// Seed the first presence deadline and one per-user deadline for every
    /// user in `known_users`. `request` is invoked when a question is due.
    pub fn new<F>(
        horizons: AlarmHorizons,
        known_users: impl IntoIterator<Item = String>,
        now: DateTime<Utc>,
        request: F,
    ) -> Self
    where
        F: Fn(ProactiveQuestion) + Send + Sync + 'static,
    {
        let table = AlarmTable {
            next_presence_question_at: now + horizons.first_presence,
            next_per_user_question_at: known_users
                .into_iter()
                .map(|user| (user, now + horizons.per_user))
                .collect(),
        };
        info!(
            presence = %table.next_presence_question_at,
            users = table.next_per_user_question_at.len(),
            "proactive alarms seeded"
        );
        Self {
            table,
            horizons,
            request: Box::new(request),
        }
    }

    pub fn table(&self) -> &AlarmTable {
        &self.table
    }

    /// Check the deadline relevant to `cue`; never advances anything.
    pub fn on_sensor_event(&self, cue: &SensorCue, now: DateTime<Utc>) {
        let question = match cue {
            SensorCue::Presence => ProactiveQuestion::HowAreYou {
                reason: AlarmKind::Presence,
                username: None,
            },
            SensorCue::CloseFace(user) => ProactiveQuestion::HowAreYou {
                reason: AlarmKind::CloseFace,
                username: Some(user.clone()),
            },
            SensorCue::UnknownFace => ProactiveQuestion::WhoAreYou,
        };
        if self.is_due(&question, now) {
            debug!(?question, "proactive question due");
            (self.request)(question);
        }
    }

    /// Whether `question` may be asked at `now`.
    pub fn is_due(&self, question: &ProactiveQuestion, now: DateTime<Utc>) -> bool {
        match question {
            ProactiveQuestion::HowAreYou {
                reason: AlarmKind::Presence,
                ..
            } => self.table.next_presence_question_at <= now,
            ProactiveQuestion::HowAreYou {
                reason: AlarmKind::CloseFace,
                username,
            } => username
                .as_ref()
                .and_then(|u| self.table.next_per_user_question_at.get(u))
                .is_some_and(|at| *at <= now),
            ProactiveQuestion::WhoAreYou => true,
        }
    }

    /// Advance deadlines after a question or conversation.
    pub fn on_question_scheduled(&mut self, kind: ScheduleKind, now: DateTime<Utc>) {
        let h = &self.horizons;
        let (presence, user, grace_all) = match &kind {
            ScheduleKind::PresenceAsked => (h.after_presence_question, None, false),
            ScheduleKind::UserAsked(user) => (h.after_user_question, Some(user.clone()), false),
            ScheduleKind::ConversationEnded(user) => {
                (h.after_user_question, user.clone(), user.is_none())
            }
        };
        let per_user = h.per_user;
        let grace = h.grace;

        self.advance_presence(now + presence);
        if let Some(user) = user {
            self.advance_user(user, now + per_user);
        }
        if grace_all {
            let floor = now + grace;
            for at in self.table.next_per_user_question_at.values_mut() {
                *at = (*at).max(floor);
            }
        }
        info!(
            ?kind,
            presence = %self.table.next_presence_question_at,
            "proactive alarms advanced"
        );
    }

    /// Arm a fresh deadline for a newly enrolled user.
    pub fn on_user_enrolled(&mut self, username: &str, now: DateTime<Utc>) {
        self.advance_user(username.to_string(), now + self.horizons.per_user);
        info!(username, "user added to proactive alarms");
    }

    /// Set the presence deadline to `at`, even if that is earlier.
    pub fn postpone_presence(&mut self, at: DateTime<Utc>) {
        self.table.next_presence_question_at = at;
        info!(presence = %at, "presence question postponed");
    }

    fn advance_presence(&mut self, at: DateTime<Utc>) {
        let current = &mut self.table.next_presence_question_at;
        *current = (*current).max(at);
    }

    fn advance_user(&mut self, user: String, at: DateTime<Utc>) {
        self.table
            .next_per_user_question_at
            .entry(user)
            .and_modify(|current| *current = (*current).max(at))
            .or_insert(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::{Arc, Mutex};

    fn scheduler(users: &[&str]) -> (ProactiveScheduler, Arc<Mutex<Vec<ProactiveQuestion>>>, DateTime<Utc>) {
        let asked = Arc::new(Mutex::new(Vec::new()));
        let sink = asked.clone();
        let now = Utc::now();
        let s = ProactiveScheduler::new(
            AlarmHorizons::default(),
            users.iter().map(|u| u.to_string()),
            now,
            move |q| sink.lock().unwrap().push(q),
        );
        (s, asked, now)
    }

    #[test]
    fn presence_question_waits_for_deadline() {
        let (s, asked, now) = scheduler(&[]);
        s.on_sensor_event(&SensorCue::Presence, now + Duration::minutes(29));
        assert!(asked.lock().unwrap().is_empty());
        s.on_sensor_event(&SensorCue::Presence, now + Duration::minutes(30));
        assert_eq!(asked.lock().unwrap().len(), 1);
    }

    #[test]
    fn unknown_user_has_no_alarm() {
        let (s, asked, now) = scheduler(&["ana"]);
        s.on_sensor_event(&SensorCue::CloseFace("bob".into()), now + Duration::hours(5));
        assert!(asked.lock().unwrap().is_empty());
        s.on_sensor_event(&SensorCue::CloseFace("ana".into()), now + Duration::hours(5));
        assert_eq!(
            asked.lock().unwrap()[0],
            ProactiveQuestion::HowAreYou {
                reason: AlarmKind::CloseFace,
                username: Some("ana".into())
            }
        );
    }

    #[test]
    fn sensor_events_never_move_deadlines() {
        let (s, _, now) = scheduler(&["ana"]);
        let before = s.table().clone();
        s.on_sensor_event(&SensorCue::Presence, now + Duration::hours(1));
        s.on_sensor_event(&SensorCue::UnknownFace, now + Duration::hours(1));
        assert_eq!(s.table(), &before);
    }

    #[test]
    fn user_question_advances_user_and_presence() {
        let (mut s, _, now) = scheduler(&["ana"]);
        let later = now + Duration::hours(1);
        s.on_question_scheduled(ScheduleKind::UserAsked("ana".into()), later);
        assert_eq!(s.table().next_per_user_question_at["ana"], later + Duration::minutes(30));
        assert_eq!(s.table().next_presence_question_at, later + Duration::hours(2));
    }

    #[test]
    fn ending_without_user_applies_grace_to_everyone() {
        let (mut s, _, now) = scheduler(&["ana", "bob"]);
        let later = now + Duration::hours(1);
        s.on_question_scheduled(ScheduleKind::ConversationEnded(None), later);
        for at in s.table().next_per_user_question_at.values() {
            assert_eq!(*at, later + Duration::minutes(10));
        }
    }

    #[test]
    fn deadlines_never_move_backward() {
        let (mut s, _, now) = scheduler(&["ana"]);
        let kinds = [
            ScheduleKind::PresenceAsked,
            ScheduleKind::UserAsked("ana".into()),
            ScheduleKind::ConversationEnded(None),
            ScheduleKind::ConversationEnded(Some("ana".into())),
        ];
        let mut previous = s.table().clone();
        for (i, kind) in kinds.iter().cycle().take(16).enumerate() {
            let t = now + Duration::minutes(7 * i as i64);
            s.on_question_scheduled(kind.clone(), t);
            s.on_user_enrolled("ana", t);
            let table = s.table().clone();
            assert!(table.next_presence_question_at >= previous.next_presence_question_at);
            for (user, at) in &previous.next_per_user_question_at {
                assert!(table.next_per_user_question_at[user] >= *at);
            }
            previous = table;
        }
    }

    #[test]
    fn explicit_postponement_may_move_backward() {
        let (mut s, _, now) = scheduler(&[]);
        s.postpone_presence(now);
        assert_eq!(s.table().next_presence_question_at, now);
    }
}
