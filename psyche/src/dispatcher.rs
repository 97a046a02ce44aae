//! The single consumer of the event queue and sole owner of robot state.

use crate::camera::CameraManager;
use crate::config::CoreConfig;
use crate::conversation::{ConversationStore, Message};
use crate::gateway::{Outcome, QueryGateway};
use crate::notification::{
    AlarmKind, CASUAL_ASK_KNOWN_USERNAME, Candidates, HOW_ARE_YOU, Notification,
    ProactiveQuestion, WHO_ARE_YOU, WHO_ARE_YOU_RESPONSE,
};
use crate::proactive::{ProactiveScheduler, ScheduleKind, SensorCue};
use crate::queue::{EventReceiver, EventSender};
use crate::state::{RobotContext, RobotState};
use crate::timer::ListenWatchdog;
use crate::traits::{
    DialogueBackend, EnrollmentService, Expression, Face, LedState, Leds, Mouth, QueryRequest,
    QueryResponse, ResponseAction, SensorService, palette,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Services and actuators the dispatcher drives.
pub struct Collaborators {
    pub gaze: Arc<dyn SensorService>,
    pub presence: Arc<dyn SensorService>,
    pub microphone: Arc<dyn SensorService>,
    pub touch: Arc<dyn SensorService>,
    pub enrollment: Arc<dyn EnrollmentService>,
    pub mouth: Arc<dyn Mouth>,
    pub leds: Arc<dyn Leds>,
    pub face: Arc<dyn Face>,
    pub conversations: Arc<dyn ConversationStore>,
    pub camera: Arc<CameraManager>,
    /// Played whenever a dialogue query times out or fails.
    pub fallback_audio: Vec<u8>,
    /// Played once during shutdown.
    pub farewell_audio: Vec<u8>,
}

/// Whether the dispatch loop keeps going.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

/// Guarded state machine over [`Notification`]s.
///
/// Each notification names a transition with a fixed set of source states;
/// when the current state is not one of them the notification is discarded
/// and nothing changes. Dialogue queries are awaited inline, so no other
/// notification is handled until the gateway resolves.
pub struct Dispatcher {
    ctx: RobotContext,
    events: EventReceiver,
    gateway: QueryGateway,
    scheduler: ProactiveScheduler,
    watchdog: ListenWatchdog,
    io: Collaborators,
    config: CoreConfig,
}

impl Dispatcher {
    /// Build the dispatcher. Must be called inside a tokio runtime since the
    /// query gateway spawns its workers here.
    pub fn new(
        config: CoreConfig,
        sender: EventSender,
        events: EventReceiver,
        backend: Arc<dyn DialogueBackend>,
        io: Collaborators,
    ) -> Self {
        let known_users = io.conversations.known_users().unwrap_or_else(|e| {
            warn!(error = %e, "could not read known users");
            Vec::new()
        });
        let requests = sender.clone();
        let scheduler = ProactiveScheduler::new(
            config.alarms.clone(),
            known_users,
            Utc::now(),
            move |question| requests.post(Notification::ProactiveQuestionRequested(question)),
        );
        let gateway = QueryGateway::new(backend, config.query_workers, config.query_timeout);
        let watchdog = ListenWatchdog::new(config.listen_timeout, sender);
        Self {
            ctx: RobotContext::default(),
            events,
            gateway,
            scheduler,
            watchdog,
            io,
            config,
        }
    }

    pub fn context(&self) -> &RobotContext {
        &self.ctx
    }

    pub fn scheduler(&self) -> &ProactiveScheduler {
        &self.scheduler
    }

    pub fn gateway(&self) -> &QueryGateway {
        &self.gateway
    }

    pub fn watchdog(&self) -> &ListenWatchdog {
        &self.watchdog
    }

    /// Start the always-on services, dispatch until shutdown, then tear down.
    pub async fn run(mut self) {
        self.io.touch.start().await;
        self.io.presence.start().await;
        info!("ready");
        while let Some(Flow::Continue) = self.step().await {}
        self.teardown().await;
    }

    /// Wait for the next notification and apply it. `None` once every
    /// producer is gone.
    pub async fn step(&mut self) -> Option<Flow> {
        let notification = self.events.next().await?;
        Some(self.handle(notification).await)
    }

    /// Apply one notification.
    pub async fn handle(&mut self, notification: Notification) -> Flow {
        let transition = notification.transition();
        if !transition.accepts(self.ctx.state) {
            info!(%transition, state = %self.ctx.state, "transition discarded");
            return Flow::Continue;
        }
        info!(%transition, state = %self.ctx.state, "handling transition");

        match notification {
            Notification::PersonDetected => {
                self.set_state(RobotState::IdlePresence);
                self.io.leds.show(LedState::Static(palette::ATTRACT));
                self.io.gaze.start().await;
            }
            Notification::RoomEmpty => {
                self.set_state(RobotState::Idle);
                self.ctx.username = None;
                self.leds_off();
                self.io.gaze.stop().await;
            }
            Notification::PersonDetectedLongTime => {
                if self.ctx.username.is_none() {
                    self.scheduler.on_sensor_event(&SensorCue::Presence, Utc::now());
                }
            }
            Notification::GazeConfirmedClose => {
                self.set_state(RobotState::Listening);
                self.io.leds.show(LedState::Loop(palette::LISTEN));
                self.io.presence.stop().await;
                self.io.microphone.start().await;
            }
            Notification::GazeLost | Notification::GazeTooFar => {
                self.ctx.username = None;
                if self.ctx.state == RobotState::Listening {
                    self.set_state(RobotState::IdlePresence);
                    self.leds_off();
                    self.io.microphone.stop().await;
                    self.io.presence.start().await;
                }
            }
            Notification::IdentityMatched(candidates) => self.identity_matched(&candidates),
            Notification::EnrollmentProgress(percent) => {
                self.enrollment_progress(percent).await
            }
            Notification::EnrollmentAbandoned => {
                info!(state = %self.ctx.state, "face enrolment abandoned");
                self.restore_leds();
            }
            Notification::SpeechStarted => {
                if self.ctx.state == RobotState::Listening {
                    self.io.gaze.stop().await;
                    self.load_history();
                } else {
                    self.watchdog.disarm();
                }
                self.set_state(RobotState::Recording);
                self.io.leds.show(LedState::Loop(palette::RECORD));
            }
            Notification::SpeechFinished(audio) => self.process_utterance(audio).await,
            Notification::PlaybackFinished => {
                if self.ctx.continue_conversation {
                    self.listen_without_camera().await;
                } else {
                    self.conclude_conversation().await;
                }
            }
            Notification::ListenTimedOut => {
                info!("nobody spoke; ending conversation");
                self.io.microphone.stop().await;
                self.conclude_conversation().await;
            }
            Notification::ProactiveQuestionRequested(ProactiveQuestion::HowAreYou {
                reason,
                username,
            }) => self.ask_how_are_you(reason, username).await,
            Notification::ProactiveQuestionRequested(ProactiveQuestion::WhoAreYou) => {
                self.ask_who_are_you().await
            }
            Notification::TouchShutdownGesture | Notification::Shutdown => {
                info!("shutdown requested");
                return Flow::Shutdown;
            }
        }
        Flow::Continue
    }

    fn set_state(&mut self, state: RobotState) {
        debug!(from = %self.ctx.state, to = %state, "state changed");
        self.ctx.state = state;
    }

    fn leds_off(&self) {
        self.io.leds.show(LedState::Static(palette::OFF));
    }

    /// Lighting that goes with the current state.
    fn restore_leds(&self) {
        let state = match self.ctx.state {
            RobotState::Listening | RobotState::ListeningWithoutCam => LedState::Loop(palette::LISTEN),
            RobotState::Recording => LedState::Loop(palette::RECORD),
            _ => LedState::Static(palette::OFF),
        };
        self.io.leds.show(state);
    }

    fn load_history(&self) {
        let Some(username) = self.ctx.username.as_deref() else {
            return;
        };
        if let Err(e) = self.io.conversations.load_history(username) {
            warn!(username, error = %e, "could not load conversation history");
        }
    }

    fn identity_matched(&mut self, candidates: &Candidates) {
        let mut best: Option<(&String, u32)> = None;
        for (name, count) in candidates {
            if let Some(name) = name {
                if best.is_none_or(|(_, top)| *count > top) {
                    best = Some((name, *count));
                }
            }
        }
        if let Some((name, _)) = best {
            info!(username = %name, "user recognized");
            self.ctx.username = Some(name.clone());
            self.scheduler
                .on_sensor_event(&SensorCue::CloseFace(name.clone()), Utc::now());
        } else if candidates.get(&None).is_some_and(|n| *n >= 3) {
            self.scheduler.on_sensor_event(&SensorCue::UnknownFace, Utc::now());
        }
    }

    async fn enrollment_progress(&mut self, percent: f32) {
        info!(percent, state = %self.ctx.state, "face enrolment progress");
        let shown = percent.clamp(0.0, 100.0).round() as u8;
        self.io.leds.show(LedState::Progress(palette::ENROLL, shown));
        if percent >= 100.0 {
            self.io.enrollment.stop().await;
            self.restore_leds();
        }
    }

    fn request(&self, audio: Option<Vec<u8>>, proactive_question: Option<String>) -> QueryRequest {
        QueryRequest {
            audio,
            username: self.ctx.username.clone(),
            proactive_question,
            history: self.io.conversations.history(),
        }
    }

    async fn process_utterance(&mut self, audio: Vec<u8>) {
        self.set_state(RobotState::ProcessingQuery);
        self.leds_off();
        self.io.microphone.stop().await;

        let request = self.request(Some(audio), self.ctx.pending_proactive_question.clone());
        match self.gateway.submit(request).await {
            Outcome::Success(Some(response)) => self.answer(response).await,
            Outcome::Success(None) if self.ctx.continue_conversation => {
                info!("no speech in audio; still listening");
                self.listen_without_camera().await;
            }
            Outcome::Success(None) => {
                info!("no speech in audio; back to idle");
                self.set_state(RobotState::IdlePresence);
                self.ctx.forget_speaker();
                self.io.face.show(&Expression::Neutral);
                self.leds_off();
                self.io.presence.start().await;
                self.io.gaze.start().await;
            }
            failure => self.fallback(failure),
        }
    }

    async fn answer(&mut self, response: QueryResponse) {
        match response.action {
            Some(ResponseAction::EnrollFace) => match response.action_username.clone() {
                Some(name) => {
                    info!(username = %name, "enrolling new face");
                    self.ctx.username = Some(name.clone());
                    self.io.enrollment.enroll(&name).await;
                    self.scheduler.on_user_enrolled(&name, Utc::now());
                }
                None => warn!("face enrolment requested without a username"),
            },
            Some(ResponseAction::SetUsername) => match response.action_username.clone() {
                Some(name) => {
                    info!(username = %name, streak = self.ctx.unknown_user_streak, "username learned");
                    self.ctx.username = Some(name);
                    self.ctx.unknown_user_streak = 0;
                    self.load_history();
                }
                None => warn!("username update without a username"),
            },
            None => {}
        }

        self.ctx.continue_conversation = response.continue_conversation;
        self.ctx.pending_proactive_question = None;
        self.speak(response);

        if self.ctx.username.is_none() {
            self.ctx.unknown_user_streak += 1;
            if self.ctx.unknown_user_streak >= self.config.unknown_user_threshold {
                info!(streak = self.ctx.unknown_user_streak, "will ask for the speaker's name");
                self.ctx.pending_proactive_question = Some(CASUAL_ASK_KNOWN_USERNAME.to_string());
            }
        }
    }

    /// Record and play a reply.
    fn speak(&mut self, response: QueryResponse) {
        if let Some(heard) = response.transcript {
            self.io.conversations.record(Message::user(heard));
        }
        if let Some(said) = response.text {
            self.io.conversations.record(Message::assistant(said));
        }
        self.set_state(RobotState::Speaking);
        self.io.face.show(&Expression::from_mood(&response.mood));
        self.io.leds.show(LedState::Breathe(palette::LISTEN));
        self.io.mouth.speak(response.audio);
    }

    fn fallback(&mut self, outcome: Outcome) {
        match &outcome {
            Outcome::TimedOut => error!(timeout = ?self.gateway.timeout(), "dialogue query timed out"),
            Outcome::Failed(e) => error!(error = %format!("{e:#}"), "dialogue query failed"),
            Outcome::Success(_) => error!("dialogue backend gave no answer"),
        }
        self.ctx.continue_conversation = false;
        self.ctx.pending_proactive_question = None;
        self.set_state(RobotState::Speaking);
        self.io.leds.show(LedState::Breathe(palette::ERROR));
        self.io.mouth.speak(self.io.fallback_audio.clone());
    }

    async fn listen_without_camera(&mut self) {
        self.set_state(RobotState::ListeningWithoutCam);
        self.io.leds.show(LedState::Loop(palette::LISTEN));
        self.io.microphone.start().await;
        self.watchdog.arm();
    }

    async fn conclude_conversation(&mut self) {
        let username = self.ctx.username.clone();
        if let Err(e) = self.io.conversations.dump_history(username.as_deref()) {
            warn!(error = %e, "could not save conversation history");
        }
        self.scheduler
            .on_question_scheduled(ScheduleKind::ConversationEnded(username), Utc::now());
        self.ctx.reset_conversation();
        self.set_state(RobotState::IdlePresence);
        self.io.face.show(&Expression::Neutral);
        self.leds_off();
        self.io.enrollment.stop().await;
        self.io.presence.start().await;
        self.io.gaze.start().await;
    }

    async fn ask_how_are_you(&mut self, reason: AlarmKind, username: Option<String>) {
        let question = ProactiveQuestion::HowAreYou {
            reason,
            username: username.clone(),
        };
        if !self.scheduler.is_due(&question, Utc::now()) {
            info!(?question, "proactive question no longer due");
            return;
        }
        self.set_state(RobotState::ProcessingQuery);
        self.leds_off();
        self.io.gaze.stop().await;
        self.io.presence.stop().await;
        self.io.microphone.stop().await;
        self.ctx.username = username.clone();
        self.load_history();

        let request = self.request(None, Some(HOW_ARE_YOU.to_string()));
        match self.gateway.submit(request).await {
            Outcome::Success(Some(response)) => {
                self.ctx.continue_conversation = true;
                self.speak(response);
                let kind = match (reason, username) {
                    (AlarmKind::CloseFace, Some(user)) => ScheduleKind::UserAsked(user),
                    _ => ScheduleKind::PresenceAsked,
                };
                self.scheduler.on_question_scheduled(kind, Utc::now());
            }
            failure => self.fallback(failure),
        }
    }

    async fn ask_who_are_you(&mut self) {
        self.set_state(RobotState::ProcessingQuery);
        self.leds_off();
        self.io.microphone.stop().await;
        self.io.gaze.stop().await;

        let request = self.request(None, Some(WHO_ARE_YOU.to_string()));
        match self.gateway.submit(request).await {
            Outcome::Success(Some(response)) => {
                self.ctx.pending_proactive_question = Some(WHO_ARE_YOU_RESPONSE.to_string());
                self.ctx.continue_conversation = true;
                self.speak(response);
                self.load_history();
            }
            failure => self.fallback(failure),
        }
    }

    /// Shutdown sequence: stop input, say goodbye, save, release hardware.
    async fn teardown(&mut self) {
        info!("shutting down");
        self.watchdog.disarm();
        self.io.touch.stop().await;
        self.io.presence.stop().await;
        self.io
            .mouth
            .speak_and_wait(self.io.farewell_audio.clone())
            .await;
        if let Err(e) = self
            .io
            .conversations
            .dump_history(self.ctx.username.as_deref())
        {
            warn!(error = %e, "could not save conversation history");
        }
        self.io.face.show(&Expression::Asleep);
        self.io.gaze.stop().await;
        self.io.microphone.stop().await;
        self.io.enrollment.shutdown().await;
        self.gateway.shutdown().await;
        self.io.camera.shutdown();
        self.io.leds.power_off();
        info!(late_discards = self.gateway.late_discards(), "stopped");
    }
}
