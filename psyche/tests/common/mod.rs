#![allow(dead_code)]

use async_trait::async_trait;
use psyche::{
    CameraManager, CaptureDevice, Collaborators, ConversationStore, CoreConfig, Expression, Face,
    DialogueBackend, Dispatcher, EnrollmentService, EventQueue, EventSender, FrameSink, LedState,
    Leds, Message, Mouth, Notification, QueryRequest, QueryResponse, SensorService,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared, ordered record of every call made to the fakes.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == entry)
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == entry)
    }
}

pub struct FakeService {
    name: &'static str,
    log: CallLog,
}

#[async_trait]
impl SensorService for FakeService {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn start(&self) {
        self.log.push(format!("{}:start", self.name));
    }

    async fn stop(&self) {
        self.log.push(format!("{}:stop", self.name));
    }
}

pub struct FakeEnrollment(CallLog);

#[async_trait]
impl EnrollmentService for FakeEnrollment {
    async fn enroll(&self, username: &str) {
        self.0.push(format!("enroll:{username}"));
    }

    async fn stop(&self) {
        self.0.push("enrollment:stop");
    }
}

/// Records what was played; tests post `PlaybackFinished` themselves.
pub struct FakeMouth(CallLog);

#[async_trait]
impl Mouth for FakeMouth {
    fn speak(&self, audio: Vec<u8>) {
        self.0.push(format!("speak:{}", String::from_utf8_lossy(&audio)));
    }

    async fn speak_and_wait(&self, audio: Vec<u8>) {
        self.0.push(format!("farewell:{}", String::from_utf8_lossy(&audio)));
    }
}

pub struct FakeLeds(CallLog);

impl Leds for FakeLeds {
    fn show(&self, state: LedState) {
        self.0.push(format!("leds:{state:?}"));
    }

    fn power_off(&self) {
        self.0.push("leds:power_off");
    }
}

pub struct FakeFace(CallLog);

impl Face for FakeFace {
    fn show(&self, expression: &Expression) {
        self.0.push(format!("face:{}", expression.name()));
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub turns: Mutex<Vec<Message>>,
    pub dumps: Mutex<Vec<Option<String>>>,
    pub loads: Mutex<Vec<String>>,
    pub users: Vec<String>,
}

impl ConversationStore for MemoryStore {
    fn load_history(&self, username: &str) -> anyhow::Result<()> {
        self.loads.lock().unwrap().push(username.to_string());
        Ok(())
    }

    fn dump_history(&self, username: Option<&str>) -> anyhow::Result<()> {
        self.dumps.lock().unwrap().push(username.map(str::to_string));
        self.turns.lock().unwrap().clear();
        Ok(())
    }

    fn record(&self, message: Message) {
        self.turns.lock().unwrap().push(message);
    }

    fn history(&self) -> Vec<Message> {
        self.turns.lock().unwrap().clone()
    }

    fn known_users(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.users.clone())
    }
}

pub struct StillCamera;

impl CaptureDevice for StillCamera {
    fn start(&self, sink: FrameSink) -> anyhow::Result<()> {
        sink.publish(image::RgbImage::new(640, 480));
        Ok(())
    }

    fn stop(&self) {}
}

/// What the scripted backend does for one query.
pub enum Reply {
    Answer(QueryResponse),
    Empty,
    Fail,
    Hang(Duration),
}

#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    pub requests: Mutex<Vec<QueryRequest>>,
}

impl ScriptedBackend {
    pub fn then(&self, reply: Reply) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }
}

#[async_trait]
impl DialogueBackend for ScriptedBackend {
    async fn query(&self, request: QueryRequest) -> anyhow::Result<Option<QueryResponse>> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Empty);
        match reply {
            Reply::Answer(r) => Ok(Some(r)),
            Reply::Empty => Ok(None),
            Reply::Fail => anyhow::bail!("backend down"),
            Reply::Hang(d) => {
                tokio::time::sleep(d).await;
                Ok(Some(QueryResponse::speech("too late")))
            }
        }
    }
}

pub fn answer(audio: &str, continue_conversation: bool) -> QueryResponse {
    QueryResponse {
        continue_conversation,
        text: Some(audio.to_string()),
        ..QueryResponse::speech(audio.as_bytes())
    }
}

pub struct Harness {
    pub dispatcher: Dispatcher,
    pub sender: EventSender,
    pub log: CallLog,
    pub store: Arc<MemoryStore>,
    pub backend: Arc<ScriptedBackend>,
    pub camera: Arc<CameraManager>,
}

pub fn fast_config() -> CoreConfig {
    CoreConfig {
        listen_timeout: Duration::from_secs(5),
        query_timeout: Duration::from_secs(1),
        query_workers: 2,
        ..CoreConfig::default()
    }
}

pub fn harness(config: CoreConfig) -> Harness {
    harness_with(config, MemoryStore::default())
}

/// Route core logs to the test output; safe to call from every test.
pub fn trace() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn harness_with(config: CoreConfig, store: MemoryStore) -> Harness {
    trace();
    let log = CallLog::default();
    let store = Arc::new(store);
    let backend = Arc::new(ScriptedBackend::default());
    let camera = Arc::new(CameraManager::new(Arc::new(StillCamera)));
    let (sender, receiver) = EventQueue::new();
    let service = |name: &'static str| -> Arc<dyn SensorService> {
        Arc::new(FakeService {
            name,
            log: log.clone(),
        })
    };
    let io = Collaborators {
        gaze: service("gaze"),
        presence: service("presence"),
        microphone: service("microphone"),
        touch: service("touch"),
        enrollment: Arc::new(FakeEnrollment(log.clone())),
        mouth: Arc::new(FakeMouth(log.clone())),
        leds: Arc::new(FakeLeds(log.clone())),
        face: Arc::new(FakeFace(log.clone())),
        conversations: store.clone(),
        camera: camera.clone(),
        fallback_audio: b"fallback".to_vec(),
        farewell_audio: b"bye".to_vec(),
    };
    let dispatcher = Dispatcher::new(config, sender.clone(), receiver, backend.clone(), io);
    Harness {
        dispatcher,
        sender,
        log,
        store,
        backend,
        camera,
    }
}

impl Harness {
    pub async fn feed(&mut self, notifications: impl IntoIterator<Item = Notification>) {
        for n in notifications {
            self.dispatcher.handle(n).await;
        }
    }
}
