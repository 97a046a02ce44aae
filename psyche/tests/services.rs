mod common;

use async_trait::async_trait;
use common::StillCamera;
use psyche::services::{
    EnrollmentRecorder, EnrollmentSettings, GazeService, GazeSettings, MicSettings,
    MicrophoneService, PresenceService, PresenceSettings, TouchService, TouchSettings,
};
use psyche::{
    AudioSource, AudioStream, BoundingBox, CameraManager, DetectedFace, EnrollmentService,
    Error, EventQueue, EventReceiver, FaceDetector, FaceLandmarks, FaceRecognizer, Frame,
    Notification, PersonDetector, SensorService, TouchDevice, TouchEvent, VoiceActivity,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

fn close_face() -> DetectedFace {
    DetectedFace {
        bbox: BoundingBox {
            x_min: 100.0,
            y_min: 100.0,
            x_max: 200.0,
            y_max: 200.0,
        },
        landmarks: FaceLandmarks {
            left_eye: (140.0, 140.0),
            right_eye: (160.0, 140.0),
            left_eye_tragion: (130.0, 145.0),
            right_eye_tragion: (170.0, 145.0),
            nose_tip: (150.0, 155.0),
            mouth: (150.0, 170.0),
        },
    }
}

struct AlwaysClose;

#[async_trait]
impl FaceDetector for AlwaysClose {
    async fn detect_faces(&self, _frame: &Frame) -> anyhow::Result<Vec<DetectedFace>> {
        Ok(vec![close_face()])
    }
}

#[derive(Default)]
struct Recognizer {
    enrolled: Mutex<Vec<String>>,
}

#[async_trait]
impl FaceRecognizer for Recognizer {
    async fn identify(
        &self,
        _frame: &Frame,
        faces: &[BoundingBox],
    ) -> anyhow::Result<Vec<Option<String>>> {
        Ok(faces.iter().map(|_| Some("ana".to_string())).collect())
    }

    async fn enroll(&self, username: &str, _frame: &Frame, _face: &BoundingBox) -> anyhow::Result<()> {
        self.enrolled.lock().unwrap().push(username.to_string());
        Ok(())
    }
}

struct NoFaces;

#[async_trait]
impl FaceDetector for NoFaces {
    async fn detect_faces(&self, _frame: &Frame) -> anyhow::Result<Vec<DetectedFace>> {
        Ok(Vec::new())
    }
}

struct Someone(AtomicBool);

#[async_trait]
impl PersonDetector for Someone {
    async fn person_present(&self, _frame: &Frame) -> anyhow::Result<bool> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

fn camera() -> Arc<CameraManager> {
    Arc::new(CameraManager::new(Arc::new(StillCamera)))
}

async fn next(events: &mut EventReceiver) -> Notification {
    tokio::time::timeout(Duration::from_secs(10), events.next())
        .await
        .expect("no notification in time")
        .expect("queue closed")
}

fn drain(events: &mut EventReceiver) -> Vec<Notification> {
    std::iter::from_fn(|| events.try_next()).collect()
}

#[tokio::test(start_paused = true)]
async fn gaze_confirms_once_and_identifies() {
    let camera = camera();
    let (sender, mut events) = EventQueue::new();
    let gaze = GazeService::new(
        camera.clone(),
        Arc::new(AlwaysClose),
        Arc::new(Recognizer::default()),
        sender,
        GazeSettings::default(),
    );

    gaze.start().await;
    gaze.start().await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    let seen = drain(&mut events);

    let confirmed = seen
        .iter()
        .filter(|n| **n == Notification::GazeConfirmedClose)
        .count();
    assert_eq!(confirmed, 1);
    let identities: Vec<_> = seen
        .iter()
        .filter_map(|n| match n {
            Notification::IdentityMatched(c) => c.get(&Some("ana".to_string())).copied(),
            _ => None,
        })
        .collect();
    assert_eq!(identities, vec![1, 2, 3]);

    assert!(camera.is_active());
    gaze.stop().await;
    assert!(!gaze.is_running().await);
    assert!(!camera.is_active());
}

#[tokio::test(start_paused = true)]
async fn presence_reports_arrival_lingering_and_departure() {
    let camera = camera();
    let (sender, mut events) = EventQueue::new();
    let detector = Arc::new(Someone(AtomicBool::new(true)));
    let presence = PresenceService::new(
        camera.clone(),
        detector.clone(),
        sender,
        PresenceSettings::default(),
    );

    presence.start().await;
    assert_eq!(next(&mut events).await, Notification::PersonDetected);
    assert_eq!(next(&mut events).await, Notification::PersonDetectedLongTime);
    detector.0.store(false, Ordering::SeqCst);
    assert_eq!(next(&mut events).await, Notification::RoomEmpty);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(drain(&mut events).is_empty());

    presence.stop().await;
    assert!(!camera.is_active());
}

#[tokio::test(start_paused = true)]
async fn camera_is_shared_between_gaze_and_presence() {
    let camera = camera();
    let (sender, _events) = EventQueue::new();
    let presence = PresenceService::new(
        camera.clone(),
        Arc::new(Someone(AtomicBool::new(false))),
        sender.clone(),
        PresenceSettings::default(),
    );
    let gaze = GazeService::new(
        camera.clone(),
        Arc::new(AlwaysClose),
        Arc::new(Recognizer::default()),
        sender,
        GazeSettings::default(),
    );

    presence.start().await;
    gaze.start().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(camera.holders(), vec!["gaze", "presence"]);

    presence.stop().await;
    assert!(camera.is_active());
    gaze.stop().await;
    assert!(!camera.is_active());
}

struct Scripted(Mutex<Option<VecDeque<Vec<u8>>>>);

struct ScriptedStream(VecDeque<Vec<u8>>);

#[async_trait]
impl AudioSource for Scripted {
    async fn open(&self) -> anyhow::Result<Box<dyn AudioStream>> {
        let chunks = self.0.lock().unwrap().take().unwrap_or_default();
        Ok(Box::new(ScriptedStream(chunks)))
    }
}

#[async_trait]
impl AudioStream for ScriptedStream {
    async fn read_chunk(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.0.pop_front())
    }
}

struct LoudIsSpeech;

impl VoiceActivity for LoudIsSpeech {
    fn is_speech(&self, window: &[u8]) -> bool {
        window.iter().any(|b| *b != 0)
    }
}

#[tokio::test]
async fn microphone_posts_one_utterance() {
    let chunks = [0u8, 0, 3, 4, 5, 0, 0, 0, 9, 9]
        .into_iter()
        .map(|b| vec![b])
        .collect();
    let (sender, mut events) = EventQueue::new();
    let mic = MicrophoneService::new(
        Arc::new(Scripted(Mutex::new(Some(chunks)))),
        Arc::new(LoudIsSpeech),
        sender,
        MicSettings {
            sample_rate: 1,
            chunk_samples: 1,
            vad_window: Duration::from_secs(2),
            pre_roll: Duration::from_secs(1),
        },
    );

    mic.start().await;
    assert_eq!(next(&mut events).await, Notification::SpeechStarted);
    assert_eq!(
        next(&mut events).await,
        Notification::SpeechFinished(vec![0, 3, 4, 5, 0])
    );
    mic.stop().await;
    assert!(drain(&mut events).is_empty());
}

struct Panel {
    name: &'static str,
    events: mpsc::UnboundedReceiver<TouchEvent>,
}

#[async_trait]
impl TouchDevice for Panel {
    fn name(&self) -> &str {
        self.name
    }

    async fn next_event(&mut self) -> anyhow::Result<Option<TouchEvent>> {
        Ok(self.events.recv().await)
    }
}

fn panel(name: &'static str) -> (Box<dyn TouchDevice>, mpsc::UnboundedSender<TouchEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Box::new(Panel { name, events: rx }), tx)
}

fn press(fingers: &mpsc::UnboundedSender<TouchEvent>, count: i32) {
    for slot in 0..count {
        fingers.send(TouchEvent::Slot(slot)).unwrap();
        fingers.send(TouchEvent::TrackingId(100 + slot)).unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn three_finger_hold_requests_shutdown() {
    let (keyboard, _) = panel("AT Translated Set 2 keyboard");
    let (touch, fingers) = panel("Waveshare Touchscreen");
    let (sender, mut events) = EventQueue::new();
    let service =
        TouchService::open(vec![keyboard, touch], sender, TouchSettings::default()).unwrap();
    service.start().await;

    press(&fingers, 3);
    tokio::time::sleep(Duration::from_millis(2900)).await;
    assert!(drain(&mut events).is_empty());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(drain(&mut events), vec![Notification::TouchShutdownGesture]);
    service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn lifting_a_finger_cancels_the_gesture() {
    let (touch, fingers) = panel("generic touch panel");
    let (sender, mut events) = EventQueue::new();
    let service = TouchService::open(vec![touch], sender, TouchSettings::default()).unwrap();
    service.start().await;

    press(&fingers, 3);
    tokio::time::sleep(Duration::from_secs(1)).await;
    fingers.send(TouchEvent::TrackingId(-1)).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(drain(&mut events).is_empty());
    service.stop().await;
}

#[tokio::test]
async fn missing_touch_panel_is_reported() {
    let (keyboard, _) = panel("keyboard");
    let (sender, _events) = EventQueue::new();
    let err = TouchService::open(vec![keyboard], sender, TouchSettings::default())
        .err()
        .expect("no panel should be found");
    assert!(matches!(err, Error::DeviceNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn enrollment_records_and_encodes_every_frame() {
    let camera = camera();
    let recognizer = Arc::new(Recognizer::default());
    let (sender, mut events) = EventQueue::new();
    let recorder = EnrollmentRecorder::new(
        camera.clone(),
        Arc::new(AlwaysClose),
        recognizer.clone(),
        sender,
        EnrollmentSettings::default(),
    );

    recorder.enroll("zoe").await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!camera.is_active());

    let progress: Vec<f32> = drain(&mut events)
        .into_iter()
        .filter_map(|n| match n {
            Notification::EnrollmentProgress(p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 6);
    assert_eq!(progress.last().copied(), Some(100.0));
    assert!(progress.windows(2).all(|w| w[0] < w[1]));

    recorder.shutdown().await;
    assert!(!camera.is_active());
    assert_eq!(*recognizer.enrolled.lock().unwrap(), vec!["zoe"; 6]);
}

#[tokio::test(start_paused = true)]
async fn stopping_enrollment_releases_the_camera() {
    let camera = camera();
    let (sender, _events) = EventQueue::new();
    let recorder = EnrollmentRecorder::new(
        camera.clone(),
        Arc::new(AlwaysClose),
        Arc::new(Recognizer::default()),
        sender,
        EnrollmentSettings {
            frames: 1000,
            ..EnrollmentSettings::default()
        },
    );
    recorder.enroll("zoe").await;
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(camera.is_active());
    recorder.stop().await;
    assert!(!camera.is_active());
    recorder.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn enrollment_without_a_face_is_abandoned() {
    let camera = camera();
    let recognizer = Arc::new(Recognizer::default());
    let (sender, mut events) = EventQueue::new();
    let recorder = EnrollmentRecorder::new(
        camera.clone(),
        Arc::new(NoFaces),
        recognizer.clone(),
        sender,
        EnrollmentSettings::default(),
    );

    recorder.enroll("zoe").await;
    assert_eq!(next(&mut events).await, Notification::EnrollmentAbandoned);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!recorder.is_recording().await);
    assert!(!camera.is_active());
    recorder.shutdown().await;
    assert!(recognizer.enrolled.lock().unwrap().is_empty());
}
