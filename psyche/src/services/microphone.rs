//! Utterance capture gated by voice-activity detection.

use crate::notification::Notification;
use crate::queue::EventSender;
use crate::traits::{AudioSource, SensorService, VoiceActivity};
use crate::worker::ServiceRunner;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SERVICE: &str = "microphone";

#[derive(Clone, Copy, Debug)]
pub struct MicSettings {
    pub sample_rate: u32,
    /// Samples per chunk delivered by the audio stream.
    pub chunk_samples: u32,
    /// Audio judged by the voice-activity detector at once.
    pub vad_window: Duration,
    /// Audio kept from before speech started and prepended to the utterance.
    pub pre_roll: Duration,
}

impl Default for MicSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            chunk_samples: 2048,
            vad_window: Duration::from_secs(2),
            pre_roll: Duration::from_secs(1),
        }
    }
}

impl MicSettings {
    fn chunks_in(&self, span: Duration) -> usize {
        let per_second = self.sample_rate as f64 / self.chunk_samples.max(1) as f64;
        ((span.as_secs_f64() * per_second) as usize).max(1)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum MicEvent {
    Started,
    Finished(Vec<u8>),
}

/// Rolling detector turning chunks into one utterance.
struct UtteranceDetector {
    window: VecDeque<Vec<u8>>,
    window_len: usize,
    pre_roll: VecDeque<Vec<u8>>,
    pre_roll_len: usize,
    utterance: Option<Vec<u8>>,
}

impl UtteranceDetector {
    fn new(settings: &MicSettings) -> Self {
        let window_len = settings.chunks_in(settings.vad_window);
        let pre_roll_len = settings.chunks_in(settings.pre_roll);
        Self {
            window: VecDeque::with_capacity(window_len),
            window_len,
            pre_roll: VecDeque::with_capacity(pre_roll_len),
            pre_roll_len,
            utterance: None,
        }
    }

    fn feed(&mut self, chunk: Vec<u8>, vad: &dyn VoiceActivity) -> Option<MicEvent> {
        if self.window.len() == self.window_len {
            self.window.pop_front();
        }
        self.window.push_back(chunk.clone());
        let speech = self.window.len() == self.window_len && {
            let joined: Vec<u8> = self.window.iter().flatten().copied().collect();
            vad.is_speech(&joined)
        };

        if !speech {
            if let Some(audio) = self.utterance.take() {
                return Some(MicEvent::Finished(audio));
            }
            if self.pre_roll.len() == self.pre_roll_len {
                self.pre_roll.pop_front();
            }
            self.pre_roll.push_back(chunk);
            return None;
        }
        if let Some(audio) = self.utterance.as_mut() {
            audio.extend_from_slice(&chunk);
            return None;
        }
        let mut audio: Vec<u8> = self.pre_roll.drain(..).flatten().collect();
        audio.extend_from_slice(&chunk);
        self.utterance = Some(audio);
        Some(MicEvent::Started)
    }
}

/// Records one utterance per start: `SpeechStarted` once, then
/// `SpeechFinished` with the audio, then the loop ends.
pub struct MicrophoneService {
    runner: ServiceRunner,
    source: Arc<dyn AudioSource>,
    vad: Arc<dyn VoiceActivity>,
    events: EventSender,
    settings: MicSettings,
}

impl MicrophoneService {
    pub fn new(
        source: Arc<dyn AudioSource>,
        vad: Arc<dyn VoiceActivity>,
        events: EventSender,
        settings: MicSettings,
    ) -> Self {
        Self {
            runner: ServiceRunner::new(SERVICE),
            source,
            vad,
            events,
            settings,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.runner.is_running().await
    }
}

#[async_trait]
impl SensorService for MicrophoneService {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn start(&self) {
        self.runner
            .start(|group| {
                group.spawn(record_loop(
                    group.token(),
                    self.source.clone(),
                    self.vad.clone(),
                    self.events.clone(),
                    self.settings,
                ));
            })
            .await;
    }

    async fn stop(&self) {
        self.runner.stop().await;
    }
}

async fn record_loop(
    token: CancellationToken,
    source: Arc<dyn AudioSource>,
    vad: Arc<dyn VoiceActivity>,
    events: EventSender,
    settings: MicSettings,
) {
    let mut stream = tokio::select! {
        _ = token.cancelled() => return,
        stream = source.open() => match stream {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "cannot open microphone");
                return;
            }
        },
    };
    info!("microphone opened");
    let mut detector = UtteranceDetector::new(&settings);

    loop {
        let chunk = tokio::select! {
            _ = token.cancelled() => break,
            chunk = stream.read_chunk() => chunk,
        };
        let chunk = match chunk {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                warn!("microphone stream ended");
                break;
            }
            Err(e) => {
                error!(error = %e, "microphone read failed");
                break;
            }
        };
        match detector.feed(chunk, vad.as_ref()) {
            Some(MicEvent::Started) => {
                info!("speech started");
                events.post(Notification::SpeechStarted);
            }
            Some(MicEvent::Finished(audio)) => {
                debug!(bytes = audio.len(), "speech finished");
                events.post(Notification::SpeechFinished(audio));
                break;
            }
            None => {}
        }
    }
    info!("microphone closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Speech whenever the window contains a non-zero byte.
    struct LoudIsSpeech;

    impl VoiceActivity for LoudIsSpeech {
        fn is_speech(&self, window: &[u8]) -> bool {
            window.iter().any(|b| *b != 0)
        }
    }

    fn settings() -> MicSettings {
        MicSettings {
            sample_rate: 4,
            chunk_samples: 1,
            vad_window: Duration::from_millis(500),
            pre_roll: Duration::from_millis(500),
        }
    }

    #[test]
    fn utterance_includes_pre_roll() {
        let mut d = UtteranceDetector::new(&settings());
        assert_eq!(d.feed(vec![0], &LoudIsSpeech), None);
        assert_eq!(d.feed(vec![0], &LoudIsSpeech), None);
        assert_eq!(d.feed(vec![0], &LoudIsSpeech), None);
        assert_eq!(d.feed(vec![7], &LoudIsSpeech), Some(MicEvent::Started));
        assert_eq!(d.feed(vec![8], &LoudIsSpeech), None);
        assert_eq!(d.feed(vec![0], &LoudIsSpeech), None);
        assert_eq!(
            d.feed(vec![0], &LoudIsSpeech),
            Some(MicEvent::Finished(vec![0, 0, 7, 8, 0]))
        );
    }

    #[test]
    fn silence_never_starts() {
        let mut d = UtteranceDetector::new(&settings());
        for _ in 0..10 {
            assert_eq!(d.feed(vec![0; 4], &LoudIsSpeech), None);
        }
    }
}
