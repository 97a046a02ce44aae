use crate::notification::Notification;
use crate::queue::EventSender;
use crate::traits::{AudioSink, Mouth};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// [`Mouth`] that plays through an [`AudioSink`] and reports completion on
/// the event queue.
pub struct PlaybackMouth {
    sink: Arc<dyn AudioSink>,
    events: EventSender,
    playing: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackMouth {
    pub fn new(sink: Arc<dyn AudioSink>, events: EventSender) -> Self {
        Self {
            sink,
            events,
            playing: Mutex::new(None),
        }
    }

    fn interrupt(&self) {
        let previous = self
            .playing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = previous {
            if !handle.is_finished() {
                debug!("interrupting playback");
            }
            handle.abort();
        }
    }
}

#[async_trait]
impl Mouth for PlaybackMouth {
    fn speak(&self, audio: Vec<u8>) {
        self.interrupt();
        let sink = self.sink.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            debug!(bytes = audio.len(), "playing reply");
            if let Err(e) = sink.play(&audio).await {
                warn!(error = %e, "playback failed");
            }
            events.post(Notification::PlaybackFinished);
        });
        *self.playing.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    async fn speak_and_wait(&self, audio: Vec<u8>) {
        self.interrupt();
        if let Err(e) = self.sink.play(&audio).await {
            warn!(error = %e, "playback failed");
        }
    }
}

impl Drop for PlaybackMouth {
    fn drop(&mut self) {
        self.interrupt();
    }
}
