use async_trait::async_trait;

/// Speech playback.
///
/// `speak` returns immediately; implementations post
/// [`crate::Notification::PlaybackFinished`] when the audio has been played.
#[async_trait]
pub trait Mouth: Send + Sync {
    /// Start playing `audio`, interrupting anything still playing.
    fn speak(&self, audio: Vec<u8>);
    /// Play `audio` to the end without notifying the dispatcher.
    async fn speak_and_wait(&self, audio: Vec<u8>);
}

/// Raw audio output device.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `audio`, returning once it has finished.
    async fn play(&self, audio: &[u8]) -> anyhow::Result<()>;
}
