use crate::audio::{CommandMicrophone, CommandSpeaker};
use crate::backend::HttpDialogue;
use crate::camera::SnapshotCamera;
use crate::config::Cli;
use crate::face::LogFace;
use crate::leds::SerialLeds;
use crate::touch;
use crate::vad::EnergyVad;
use crate::vision::HttpVision;
use anyhow::{Context, Result};
use psyche::services::{
    EnrollmentRecorder, EnrollmentSettings, GazeService, GazeSettings, MicSettings,
    MicrophoneService, PresenceService, PresenceSettings, TouchService, TouchSettings,
};
use psyche::{
    CameraManager, Collaborators, Dispatcher, EventQueue, JsonConversationStore, Leds, NoopLeds,
    Notification, PlaybackMouth,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Read a canned audio clip; a missing clip plays as silence.
async fn read_audio(path: Option<&Path>) -> Vec<u8> {
    let Some(path) = path else {
        return Vec::new();
    };
    tokio::fs::read(path).await.unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "cannot read audio clip");
        Vec::new()
    })
}

/// Build every collaborator from `cli` and run the dispatcher until shutdown.
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.core_config();
    let (events, receiver) = EventQueue::new();

    let device = SnapshotCamera::new(
        &cli.snapshot_cmd,
        Duration::from_millis(cli.snapshot_interval_ms),
    )?;
    let camera = Arc::new(CameraManager::new(Arc::new(device)));
    let vision = Arc::new(HttpVision::new(&cli.vision_url)?);
    let backend = Arc::new(HttpDialogue::new(&cli.backend_url)?);

    let gaze = Arc::new(GazeService::new(
        camera.clone(),
        vision.clone(),
        vision.clone(),
        events.clone(),
        GazeSettings::default(),
    ));
    let presence = Arc::new(PresenceService::new(
        camera.clone(),
        vision.clone(),
        events.clone(),
        PresenceSettings::default(),
    ));
    let enrollment = Arc::new(EnrollmentRecorder::new(
        camera.clone(),
        vision.clone(),
        vision,
        events.clone(),
        EnrollmentSettings::default(),
    ));

    let mic = MicSettings::default();
    let microphone = Arc::new(MicrophoneService::new(
        Arc::new(CommandMicrophone::new(&cli.record_cmd, mic.chunk_samples)?),
        Arc::new(EnergyVad::new(cli.vad_threshold, mic.sample_rate)),
        events.clone(),
        mic,
    ));
    let panels = touch::discover(&cli.input_dir).await?;
    let touch = Arc::new(TouchService::open(
        panels,
        events.clone(),
        TouchSettings::default(),
    )?);

    let mouth = Arc::new(PlaybackMouth::new(
        Arc::new(CommandSpeaker::new(&cli.play_cmd)?),
        events.clone(),
    ));
    let (leds, led_writer): (Arc<dyn Leds>, _) = match SerialLeds::open(&cli.led_port).await {
        Ok((leds, writer)) => (Arc::new(leds), Some(writer)),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "running without leds");
            (Arc::new(NoopLeds), None)
        }
    };

    tokio::fs::create_dir_all(&cli.data_dir)
        .await
        .with_context(|| format!("creating {}", cli.data_dir.display()))?;
    let conversations = Arc::new(JsonConversationStore::new(
        cli.conversation_db(),
        cli.unknown_conversations(),
    ));

    let io = Collaborators {
        gaze,
        presence,
        microphone,
        touch,
        enrollment,
        mouth,
        leds,
        face: Arc::new(LogFace::default()),
        conversations,
        camera,
        fallback_audio: read_audio(cli.fallback_audio.as_deref()).await,
        farewell_audio: read_audio(cli.farewell_audio.as_deref()).await,
    };
    let dispatcher = Dispatcher::new(config, events.clone(), receiver, backend, io);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            events.post(Notification::Shutdown);
        }
    });

    dispatcher.run().await;
    // The dispatcher held the last strip handle; wait for the power-off write.
    if let Some(writer) = led_writer {
        writer.await.context("led writer panicked")?;
    }
    Ok(())
}
