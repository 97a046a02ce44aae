use crate::config::split_command;
use anyhow::{Context, Result, bail};
use psyche::{CaptureDevice, FrameSink};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Camera driven by an external still-capture command.
///
/// While started, the command is run once per interval and its stdout is
/// decoded as an image and published as the latest frame.
pub struct SnapshotCamera {
    program: String,
    args: Vec<String>,
    interval: Duration,
    running: Mutex<Option<CancellationToken>>,
}

impl SnapshotCamera {
    pub fn new(command: &str, interval: Duration) -> Result<Self> {
        let (program, args) = split_command(command)?;
        Ok(Self {
            program,
            args,
            interval,
            running: Mutex::new(None),
        })
    }
}

async fn snapshot(program: &str, args: &[String]) -> Result<psyche::Frame> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("running {program}"))?;
    if !output.status.success() {
        bail!("{program} exited with {}", output.status);
    }
    let image = image::load_from_memory(&output.stdout).context("decoding snapshot")?;
    Ok(image.to_rgb8())
}

impl CaptureDevice for SnapshotCamera {
    fn start(&self, sink: FrameSink) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().context("camera needs a runtime")?;
        let token = CancellationToken::new();
        let previous = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let program = self.program.clone();
        let args = self.args.clone();
        let interval = self.interval;
        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(%program, "snapshot capture started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let shot = tokio::select! {
                    _ = token.cancelled() => break,
                    shot = snapshot(&program, &args) => shot,
                };
                match shot {
                    Ok(frame) => {
                        debug!(width = frame.width(), height = frame.height(), "snapshot");
                        sink.publish(frame);
                    }
                    Err(e) => warn!(error = %format!("{e:#}"), "snapshot failed"),
                }
            }
            info!("snapshot capture stopped");
        });
        Ok(())
    }

    fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = running {
            token.cancel();
        }
    }
}

impl Drop for SnapshotCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
