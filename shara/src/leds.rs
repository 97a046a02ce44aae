use anyhow::{Context, Result};
use psyche::{LedState, Leds};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// WLED strip driven with JSON commands over a serial line.
///
/// Commands are queued to a writer task so callers never block on the port.
/// The port's line settings are left to the system (`stty`); one JSON
/// object is written per line.
pub struct SerialLeds {
    commands: mpsc::UnboundedSender<Value>,
    current: Mutex<Option<LedState>>,
}

impl SerialLeds {
    /// Open `port` and switch the strip on.
    ///
    /// The returned handle finishes once every [`SerialLeds`] handle is
    /// dropped and the queued commands are written.
    pub async fn open(port: &Path) -> Result<(Self, JoinHandle<File>)> {
        let file = OpenOptions::new()
            .write(true)
            .open(port)
            .await
            .with_context(|| format!("opening {}", port.display()))?;
        info!(port = %port.display(), "led strip opened");
        Ok(Self::spawn(file))
    }

    /// Drive a strip attached to `port`. Must be called inside a tokio runtime.
    pub fn spawn<W>(port: W) -> (Self, JoinHandle<W>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_commands(port, rx));
        let leds = Self {
            commands,
            current: Mutex::new(None),
        };
        leds.send(json!({ "on": true, "bri": 255 }));
        (leds, writer)
    }

    fn send(&self, command: Value) {
        if self.commands.send(command).is_err() {
            warn!("led writer stopped");
        }
    }
}

async fn write_commands<W>(mut port: W, mut rx: mpsc::UnboundedReceiver<Value>) -> W
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = rx.recv().await {
        let mut line = command.to_string().into_bytes();
        line.push(b'\n');
        let result = async {
            port.write_all(&line).await?;
            port.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "led command failed");
        }
    }
    debug!("led writer finished");
    port
}

impl Leds for SerialLeds {
    fn show(&self, state: LedState) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == Some(state) {
            return;
        }
        debug!(?state, "leds");
        self.send(state.command());
        *current = Some(state);
    }

    fn power_off(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        self.send(json!({ "on": false }));
        *current = None;
        info!("led strip off");
    }
}
