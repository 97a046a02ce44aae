//! Raw Linux evdev reader for the touch panel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use psyche::{TouchDevice, TouchEvent};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

const EV_ABS: u16 = 0x03;
const ABS_MT_SLOT: u16 = 0x2f;
const ABS_MT_TRACKING_ID: u16 = 0x39;
/// `struct input_event` on 64-bit Linux: timeval (16), type, code, value.
const EVENT_SIZE: usize = 24;

/// One `/dev/input/event*` node.
pub struct EvdevTouch<R = File> {
    name: String,
    path: PathBuf,
    reader: R,
}

fn decode(raw: &[u8; EVENT_SIZE]) -> TouchEvent {
    let kind = u16::from_ne_bytes([raw[16], raw[17]]);
    let code = u16::from_ne_bytes([raw[18], raw[19]]);
    let value = i32::from_ne_bytes([raw[20], raw[21], raw[22], raw[23]]);
    match (kind, code) {
        (EV_ABS, ABS_MT_SLOT) => TouchEvent::Slot(value),
        (EV_ABS, ABS_MT_TRACKING_ID) => TouchEvent::TrackingId(value),
        _ => TouchEvent::Other,
    }
}

impl<R> EvdevTouch<R> {
    pub fn from_reader(name: impl Into<String>, path: impl Into<PathBuf>, reader: R) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            reader,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Kernel name of an event node, from sysfs.
async fn device_name(node: &Path) -> Option<String> {
    let file = node.file_name()?;
    let sys = Path::new("/sys/class/input").join(file).join("device/name");
    tokio::fs::read_to_string(sys)
        .await
        .ok()
        .map(|n| n.trim().to_string())
}

/// Open every readable `event*` node under `dir`.
pub async fn discover(dir: &Path) -> Result<Vec<Box<dyn TouchDevice>>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("listing {}", dir.display()))?;
    let mut devices: Vec<Box<dyn TouchDevice>> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_event = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("event"));
        if !is_event {
            continue;
        }
        let name = device_name(&path).await.unwrap_or_default();
        match File::open(&path).await {
            Ok(file) => {
                debug!(path = %path.display(), %name, "input device");
                devices.push(Box::new(EvdevTouch::from_reader(name, path, file)));
            }
            Err(e) => warn!(path = %path.display(), error = %e, "cannot open input device"),
        }
    }
    Ok(devices)
}

#[async_trait]
impl<R> TouchDevice for EvdevTouch<R>
where
    R: AsyncRead + Unpin + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_event(&mut self) -> Result<Option<TouchEvent>> {
        let mut raw = [0u8; EVENT_SIZE];
        match self.reader.read_exact(&mut raw).await {
            Ok(_) => Ok(Some(decode(&raw))),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: u16, code: u16, value: i32) -> Vec<u8> {
        let mut raw = vec![0u8; 16];
        raw.extend(kind.to_ne_bytes());
        raw.extend(code.to_ne_bytes());
        raw.extend(value.to_ne_bytes());
        raw
    }

    #[tokio::test]
    async fn decodes_multitouch_events() {
        let mut bytes = event(EV_ABS, ABS_MT_SLOT, 1);
        bytes.extend(event(EV_ABS, ABS_MT_TRACKING_ID, -1));
        bytes.extend(event(0x00, 0x00, 0));
        let mut dev = EvdevTouch::from_reader("Waveshare", "/dev/input/event0", &bytes[..]);
        assert_eq!(dev.next_event().await.unwrap(), Some(TouchEvent::Slot(1)));
        assert_eq!(dev.next_event().await.unwrap(), Some(TouchEvent::TrackingId(-1)));
        assert_eq!(dev.next_event().await.unwrap(), Some(TouchEvent::Other));
        assert_eq!(dev.next_event().await.unwrap(), None);
    }
}
