//! Microphone and speaker backed by external commands (`arecord`, `aplay`).

use crate::config::split_command;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use psyche::{AudioSink, AudioSource, AudioStream};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info};

/// Microphone reading raw PCM from a recording command's stdout.
pub struct CommandMicrophone {
    program: String,
    args: Vec<String>,
    chunk_bytes: usize,
}

impl CommandMicrophone {
    /// `chunk_samples` 16-bit samples are returned per read.
    pub fn new(command: &str, chunk_samples: u32) -> Result<Self> {
        let (program, args) = split_command(command)?;
        Ok(Self {
            program,
            args,
            chunk_bytes: chunk_samples as usize * 2,
        })
    }
}

/// A running recording command. Dropping it kills the process.
pub struct CommandStream {
    _child: Child,
    stdout: ChildStdout,
    chunk_bytes: usize,
}

#[async_trait]
impl AudioSource for CommandMicrophone {
    async fn open(&self) -> Result<Box<dyn AudioStream>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("starting {}", self.program))?;
        let stdout = child.stdout.take().context("recorder has no stdout")?;
        info!(program = %self.program, "recording");
        Ok(Box::new(CommandStream {
            _child: child,
            stdout,
            chunk_bytes: self.chunk_bytes,
        }))
    }
}

#[async_trait]
impl AudioStream for CommandStream {
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; self.chunk_bytes];
        let mut filled = 0;
        while filled < chunk.len() {
            let n = self.stdout.read(&mut chunk[filled..]).await?;
            if n == 0 {
                debug!(filled, "recorder closed its output");
                return Ok(None);
            }
            filled += n;
        }
        Ok(Some(chunk))
    }
}

/// Speaker piping audio into a playback command's stdin.
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
}

impl CommandSpeaker {
    pub fn new(command: &str) -> Result<Self> {
        let (program, args) = split_command(command)?;
        Ok(Self { program, args })
    }
}

#[async_trait]
impl AudioSink for CommandSpeaker {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("starting {}", self.program))?;
        let mut stdin = child.stdin.take().context("player has no stdin")?;
        stdin.write_all(audio).await?;
        drop(stdin);
        let status = child.wait().await?;
        if !status.success() {
            bail!("{} exited with {status}", self.program);
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_fixed_size_chunks_until_eof() {
        let mic = CommandMicrophone::new("head -c 10 /dev/zero", 2).unwrap();
        let mut stream = mic.open().await.unwrap();
        assert_eq!(stream.read_chunk().await.unwrap(), Some(vec![0; 4]));
        assert_eq!(stream.read_chunk().await.unwrap(), Some(vec![0; 4]));
        assert_eq!(stream.read_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn speaker_reports_player_failure() {
        let ok = CommandSpeaker::new("cat").unwrap();
        ok.play(b"hello").await.unwrap();
        let failing = CommandSpeaker::new("false").unwrap();
        assert!(failing.play(b"").await.is_err());
    }
}
