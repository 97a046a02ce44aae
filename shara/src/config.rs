use clap::Parser;
use psyche::CoreConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Command line and environment configuration for the robot process.
///
/// Every flag can also be set through its `SHARA_*` variable, either in the
/// environment or in a `.env` file next to the binary.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    /// Base URL of the dialogue sidecar (speech-to-text, reply, text-to-speech).
    #[arg(long, env = "SHARA_BACKEND_URL", default_value = "http://127.0.0.1:8000")]
    pub backend_url: String,

    /// Base URL of the vision sidecar (faces, recognition, person detection).
    #[arg(long, env = "SHARA_VISION_URL", default_value = "http://127.0.0.1:8001")]
    pub vision_url: String,

    /// Command printing one JPEG or PNG still to stdout.
    #[arg(
        long,
        env = "SHARA_SNAPSHOT_CMD",
        default_value = "rpicam-still -n -t 1 --width 1280 --height 720 -e jpg -o -"
    )]
    pub snapshot_cmd: String,

    /// Pause between two camera snapshots, in milliseconds.
    #[arg(long, env = "SHARA_SNAPSHOT_INTERVAL_MS", default_value_t = 100)]
    pub snapshot_interval_ms: u64,

    /// Command streaming raw 16-bit mono PCM from the microphone to stdout.
    #[arg(
        long,
        env = "SHARA_RECORD_CMD",
        default_value = "arecord -q -t raw -f S16_LE -r 16000 -c 1"
    )]
    pub record_cmd: String,

    /// Command playing audio read from stdin.
    #[arg(long, env = "SHARA_PLAY_CMD", default_value = "aplay -q -")]
    pub play_cmd: String,

    /// RMS level above which a 30 ms frame counts as voiced.
    #[arg(long, env = "SHARA_VAD_THRESHOLD", default_value_t = 600.0)]
    pub vad_threshold: f32,

    /// Directory scanned for the touch panel's event device.
    #[arg(long, env = "SHARA_INPUT_DIR", default_value = "/dev/input")]
    pub input_dir: PathBuf,

    /// Serial device of the WLED strip.
    #[arg(long, env = "SHARA_LED_PORT", default_value = "/dev/ttyAMA0")]
    pub led_port: PathBuf,

    /// Directory holding the conversation log.
    #[arg(long, env = "SHARA_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Audio played when the dialogue backend times out or fails.
    #[arg(long, env = "SHARA_FALLBACK_AUDIO")]
    pub fallback_audio: Option<PathBuf>,

    /// Audio played once when shutting down.
    #[arg(long, env = "SHARA_FAREWELL_AUDIO")]
    pub farewell_audio: Option<PathBuf>,

    /// Seconds of silence after which a conversation ends.
    #[arg(long, env = "SHARA_LISTEN_TIMEOUT", default_value_t = 5)]
    pub listen_timeout: u64,

    /// Seconds a dialogue query may take.
    #[arg(long, env = "SHARA_QUERY_TIMEOUT", default_value_t = 15)]
    pub query_timeout: u64,

    /// Concurrent dialogue backend calls.
    #[arg(long, env = "SHARA_QUERY_WORKERS", default_value_t = 10)]
    pub query_workers: usize,

    /// Replies to an unknown speaker before casually asking their name.
    #[arg(long, env = "SHARA_UNKNOWN_USER_THRESHOLD", default_value_t = 1)]
    pub unknown_user_threshold: u32,
}

impl Cli {
    /// Core timing knobs; alarm horizons keep their defaults.
    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            listen_timeout: Duration::from_secs(self.listen_timeout),
            query_timeout: Duration::from_secs(self.query_timeout),
            query_workers: self.query_workers.max(1),
            unknown_user_threshold: self.unknown_user_threshold,
            ..CoreConfig::default()
        }
    }

    pub fn conversation_db(&self) -> PathBuf {
        self.data_dir.join("conversations.json")
    }

    pub fn unknown_conversations(&self) -> PathBuf {
        self.data_dir.join("unknown_conversations.json")
    }
}

/// Split a configured command line into program and arguments.
pub fn split_command(line: &str) -> anyhow::Result<(String, Vec<String>)> {
    let mut parts = line.split_whitespace().map(str::to_string);
    let program = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty command"))?;
    Ok((program, parts.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_core_config() {
        let cli = Cli::parse_from(["shara"]);
        let config = cli.core_config();
        assert_eq!(config.query_timeout, Duration::from_secs(15));
        assert_eq!(config.query_workers, 10);
        assert_eq!(cli.conversation_db(), PathBuf::from("data/conversations.json"));
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from(["shara", "--listen-timeout", "8", "--query-workers", "0"]);
        let config = cli.core_config();
        assert_eq!(config.listen_timeout, Duration::from_secs(8));
        assert_eq!(config.query_workers, 1);
    }

    #[test]
    fn splits_commands() {
        let (program, args) = split_command("aplay -q -").unwrap();
        assert_eq!(program, "aplay");
        assert_eq!(args, vec!["-q", "-"]);
        assert!(split_command("   ").is_err());
    }
}
