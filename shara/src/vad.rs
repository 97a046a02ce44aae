use psyche::VoiceActivity;

/// Energy-based voice-activity detector over 16-bit little-endian PCM.
///
/// The window is cut into frames; it counts as speech when enough frames have
/// an RMS level above the threshold.
#[derive(Clone, Copy, Debug)]
pub struct EnergyVad {
    threshold: f32,
    frame_samples: usize,
    min_voiced_ratio: f32,
}

impl EnergyVad {
    /// 30 ms frames at `sample_rate`; a tenth of them must be voiced.
    pub fn new(threshold: f32, sample_rate: u32) -> Self {
        Self {
            threshold,
            frame_samples: (sample_rate as usize * 30 / 1000).max(1),
            min_voiced_ratio: 0.1,
        }
    }
}

fn rms(samples: &[u8]) -> f32 {
    let count = samples.len() / 2;
    if count == 0 {
        return 0.0;
    }
    let energy: f64 = samples
        .chunks_exact(2)
        .map(|b| f64::from(i16::from_le_bytes([b[0], b[1]])).powi(2))
        .sum();
    (energy / count as f64).sqrt() as f32
}

impl VoiceActivity for EnergyVad {
    fn is_speech(&self, window: &[u8]) -> bool {
        let frames: Vec<&[u8]> = window.chunks(self.frame_samples * 2).collect();
        if frames.is_empty() {
            return false;
        }
        let voiced = frames.iter().filter(|f| rms(f) > self.threshold).count();
        voiced as f32 >= frames.len() as f32 * self.min_voiced_ratio
    }
}
