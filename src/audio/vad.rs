//! Voice Activity Detection (VAD): energy-based with RMS gating.
//! When VAD is continuously false, wake inference runs at 1/4 rate.

/// RMS energy computation over a frame of PCM samples.
#[inline]
pub fn compute_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let f = s as f64;
            f * f
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Simple energy-based VAD.
pub struct EnergyVad {
    /// Raw i16 RMS below which a frame counts as silence.
    silence_threshold: f32,
    /// Consecutive silent frames before declaring no-voice.
    silence_frames_needed: u32,
    silent_count: u32,
    voice_active: bool,
    frame_counter: u64,
}

impl EnergyVad {
    pub fn new(silence_threshold: f32) -> Self {
        Self {
            silence_threshold,
            silence_frames_needed: 8,
            silent_count: 0,
            voice_active: false,
            frame_counter: 0,
        }
    }

    /// Process a frame. Returns whether wake inference should run on it.
    #[inline]
    pub fn process(&mut self, samples: &[i16]) -> bool {
        let rms = compute_rms(samples);
        self.frame_counter += 1;

        if rms < self.silence_threshold {
            self.silent_count += 1;
            if self.silent_count >= self.silence_frames_needed {
                self.voice_active = false;
            }
            self.voice_active || self.frame_counter % 4 == 0
        } else {
            self.silent_count = 0;
            self.voice_active = true;
            true
        }
    }

    pub fn is_voice_active(&self) -> bool {
        self.voice_active
    }
}
