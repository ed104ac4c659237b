//! Keyword spotting over PCM frames.
//! Pipeline: VAD gate → wake score → two-stage confirmation → refractory cooldown.
//! Stage 1: a score above `th_low` opens a confirmation window.
//! Stage 2: within the window, enough frames must reach `th_high`.

use std::time::{Duration, Instant};

use tracing::debug;

use super::vad::{compute_rms, EnergyVad};
use crate::wakeword::WakeModel;

/// Wake score source (platform/model adapter).
pub trait WakeDetector: Send {
    /// Returns a wake score in [0.0, 1.0]. Higher = more confident.
    fn detect(&mut self, samples: &[i16]) -> f32;
}

/// Scores sudden energy spikes against a moving average.
pub struct EnergyPatternDetector {
    prev_energy: f32,
    spike_ratio_threshold: f32,
}

impl EnergyPatternDetector {
    pub fn new(spike_ratio_threshold: f32) -> Self {
        Self {
            prev_energy: 0.0,
            spike_ratio_threshold,
        }
    }
}

impl WakeDetector for EnergyPatternDetector {
    fn detect(&mut self, samples: &[i16]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let rms = compute_rms(samples);
        let score =
            if self.prev_energy > 100.0 && rms > self.prev_energy * self.spike_ratio_threshold {
                let ratio = rms / self.prev_energy;
                ((ratio - self.spike_ratio_threshold) / self.spike_ratio_threshold).clamp(0.0, 1.0)
            } else {
                0.0
            };
        self.prev_energy = self.prev_energy * 0.9 + rms * 0.1;
        score
    }
}

/// Two-stage wake confirmation thresholds.
pub struct WakeConfirmer {
    pub th_low: f32,
    pub th_high: f32,
    pub confirm_window: Duration,
    pub confirm_frames_needed: u32,
}

impl WakeConfirmer {
    pub fn from_model(model: &WakeModel) -> Self {
        Self {
            th_low: model.th_low,
            th_high: model.th_high,
            confirm_window: Duration::from_millis(model.confirm_window_ms),
            confirm_frames_needed: model.confirm_frames_needed,
        }
    }

    #[inline]
    pub fn should_trigger(&self, wake_score: f32) -> bool {
        wake_score >= self.th_low
    }

    /// `scores` are wake scores collected during the confirmation window.
    pub fn is_confirmed(&self, scores: &[f32]) -> bool {
        let hits = scores.iter().filter(|&&s| s >= self.th_high).count() as u32;
        hits >= self.confirm_frames_needed
    }
}

enum Stage {
    Armed,
    Confirming { started: Instant, scores: Vec<f32> },
    Cooldown { until: Instant },
}

/// Frame-by-frame wake phrase spotter. Pure: time is passed in.
pub struct KeywordSpotter {
    vad: EnergyVad,
    detector: Box<dyn WakeDetector>,
    confirmer: WakeConfirmer,
    refractory: Duration,
    stage: Stage,
}

impl KeywordSpotter {
    pub fn new(model: &WakeModel) -> Self {
        Self::with_detector(model, Box::new(EnergyPatternDetector::new(model.spike_ratio)))
    }

    pub fn with_detector(model: &WakeModel, detector: Box<dyn WakeDetector>) -> Self {
        Self {
            vad: EnergyVad::new(model.silence_threshold),
            detector,
            confirmer: WakeConfirmer::from_model(model),
            refractory: Duration::from_millis(model.refractory_ms),
            stage: Stage::Armed,
        }
    }

    /// Feed one frame captured at `now`. Returns true when the wake phrase is confirmed.
    pub fn process(&mut self, samples: &[i16], now: Instant) -> bool {
        match &mut self.stage {
            Stage::Cooldown { until } => {
                if now >= *until {
                    self.stage = Stage::Armed;
                }
                // Keep the energy average tracking the room.
                self.detector.detect(samples);
                false
            }
            Stage::Armed => {
                if !self.vad.process(samples) {
                    return false;
                }
                let score = self.detector.detect(samples);
                if self.confirmer.should_trigger(score) {
                    debug!(wake_score = score, "wake_candidate");
                    self.stage = Stage::Confirming {
                        started: now,
                        scores: vec![score],
                    };
                }
                false
            }
            Stage::Confirming { started, scores } => {
                if now.duration_since(*started) <= self.confirmer.confirm_window {
                    scores.push(self.detector.detect(samples));
                    return false;
                }
                let confirmed = self.confirmer.is_confirmed(scores);
                debug!(confirmed, frames = scores.len(), "wake_confirmation_window_closed");
                self.stage = if confirmed {
                    Stage::Cooldown {
                        until: now + self.refractory,
                    }
                } else {
                    Stage::Armed
                };
                confirmed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(32);

    fn frame(amplitude: i16) -> Vec<i16> {
        vec![amplitude; 512]
    }

    /// Feeds `frames` starting at `*t`, returning how many confirmations fired.
    fn feed(spotter: &mut KeywordSpotter, t: &mut Instant, amplitude: i16, frames: usize) -> usize {
        let samples = frame(amplitude);
        let mut fired = 0;
        for _ in 0..frames {
            if spotter.process(&samples, *t) {
                fired += 1;
            }
            *t += FRAME;
        }
        fired
    }

    #[test]
    fn test_spike_detector_scores() {
        let mut det = EnergyPatternDetector::new(3.0);
        assert_eq!(det.detect(&frame(500)), 0.0);
        for _ in 0..60 {
            det.detect(&frame(500));
        }
        assert!(det.detect(&frame(8000)) > 0.5);
        // Sustained loudness pulls the average up until it stops counting as a spike.
        for _ in 0..5 {
            det.detect(&frame(8000));
        }
        assert_eq!(det.detect(&frame(8000)), 0.0);
    }

    #[test]
    fn test_confirmed_spike_fires_once() {
        let model = WakeModel::default();
        let mut spotter = KeywordSpotter::new(&model);
        let mut t = Instant::now();

        assert_eq!(feed(&mut spotter, &mut t, 500, 60), 0);
        // Sustained loud speech: triggers, confirms, then cools down.
        assert_eq!(feed(&mut spotter, &mut t, 8000, 12), 1);
        assert_eq!(feed(&mut spotter, &mut t, 8000, 20), 0);
    }

    #[test]
    fn test_unconfirmed_spike_rearms() {
        let model = WakeModel::default();
        let mut spotter = KeywordSpotter::new(&model);
        let mut t = Instant::now();

        feed(&mut spotter, &mut t, 500, 60);
        // One loud frame, then back to room noise: rejected.
        assert_eq!(feed(&mut spotter, &mut t, 8000, 1), 0);
        assert_eq!(feed(&mut spotter, &mut t, 500, 10), 0);
        assert!(matches!(spotter.stage, Stage::Armed));
    }

    #[test]
    fn test_confirmer_thresholds() {
        let confirmer = WakeConfirmer::from_model(&WakeModel::default());
        assert!(confirmer.should_trigger(0.02));
        assert!(!confirmer.should_trigger(0.01));
        assert!(confirmer.is_confirmed(&[0.5, 0.05, 0.0]));
        assert!(!confirmer.is_confirmed(&[0.5, 0.01]));
    }
}
