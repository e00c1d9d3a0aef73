//! # Voice Activity Gate
//!
//! Classifies an audio snapshot as speech or silence before it is allowed
//! to reach the recognition model. Thresholds adapt to the recent audio
//! environment: a rolling window of energy/peak measurements yields a
//! median baseline, and the effective thresholds track half of it (capped
//! by the configured base threshold).

use crate::audio::snapshot::AudioSnapshot;
use crate::config::VadConfig;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

/// Rolling window capacity for the adaptive baseline.
const STATS_WINDOW: usize = 20;

/// Minimum number of observations before the baseline is recomputed.
const MIN_SAMPLES_FOR_BASELINE: usize = 5;

/// Rolling energy/peak statistics shared by every gate invocation.
struct RollingStats {
    recent_energies: VecDeque<f32>,
    recent_peaks: VecDeque<f32>,
    baseline_energy: f32,
    baseline_peak: f32,
}

impl RollingStats {
    fn new() -> Self {
        Self {
            recent_energies: VecDeque::with_capacity(STATS_WINDOW),
            recent_peaks: VecDeque::with_capacity(STATS_WINDOW),
            baseline_energy: 0.005,
            baseline_peak: 0.01,
        }
    }

    fn record(&mut self, energy: f32, peak: f32) {
        self.recent_energies.push_back(energy);
        self.recent_peaks.push_back(peak);

        if self.recent_energies.len() > STATS_WINDOW {
            self.recent_energies.pop_front();
            self.recent_peaks.pop_front();
        }

        if self.recent_energies.len() >= MIN_SAMPLES_FOR_BASELINE {
            self.baseline_energy = median(self.recent_energies.iter().copied());
            self.baseline_peak = median(self.recent_peaks.iter().copied());
        }
    }
}

/// Median of a measurement window; even-sized windows average the middle pair.
fn median(values: impl Iterator<Item = f32>) -> f32 {
    let mut sorted: Vec<f32> = values.collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Adaptive speech/silence classifier.
///
/// ## Shared state:
/// The statistics window is process-wide and mutated by every invocation,
/// so it lives behind a Mutex; the classification itself works on an
/// immutable snapshot.
pub struct VoiceActivityGate {
    base_threshold: f32,
    min_duration_seconds: f32,
    stats: Mutex<RollingStats>,
}

impl VoiceActivityGate {
    pub fn new(config: &VadConfig) -> Self {
        Self {
            base_threshold: config.base_threshold,
            min_duration_seconds: config.min_duration_seconds,
            stats: Mutex::new(RollingStats::new()),
        }
    }

    /// Classify a snapshot; true means speech was detected.
    ///
    /// ## Decision:
    /// Speech iff `energy > energy_thresh OR peak > peak_thresh`. The peak
    /// check is what lets soft speech through: a quiet utterance can fail
    /// the RMS test while still spiking well above the noise floor.
    pub fn is_speech(&self, snapshot: &AudioSnapshot) -> bool {
        let samples = snapshot.normalized_samples();

        if samples.is_empty() {
            return false;
        }

        let duration = samples.len() as f32 / snapshot.sample_rate as f32;
        if duration < self.min_duration_seconds {
            debug!("Skipping audio: too short ({:.2}s)", duration);
            return false;
        }

        let energy = (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt();
        let peak = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));

        let (energy_thresh, peak_thresh) = {
            let mut stats = self.stats.lock().unwrap();
            stats.record(energy, peak);

            (
                self.base_threshold.min(stats.baseline_energy * 0.5),
                (self.base_threshold * 2.0).min(stats.baseline_peak * 0.5),
            )
        };

        let has_energy = energy > energy_thresh;
        let has_peak = peak > peak_thresh;

        debug!(
            "Audio analysis: duration={:.2}s, energy={:.4}, peak={:.4}, \
             thresholds: energy={:.4}, peak={:.4}",
            duration, energy, peak, energy_thresh, peak_thresh
        );

        has_energy || has_peak
    }
}
