//! Voice-activity judgment for audio frames.
//!
//! The segmenter treats voicing as a pluggable predicate so the endpointing
//! state machine can be tested without any signal processing. The default
//! implementation is an adaptive energy gate: it tracks the ambient noise
//! floor with an exponential decay and calls a frame voiced when its RMS
//! rises a configurable multiple above that floor.

use crate::audio::frame::AudioFrame;
use crate::config::VadSettings;
use crate::defaults;

/// Judgment of whether a frame contains speech.
pub trait VadPredicate: Send {
    /// Returns true if the frame is voiced.
    ///
    /// Called once per frame in arrival order; implementations may keep
    /// internal state (noise tracking) keyed to that order.
    fn is_voiced(&mut self, frame: &AudioFrame) -> bool;

    /// Resets any adaptive state.
    fn reset(&mut self);
}

/// Configuration for the adaptive energy gate.
#[derive(Debug, Clone, Copy)]
pub struct EnergyVadConfig {
    /// Threshold never drops below this RMS value.
    pub min_threshold: f32,
    /// Multiplier above the tracked noise floor to call a frame voiced.
    pub threshold_multiplier: f32,
    /// Exponential decay for the noise-floor estimate (0..1).
    pub noise_decay: f32,
}

impl Default for EnergyVadConfig {
    fn default() -> Self {
        Self {
            min_threshold: defaults::VAD_MIN_THRESHOLD,
            threshold_multiplier: defaults::VAD_THRESHOLD_MULTIPLIER,
            noise_decay: defaults::VAD_NOISE_DECAY,
        }
    }
}

impl From<&VadSettings> for EnergyVadConfig {
    fn from(v: &VadSettings) -> Self {
        Self {
            min_threshold: v.min_threshold,
            threshold_multiplier: v.threshold_multiplier,
            noise_decay: v.noise_decay,
        }
    }
}

/// Adaptive energy gate over precomputed frame RMS.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    config: EnergyVadConfig,
    noise_floor: f32,
}

impl EnergyVad {
    pub fn new(config: EnergyVadConfig) -> Self {
        Self {
            config,
            noise_floor: defaults::VAD_NOISE_FLOOR_INITIAL,
        }
    }

    /// Current speech threshold derived from the noise floor.
    pub fn threshold(&self) -> f32 {
        (self.noise_floor * self.config.threshold_multiplier).max(self.config.min_threshold)
    }

    /// Current noise-floor estimate.
    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(EnergyVadConfig::default())
    }
}

impl VadPredicate for EnergyVad {
    fn is_voiced(&mut self, frame: &AudioFrame) -> bool {
        let voiced = frame.rms > self.threshold();
        // Track the floor from every frame; the slow decay keeps speech
        // energy from dragging the estimate up meaningfully.
        self.noise_floor = self.config.noise_decay * self.noise_floor
            + (1.0 - self.config.noise_decay) * frame.rms;
        voiced
    }

    fn reset(&mut self) {
        self.noise_floor = defaults::VAD_NOISE_FLOOR_INITIAL;
    }
}

/// Calculates the Root Mean Square (RMS) of audio samples.
///
/// # Returns
/// Normalized RMS value (0.0 to 1.0), where:
/// - 0.0 represents silence
/// - ~0.707 represents a full-scale sine wave
/// - 1.0 represents maximum amplitude
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}
