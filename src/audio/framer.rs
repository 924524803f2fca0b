//! Turns a raw capture stream into fixed-duration frames.
//!
//! Accepts mono samples at the source's native rate, resamples to the
//! canonical rate, and cuts the result into frames of a fixed duration.
//! Timestamps come from the emitted-sample clock, not wall time, so the
//! stream is reproducible in tests.

use crate::audio::frame::AudioFrame;
use crate::audio::resample::LinearResampler;

/// Configuration for the frame builder.
#[derive(Debug, Clone, Copy)]
pub struct FramerConfig {
    /// Native rate of the incoming raw samples.
    pub native_rate: u32,
    /// Canonical rate frames are emitted at.
    pub target_rate: u32,
    /// Frame duration in milliseconds.
    pub frame_ms: u32,
}

/// Accumulates resampled audio and emits numbered, timestamped frames.
pub struct FrameBuilder {
    resampler: LinearResampler,
    target_rate: u32,
    frame_samples: usize,
    pending: Vec<i16>,
    next_seq: u32,
    emitted_samples: u64,
}

impl FrameBuilder {
    pub fn new(config: FramerConfig) -> Self {
        let frame_samples = (config.target_rate as usize * config.frame_ms as usize) / 1000;
        Self {
            resampler: LinearResampler::new(config.native_rate, config.target_rate),
            target_rate: config.target_rate,
            frame_samples: frame_samples.max(1),
            pending: Vec::with_capacity(frame_samples),
            next_seq: 0,
            emitted_samples: 0,
        }
    }

    /// Feeds raw native-rate samples; returns every full frame now available.
    pub fn push(&mut self, raw: &[i16]) -> Vec<AudioFrame> {
        let resampled = self.resampler.push(raw);
        self.pending.extend_from_slice(&resampled);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let rest = self.pending.split_off(self.frame_samples);
            let samples = std::mem::replace(&mut self.pending, rest);
            frames.push(self.emit(samples));
        }
        frames
    }

    /// Flushes the remaining partial buffer as a short final frame.
    ///
    /// Returns `None` when nothing is pending. Called at stream end so the
    /// tail of the last utterance is not dropped.
    pub fn flush(&mut self) -> Option<AudioFrame> {
        if self.pending.is_empty() {
            return None;
        }
        let samples = std::mem::take(&mut self.pending);
        Some(self.emit(samples))
    }

    fn emit(&mut self, samples: Vec<i16>) -> AudioFrame {
        let t0 = self.emitted_samples as f64 / self.target_rate as f64;
        self.emitted_samples += samples.len() as u64;
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        AudioFrame::new(seq, t0, self.target_rate, samples)
    }
}
