//! The audio frame that flows between pipeline stages.

use crate::audio::vad::calculate_rms;

/// A fixed-duration chunk of mono 16-bit PCM with capture metadata.
///
/// `seq` strictly increases per source within a session; gaps mean frames
/// were dropped upstream and are tolerated, not treated as corruption.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Monotonic per-source sequence number.
    pub seq: u32,
    /// Capture timestamp in seconds since stream start.
    pub t0: f64,
    /// Sample rate in Hz (canonical rate after framing).
    pub sample_rate: u32,
    /// Channel count; always 1 after capture.
    pub channel_count: u8,
    /// PCM samples.
    pub samples: Vec<i16>,
    /// RMS energy in the normalized float domain, precomputed at capture.
    pub rms: f32,
}

impl AudioFrame {
    /// Creates a frame, computing its RMS energy.
    pub fn new(seq: u32, t0: f64, sample_rate: u32, samples: Vec<i16>) -> Self {
        let rms = calculate_rms(&samples);
        Self {
            seq,
            t0,
            sample_rate,
            channel_count: 1,
            samples,
            rms,
        }
    }

    /// Duration of this frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Timestamp of the end of this frame in seconds since stream start.
    pub fn end_t(&self) -> f64 {
        self.t0 + self.duration_secs()
    }
}
