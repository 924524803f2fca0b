//! Audio capture, framing, and voice-activity detection.

#[cfg(feature = "capture")]
pub mod capture;
pub mod frame;
pub mod framer;
pub mod resample;
pub mod vad;
