//! Default configuration constants for interscribe.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication.

/// Canonical audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
/// All pipeline stages downstream of the framer operate at this rate.
pub const SAMPLE_RATE: u32 = 16000;

/// Frame duration in milliseconds.
///
/// 200ms bounds per-message overhead on the wire while keeping end-to-end
/// latency low. At 16kHz mono this is 3200 samples (6400 bytes of PCM).
pub const FRAME_MS: u32 = 200;

/// Minimum energy threshold for the adaptive voice gate.
///
/// RMS-based floor (0.0 to 1.0). The adaptive gate never drops below this,
/// so a dead-quiet room does not make the detector hair-triggered.
pub const VAD_MIN_THRESHOLD: f32 = 0.01;

/// Multiplier applied to the tracked noise floor to obtain the speech threshold.
pub const VAD_THRESHOLD_MULTIPLIER: f32 = 2.8;

/// Exponential decay for the noise-floor estimate.
///
/// Close to 1.0 so a brief loud burst does not poison the ambient estimate.
pub const VAD_NOISE_DECAY: f32 = 0.997;

/// Initial noise-floor estimate (normalized float RMS).
pub const VAD_NOISE_FLOOR_INITIAL: f32 = 0.0006;

/// Pre-speech padding duration in milliseconds.
///
/// Frames kept in a rolling buffer while idle, prepended when speech starts.
/// Captures soft onsets (plosives, fricatives) that occur before energy
/// crosses the gate threshold.
pub const PRE_SPEECH_MS: u32 = 400;

/// End-silence duration in milliseconds before a segment is closed.
pub const END_SILENCE_MS: u32 = 800;

/// Maximum segment duration in milliseconds.
///
/// Segments reaching this cap are force-closed and a fresh segment opens on
/// the same ongoing speech; bounds both memory and recognition latency for
/// very long utterances.
pub const MAX_SEGMENT_MS: u32 = 10_000;

/// Minimum viable voiced duration in milliseconds.
///
/// Segments whose voiced span is shorter are discarded and never dispatched
/// to recognition; filters spurious noise bursts.
pub const MIN_SEGMENT_MS: u32 = 300;

/// Minimum interval between partial recognition passes, in milliseconds.
///
/// Throttles incremental recognition against a still-growing segment so the
/// engine is not hammered on every frame.
pub const PARTIAL_INTERVAL_MS: u32 = 400;

/// Recognition worker pool size shared across all sessions.
pub const ASR_WORKERS: usize = 4;

/// Timeout for a single recognition call, in milliseconds.
pub const ASR_TIMEOUT_MS: u32 = 8_000;

/// Endpoint of the external recognition engine.
pub const ENGINE_URL: &str = "http://127.0.0.1:8001/recognize";

/// Upper bound on buffered inbound audio per source, in bytes.
///
/// When the queue holds this much undecoded PCM, newly arriving frames are
/// dropped rather than queued; the segmenter tolerates the resulting gaps.
pub const INBOUND_BUFFER_BYTES: usize = 1024 * 1024;

/// Default listen address for the WebSocket server.
pub const LISTEN_ADDR: &str = "127.0.0.1:8970";
