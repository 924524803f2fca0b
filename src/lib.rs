//! interscribe - live interview transcription core
//!
//! Ingests two audio streams per session (local microphone and remote
//! system audio) over WebSocket, segments them by voice activity, and
//! streams partial and final transcripts back with per-source ordering
//! guarantees.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod asr;
pub mod audio;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod segment;
pub mod server;
pub mod session;
pub mod transcript;
pub mod wire;

// Recognition seam (the engine itself is an external service)
pub use asr::engine::{HttpRecognizer, MockRecognizer, Recognition, Recognizer};

// Pipeline building blocks
pub use audio::frame::AudioFrame;
pub use audio::framer::{FrameBuilder, FramerConfig};
pub use segment::{Segment, SegmentEvent, Segmenter, SegmenterConfig};
pub use transcript::{EventKind, Reconciler, TranscriptEvent};

// Session transport
pub use session::{SessionRegistry, SourceId};

// Error handling
pub use error::{InterscribeError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.1+abc1234"` when git hash is available, `"0.3.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
