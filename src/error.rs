//! Error types for interscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InterscribeError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Wire codec errors
    #[error("Malformed audio frame: {message}")]
    MalformedFrame { message: String },

    // Transport errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Malformed control message: {message}")]
    MalformedControl { message: String },

    // Recognition errors
    #[error("Recognition failed: {message}")]
    Recognition { message: String },

    #[error("Recognition timed out after {timeout_ms}ms")]
    RecognitionTimeout { timeout_ms: u32 },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, InterscribeError>;
