use crate::defaults;
use crate::error::{InterscribeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub vad: VadSettings,
    pub asr: AsrConfig,
}

/// WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. "127.0.0.1:8970".
    pub listen: String,
    /// Upper bound on buffered inbound audio per source, in bytes.
    pub inbound_buffer_bytes: usize,
}

/// Audio capture and framing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Loopback/monitor device for server-side system audio. None = auto-detect.
    pub device: Option<String>,
    /// Canonical sample rate all pipeline stages operate at.
    pub sample_rate: u32,
    /// Frame duration in milliseconds.
    pub frame_ms: u32,
}

/// Segmenter / voice-gate configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadSettings {
    pub min_threshold: f32,
    pub threshold_multiplier: f32,
    pub noise_decay: f32,
    pub pre_speech_ms: u32,
    pub end_silence_ms: u32,
    pub max_segment_ms: u32,
    pub min_segment_ms: u32,
}

/// Recognition dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AsrConfig {
    /// Endpoint of the external recognition engine.
    pub engine_url: String,
    /// Worker pool size shared across all sessions.
    pub workers: usize,
    /// Minimum interval between partial recognition passes (ms).
    pub partial_interval_ms: u32,
    /// Timeout for a single recognition call (ms).
    pub timeout_ms: u32,
    /// Collapse immediately repeated words in transcripts.
    pub collapse_repeats: bool,
    /// Strip standalone filler tokens ("um", "uh", ...).
    pub strip_fillers: bool,
    /// Terminate finals that ended on trailing silence with punctuation.
    pub sentence_punctuation: bool,
    /// Drop final transcripts shorter than this many characters.
    pub min_final_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: defaults::LISTEN_ADDR.to_string(),
            inbound_buffer_bytes: defaults::INBOUND_BUFFER_BYTES,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            frame_ms: defaults::FRAME_MS,
        }
    }
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            min_threshold: defaults::VAD_MIN_THRESHOLD,
            threshold_multiplier: defaults::VAD_THRESHOLD_MULTIPLIER,
            noise_decay: defaults::VAD_NOISE_DECAY,
            pre_speech_ms: defaults::PRE_SPEECH_MS,
            end_silence_ms: defaults::END_SILENCE_MS,
            max_segment_ms: defaults::MAX_SEGMENT_MS,
            min_segment_ms: defaults::MIN_SEGMENT_MS,
        }
    }
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            engine_url: defaults::ENGINE_URL.to_string(),
            workers: defaults::ASR_WORKERS,
            partial_interval_ms: defaults::PARTIAL_INTERVAL_MS,
            timeout_ms: defaults::ASR_TIMEOUT_MS,
            collapse_repeats: true,
            strip_fillers: true,
            sentence_punctuation: true,
            min_final_chars: 2,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InterscribeError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                InterscribeError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file is missing.
    ///
    /// Invalid TOML in an existing file is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config = toml::from_str(&contents)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - INTERSCRIBE_LISTEN → server.listen
    /// - INTERSCRIBE_AUDIO_DEVICE → audio.device
    /// - INTERSCRIBE_ASR_WORKERS → asr.workers
    /// - INTERSCRIBE_ENGINE_URL → asr.engine_url
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(listen) = std::env::var("INTERSCRIBE_LISTEN")
            && !listen.is_empty()
        {
            self.server.listen = listen;
        }

        if let Ok(device) = std::env::var("INTERSCRIBE_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(workers) = std::env::var("INTERSCRIBE_ASR_WORKERS")
            && let Ok(n) = workers.parse::<usize>()
            && n > 0
        {
            self.asr.workers = n;
        }

        if let Ok(url) = std::env::var("INTERSCRIBE_ENGINE_URL")
            && !url.is_empty()
        {
            self.asr.engine_url = url;
        }

        self
    }

    /// Check cross-field constraints the serde layer cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(InterscribeError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.audio.frame_ms == 0 {
            return Err(InterscribeError::ConfigInvalidValue {
                key: "audio.frame_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.asr.workers == 0 {
            return Err(InterscribeError::ConfigInvalidValue {
                key: "asr.workers".to_string(),
                message: "worker pool must have at least one slot".to_string(),
            });
        }
        if self.vad.max_segment_ms <= self.vad.min_segment_ms {
            return Err(InterscribeError::ConfigInvalidValue {
                key: "vad.max_segment_ms".to_string(),
                message: "must exceed vad.min_segment_ms".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.vad.noise_decay) {
            return Err(InterscribeError::ConfigInvalidValue {
                key: "vad.noise_decay".to_string(),
                message: "must be in [0, 1)".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path.
    ///
    /// Returns ~/.config/interscribe/config.toml on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("interscribe").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_interscribe_env() {
        remove_env("INTERSCRIBE_LISTEN");
        remove_env("INTERSCRIBE_AUDIO_DEVICE");
        remove_env("INTERSCRIBE_ASR_WORKERS");
        remove_env("INTERSCRIBE_ENGINE_URL");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.server.listen, "127.0.0.1:8970");
        assert_eq!(config.server.inbound_buffer_bytes, 1024 * 1024);

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.frame_ms, 200);

        assert_eq!(config.vad.pre_speech_ms, 400);
        assert_eq!(config.vad.end_silence_ms, 800);
        assert_eq!(config.vad.max_segment_ms, 10_000);
        assert_eq!(config.vad.min_segment_ms, 300);

        assert_eq!(config.asr.workers, 4);
        assert_eq!(config.asr.partial_interval_ms, 400);
        assert_eq!(config.asr.timeout_ms, 8000);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [server]
            listen = "0.0.0.0:9000"

            [audio]
            device = "monitor-of-speakers"
            sample_rate = 16000
            frame_ms = 100

            [vad]
            end_silence_ms = 1200
            max_segment_ms = 15000

            [asr]
            workers = 2
            partial_interval_ms = 500
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.audio.device, Some("monitor-of-speakers".to_string()));
        assert_eq!(config.audio.frame_ms, 100);
        assert_eq!(config.vad.end_silence_ms, 1200);
        assert_eq!(config.vad.max_segment_ms, 15000);
        assert_eq!(config.asr.workers, 2);
        assert_eq!(config.asr.partial_interval_ms, 500);

        // Unspecified fields keep defaults
        assert_eq!(config.vad.pre_speech_ms, 400);
        assert_eq!(config.asr.timeout_ms, 8000);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [asr]
            workers = 8
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.asr.workers, 8);
        assert_eq!(config.server.listen, "127.0.0.1:8970");
        assert_eq!(config.audio.sample_rate, 16000);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [audio
            device = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_interscribe_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let invalid_toml = r#"
            [audio
            device = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = Config {
            asr: AsrConfig {
                workers: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("asr.workers"));
    }

    #[test]
    fn test_validate_rejects_inverted_segment_bounds() {
        let config = Config {
            vad: VadSettings {
                max_segment_ms: 200,
                min_segment_ms: 300,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_listen() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_interscribe_env();

        set_env("INTERSCRIBE_LISTEN", "0.0.0.0:7000");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.server.listen, "0.0.0.0:7000");

        clear_interscribe_env();
    }

    #[test]
    fn test_env_override_workers_ignores_garbage() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_interscribe_env();

        set_env("INTERSCRIBE_ASR_WORKERS", "not-a-number");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.asr.workers, 4);

        set_env("INTERSCRIBE_ASR_WORKERS", "0");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.asr.workers, 4);

        clear_interscribe_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_interscribe_env();

        set_env("INTERSCRIBE_AUDIO_DEVICE", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.audio.device, None);

        clear_interscribe_env();
    }
}
