//! The external recognition engine contract.
//!
//! The acoustic model itself is an external collaborator; this crate only
//! owns the calling convention: a bounded audio segment in, text plus
//! confidence out, failures as typed errors rather than panics crossing the
//! pipeline.

use crate::error::{InterscribeError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A recognition result for one audio segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub confidence: Option<f32>,
}

/// Trait for speech recognition backends.
///
/// Implementations may call out over HTTP, IPC, or into an in-process
/// model; the dispatcher only assumes the call can block for a while.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize a bounded segment of mono PCM.
    async fn recognize(&self, samples: &[i16], sample_rate: u32) -> Result<Recognition>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// Recognizer backed by an external HTTP inference service.
///
/// Posts raw little-endian PCM16 and expects a JSON body
/// `{"text": "...", "confidence": 0.93}`.
pub struct HttpRecognizer {
    client: reqwest::Client,
    url: String,
}

#[derive(serde::Deserialize)]
struct HttpRecognition {
    text: String,
    confidence: Option<f32>,
}

impl HttpRecognizer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(&self, samples: &[i16], sample_rate: u32) -> Result<Recognition> {
        let mut body = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            body.extend_from_slice(&sample.to_le_bytes());
        }

        let response = self
            .client
            .post(&self.url)
            .query(&[("sample_rate", sample_rate)])
            .header("content-type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| InterscribeError::Recognition {
                message: format!("engine request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(InterscribeError::Recognition {
                message: format!("engine returned status {}", response.status()),
            });
        }

        let parsed: HttpRecognition =
            response
                .json()
                .await
                .map_err(|e| InterscribeError::Recognition {
                    message: format!("engine returned malformed body: {}", e),
                })?;

        Ok(Recognition {
            text: parsed.text,
            confidence: parsed.confidence,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Mock recognizer for testing.
#[derive(Debug, Clone)]
pub struct MockRecognizer {
    response: String,
    confidence: Option<f32>,
    should_fail: bool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self {
            response: "mock recognition".to_string(),
            confidence: Some(0.9),
            should_fail: false,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific text.
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    pub fn with_confidence(mut self, confidence: Option<f32>) -> Self {
        self.confidence = confidence;
        self
    }

    /// Configure the mock to fail on recognize.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure a fixed latency per call, for saturation tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of recognize calls observed so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(&self, _samples: &[i16], _sample_rate: u32) -> Result<Recognition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail {
            return Err(InterscribeError::Recognition {
                message: "mock recognition failure".to_string(),
            });
        }
        Ok(Recognition {
            text: self.response.clone(),
            confidence: self.confidence,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
