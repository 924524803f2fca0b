//! Schedules recognition work against the bounded engine pool.
//!
//! One [`RecognitionPool`] is shared by every session; its semaphore bounds
//! how many engine calls run at once, and waiters are served in FIFO order so
//! no session can starve another. Each source additionally serializes its own
//! finals so segment N's transcript is produced before segment N+1's, while
//! partials opportunistically use spare pool capacity and are simply skipped
//! when the pool is saturated.

use crate::asr::engine::Recognizer;
use crate::asr::polish::TranscriptPolish;
use crate::config::AsrConfig;
use crate::segment::Segment;
use crate::transcript::RecognitionUpdate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Shared recognition capacity: the engine handle plus the worker semaphore.
pub struct RecognitionPool {
    recognizer: Arc<dyn Recognizer>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl RecognitionPool {
    pub fn new(recognizer: Arc<dyn Recognizer>, workers: usize, timeout: Duration) -> Self {
        Self {
            recognizer,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    pub fn from_config(recognizer: Arc<dyn Recognizer>, config: &AsrConfig) -> Self {
        Self::new(
            recognizer,
            config.workers,
            Duration::from_millis(config.timeout_ms as u64),
        )
    }

    /// Permits not currently held by a recognition task.
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Name of the backing engine, for logs.
    pub fn engine_name(&self) -> &str {
        self.recognizer.name()
    }
}

/// Per-source scheduler feeding updates to that source's reconciler.
pub struct SourceDispatcher {
    pool: Arc<RecognitionPool>,
    polish: Arc<TranscriptPolish>,
    sample_rate: u32,
    partial_interval: Duration,
    last_partial: Option<Instant>,
    /// Completion signal of the most recently dispatched final. The slot is
    /// rotated synchronously in [`Self::dispatch_final`], so the chain order
    /// is fixed at dispatch time regardless of task poll order.
    prev_final: Option<oneshot::Receiver<()>>,
    updates: mpsc::Sender<RecognitionUpdate>,
}

impl SourceDispatcher {
    pub fn new(
        pool: Arc<RecognitionPool>,
        config: &AsrConfig,
        sample_rate: u32,
        updates: mpsc::Sender<RecognitionUpdate>,
    ) -> Self {
        Self {
            pool,
            polish: Arc::new(TranscriptPolish::from_config(config)),
            sample_rate,
            partial_interval: Duration::from_millis(config.partial_interval_ms as u64),
            last_partial: None,
            prev_final: None,
            updates,
        }
    }

    /// Dispatches final recognition for a closed segment.
    ///
    /// The call waits for a pool permit (FIFO), so it is never dropped; a
    /// recognition failure or timeout becomes a `Failed` update instead of a
    /// fabricated transcript. Each final waits for its predecessor's
    /// completion ticket before starting, so updates for segment N always
    /// precede segment N+1's.
    pub fn dispatch_final(&mut self, segment: Segment) {
        let pool = Arc::clone(&self.pool);
        let polish = Arc::clone(&self.polish);
        let updates = self.updates.clone();
        let sample_rate = self.sample_rate;

        // Reserve the ordering slot here, not inside the task, so the chain
        // reflects dispatch order rather than runtime poll order.
        let wait_for = self.prev_final.take();
        let (done_tx, done_rx) = oneshot::channel();
        self.prev_final = Some(done_rx);

        tokio::spawn(async move {
            if let Some(prev) = wait_for {
                // A dropped sender still means the predecessor is finished
                let _ = prev.await;
            }
            let permit = match Arc::clone(&pool.permits).acquire_owned().await {
                Ok(permit) => permit,
                // Semaphore closed: the pool is shutting down
                Err(_) => return,
            };

            let segment_id = segment.id;
            let trailing_silence = !segment.capped;
            let update = match tokio::time::timeout(
                pool.timeout,
                pool.recognizer.recognize(&segment.samples, sample_rate),
            )
            .await
            {
                Ok(Ok(recognition)) => RecognitionUpdate::Final {
                    segment_id,
                    text: polish.final_text(&recognition.text, trailing_silence),
                    confidence: recognition.confidence,
                },
                Ok(Err(e)) => {
                    warn!("recognition failed for segment {}: {}", segment_id, e);
                    RecognitionUpdate::Failed {
                        segment_id,
                        message: format!("recognition failed: {}", e),
                    }
                }
                Err(_) => {
                    let err = crate::error::InterscribeError::RecognitionTimeout {
                        timeout_ms: pool.timeout.as_millis() as u32,
                    };
                    warn!("segment {}: {}", segment_id, err);
                    RecognitionUpdate::Failed {
                        segment_id,
                        message: err.to_string(),
                    }
                }
            };
            drop(permit);

            // Receiver gone means the source is tearing down
            let _ = updates.send(update).await;
            let _ = done_tx.send(());
        });
    }

    /// Whether a partial dispatched right now would actually run.
    ///
    /// Lets callers skip snapshotting a segment's audio when the throttle
    /// window is still open or the pool has no spare capacity.
    pub fn wants_partial(&self) -> bool {
        if let Some(last) = self.last_partial
            && last.elapsed() < self.partial_interval
        {
            return false;
        }
        self.pool.permits.available_permits() > 0
    }

    /// Dispatches partial recognition for a still-open segment, if the
    /// throttle interval has elapsed and the pool has spare capacity.
    ///
    /// Returns whether a task was actually started. Skipping is silent:
    /// partials are advisory and the final pass covers the audio anyway.
    pub fn maybe_dispatch_partial(&mut self, segment_id: u64, samples: Vec<i16>) -> bool {
        if let Some(last) = self.last_partial
            && last.elapsed() < self.partial_interval
        {
            return false;
        }

        let permit = match Arc::clone(&self.pool.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("pool saturated, skipping partial for segment {}", segment_id);
                return false;
            }
        };
        self.last_partial = Some(Instant::now());

        let pool = Arc::clone(&self.pool);
        let polish = Arc::clone(&self.polish);
        let updates = self.updates.clone();
        let sample_rate = self.sample_rate;

        tokio::spawn(async move {
            let result = tokio::time::timeout(
                pool.timeout,
                pool.recognizer.recognize(&samples, sample_rate),
            )
            .await;
            drop(permit);

            // Partial failures stay quiet; the final pass reports errors
            if let Ok(Ok(recognition)) = result {
                let _ = updates
                    .send(RecognitionUpdate::Partial {
                        segment_id,
                        text: polish.partial(&recognition.text),
                        confidence: recognition.confidence,
                    })
                    .await;
            }
        });
        true
    }
}
