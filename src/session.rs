//! Session and source lifecycle.
//!
//! A session is one live interview; each session carries up to two
//! independent audio sources (the local microphone and the remote side's
//! system audio). Every source runs the same pipeline: frames in, segmenter,
//! recognition dispatch, reconciled transcript events out. Sources share
//! nothing but the session id, the recognition pool, and the outbound event
//! channel, so a stall on one side never delays the other.

use crate::asr::dispatcher::{RecognitionPool, SourceDispatcher};
use crate::audio::frame::AudioFrame;
use crate::audio::vad::EnergyVad;
use crate::config::Config;
use crate::error::{InterscribeError, Result};
use crate::segment::{Segmenter, SegmenterConfig, SegmentEvent};
use crate::transcript::{Reconciler, TranscriptEvent};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which side of the interview a stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// The local microphone (the interviewer or candidate at this machine).
    Mic,
    /// System/loopback audio (the remote participant).
    Sys,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Mic => write!(f, "mic"),
            SourceId::Sys => write!(f, "sys"),
        }
    }
}

impl FromStr for SourceId {
    type Err = InterscribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mic" => Ok(SourceId::Mic),
            "sys" => Ok(SourceId::Sys),
            other => Err(InterscribeError::Transport {
                message: format!("unknown audio source '{}', expected 'mic' or 'sys'", other),
            }),
        }
    }
}

/// Running counters for one source, logged at teardown.
#[derive(Debug, Default)]
pub struct SourceStats {
    pub frames_received: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub decode_errors: AtomicU64,
    pub segments_closed: AtomicU64,
    pub segments_discarded: AtomicU64,
    pub events_emitted: AtomicU64,
}

impl SourceStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn log_summary(&self, session_id: &str, source: SourceId) {
        info!(
            session = %session_id,
            source = %source,
            frames_received = self.frames_received.load(Ordering::Relaxed),
            frames_dropped = self.frames_dropped.load(Ordering::Relaxed),
            decode_errors = self.decode_errors.load(Ordering::Relaxed),
            segments_closed = self.segments_closed.load(Ordering::Relaxed),
            segments_discarded = self.segments_discarded.load(Ordering::Relaxed),
            events_emitted = self.events_emitted.load(Ordering::Relaxed),
            "source pipeline finished"
        );
    }
}

#[derive(Debug)]
struct SessionEntry {
    cancel: CancellationToken,
    sources: Mutex<HashSet<SourceId>>,
}

/// Membership of one source in a session, returned by [`SessionRegistry::attach`].
#[derive(Debug)]
pub struct SourceHandle {
    pub session_id: String,
    pub source: SourceId,
    cancel: CancellationToken,
    entry: Arc<SessionEntry>,
}

impl SourceHandle {
    /// Token cancelled when this source detaches or the whole session stops.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Tracks live sessions and which sources are attached to each.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a source to a session, creating the session on first use.
    ///
    /// A source id may be attached at most once per session; a second mic
    /// connection for the same interview is refused rather than silently
    /// interleaving two streams.
    pub fn attach(&self, session_id: &str, source: SourceId) -> Result<SourceHandle> {
        let entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(SessionEntry {
                    cancel: CancellationToken::new(),
                    sources: Mutex::new(HashSet::new()),
                })
            })
            .clone();

        {
            let mut sources = entry.sources.lock().map_err(|_| InterscribeError::Transport {
                message: "session registry poisoned".to_string(),
            })?;
            if !sources.insert(source) {
                return Err(InterscribeError::Transport {
                    message: format!(
                        "source '{}' is already connected to session '{}'",
                        source, session_id
                    ),
                });
            }
        }

        debug!(session = %session_id, source = %source, "source attached");
        Ok(SourceHandle {
            session_id: session_id.to_string(),
            source,
            cancel: entry.cancel.child_token(),
            entry,
        })
    }

    /// Detaches a source; the session is torn down when its last source leaves.
    pub fn detach(&self, handle: &SourceHandle) {
        handle.cancel.cancel();
        if let Ok(mut sources) = handle.entry.sources.lock() {
            sources.remove(&handle.source);
        }

        let removed = self.sessions.remove_if(&handle.session_id, |_, entry| {
            entry
                .sources
                .lock()
                .map(|sources| sources.is_empty())
                .unwrap_or(true)
        });
        if let Some((_, entry)) = removed {
            entry.cancel.cancel();
            info!(session = %handle.session_id, "session closed");
        } else {
            debug!(session = %handle.session_id, source = %handle.source, "source detached");
        }
    }

    /// Stops a whole session: cancels every attached source's pipeline.
    pub fn stop(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, entry)) => {
                entry.cancel.cancel();
                info!(session = %session_id, "session stopped on request");
                true
            }
            None => false,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Runs one source's pipeline until its frame channel closes or the source
/// is cancelled.
///
/// Frames drive the segmenter; closed segments go to final recognition,
/// the open segment is periodically snapshotted for partials, and every
/// recognition outcome flows through the reconciler before leaving on
/// `events`.
pub async fn run_source_pipeline(
    session_id: String,
    source: SourceId,
    config: Arc<Config>,
    pool: Arc<RecognitionPool>,
    stats: Arc<SourceStats>,
    cancel: CancellationToken,
    mut frames: mpsc::Receiver<AudioFrame>,
    events: mpsc::Sender<TranscriptEvent>,
) {
    let (update_tx, mut update_rx) = mpsc::channel(64);
    let mut dispatcher = SourceDispatcher::new(
        Arc::clone(&pool),
        &config.asr,
        config.audio.sample_rate,
        update_tx,
    );
    let mut segmenter = Segmenter::new(
        SegmenterConfig::from(&config.vad),
        EnergyVad::new((&config.vad).into()),
    );
    let mut reconciler = Reconciler::new(session_id.clone(), source);

    loop {
        tokio::select! {
            frame = frames.recv() => {
                match frame {
                    Some(frame) => {
                        SourceStats::incr(&stats.frames_received);
                        for event in segmenter.push(frame) {
                            handle_segment_event(event, &mut dispatcher, &stats, &session_id, source);
                        }
                        // Snapshotting clones the open segment's audio, so
                        // only do it when a partial would actually run.
                        if dispatcher.wants_partial()
                            && let Some((segment_id, samples)) = segmenter.active_snapshot()
                        {
                            dispatcher.maybe_dispatch_partial(segment_id, samples);
                        }
                    }
                    None => break,
                }
            }
            update = update_rx.recv() => {
                // The dispatcher half is owned here, so the channel stays open
                if let Some(update) = update
                    && let Some(event) = reconciler.apply(update)
                {
                    SourceStats::incr(&stats.events_emitted);
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
            }
            () = cancel.cancelled() => {
                debug!(session = %session_id, source = %source, "pipeline cancelled");
                stats.log_summary(&session_id, source);
                return;
            }
        }
    }

    // Stream ended normally: flush the open segment, then drain the
    // recognition tasks still in flight.
    if let Some(event) = segmenter.finish() {
        handle_segment_event(event, &mut dispatcher, &stats, &session_id, source);
    }
    drop(dispatcher);
    loop {
        tokio::select! {
            update = update_rx.recv() => {
                match update {
                    Some(update) => {
                        if let Some(event) = reconciler.apply(update) {
                            SourceStats::incr(&stats.events_emitted);
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }
            () = cancel.cancelled() => break,
        }
    }

    stats.log_summary(&session_id, source);
}

fn handle_segment_event(
    event: SegmentEvent,
    dispatcher: &mut SourceDispatcher,
    stats: &SourceStats,
    session_id: &str,
    source: SourceId,
) {
    match event {
        SegmentEvent::Opened { id } => {
            debug!(session = %session_id, source = %source, segment = id, "segment opened");
        }
        SegmentEvent::Closed(segment) => {
            SourceStats::incr(&stats.segments_closed);
            debug!(
                session = %session_id,
                source = %source,
                segment = segment.id,
                duration_secs = segment.duration_secs(),
                capped = segment.capped,
                "segment closed, dispatching recognition"
            );
            dispatcher.dispatch_final(segment);
        }
        SegmentEvent::Discarded { id } => {
            SourceStats::incr(&stats.segments_discarded);
            debug!(session = %session_id, source = %source, segment = id, "segment discarded");
        }
    }
}

/// Warn-level note for dropped inbound frames, rate-limited by the caller.
pub fn note_frame_dropped(stats: &SourceStats, session_id: &str, source: SourceId) {
    let dropped = stats.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1;
    if dropped == 1 || dropped.is_multiple_of(100) {
        warn!(
            session = %session_id,
            source = %source,
            dropped,
            "inbound audio queue full, dropping frames"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_parses_known_names() {
        assert_eq!("mic".parse::<SourceId>().unwrap(), SourceId::Mic);
        assert_eq!("sys".parse::<SourceId>().unwrap(), SourceId::Sys);
        assert!("speaker".parse::<SourceId>().is_err());
        assert!("MIC".parse::<SourceId>().is_err());
    }

    #[test]
    fn test_source_id_display_roundtrip() {
        for source in [SourceId::Mic, SourceId::Sys] {
            assert_eq!(source.to_string().parse::<SourceId>().unwrap(), source);
        }
    }

    #[test]
    fn test_attach_rejects_duplicate_source() {
        let registry = SessionRegistry::new();
        let _mic = registry.attach("s1", SourceId::Mic).unwrap();
        let _sys = registry.attach("s1", SourceId::Sys).unwrap();

        let err = registry.attach("s1", SourceId::Mic).unwrap_err();
        assert!(err.to_string().contains("already connected"));
    }

    #[test]
    fn test_same_source_allowed_in_different_sessions() {
        let registry = SessionRegistry::new();
        let _a = registry.attach("s1", SourceId::Mic).unwrap();
        let _b = registry.attach("s2", SourceId::Mic).unwrap();
        assert_eq!(registry.session_count(), 2);
    }

    #[test]
    fn test_session_removed_when_last_source_detaches() {
        let registry = SessionRegistry::new();
        let mic = registry.attach("s1", SourceId::Mic).unwrap();
        let sys = registry.attach("s1", SourceId::Sys).unwrap();

        registry.detach(&mic);
        assert_eq!(registry.session_count(), 1);

        registry.detach(&sys);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_detach_cancels_only_that_source() {
        let registry = SessionRegistry::new();
        let mic = registry.attach("s1", SourceId::Mic).unwrap();
        let sys = registry.attach("s1", SourceId::Sys).unwrap();

        let sys_token = sys.cancel_token();
        registry.detach(&mic);

        assert!(mic.cancel_token().is_cancelled());
        assert!(!sys_token.is_cancelled());
    }

    #[test]
    fn test_stop_cancels_all_sources() {
        let registry = SessionRegistry::new();
        let mic = registry.attach("s1", SourceId::Mic).unwrap();
        let sys = registry.attach("s1", SourceId::Sys).unwrap();

        assert!(registry.stop("s1"));
        assert!(mic.cancel_token().is_cancelled());
        assert!(sys.cancel_token().is_cancelled());
        assert_eq!(registry.session_count(), 0);

        assert!(!registry.stop("s1"));
    }

    #[test]
    fn test_reattach_after_session_close() {
        let registry = SessionRegistry::new();
        let mic = registry.attach("s1", SourceId::Mic).unwrap();
        registry.detach(&mic);

        let again = registry.attach("s1", SourceId::Mic).unwrap();
        assert!(!again.cancel_token().is_cancelled());
    }
}
