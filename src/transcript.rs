//! Transcript reconciliation: the last stage before events leave the server.
//!
//! Recognition tasks complete in whatever order the pool and the engine
//! allow. The reconciler serializes them back into the contract downstream
//! consumers rely on: per-source monotonic sequence numbers, no duplicate
//! partials, and no partial for a segment that already produced its final.

use crate::session::SourceId;
use serde::Serialize;

/// Kind of a downstream transcript event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Partial,
    Final,
    Info,
    Error,
}

/// An ordered event on a session's transcript stream.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub session_id: String,
    pub source: SourceId,
    pub kind: EventKind,
    /// Monotonic per source within a session.
    pub seq: u64,
    pub text: String,
    pub confidence: Option<f32>,
}

/// Outcome of one recognition task, tagged with the segment it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionUpdate {
    Partial {
        segment_id: u64,
        text: String,
        confidence: Option<f32>,
    },
    Final {
        segment_id: u64,
        /// `None` when cleanup reduced the transcript below the emit
        /// threshold; the segment still retires its partial lineage.
        text: Option<String>,
        confidence: Option<f32>,
    },
    Failed {
        segment_id: u64,
        message: String,
    },
}

/// Orders recognition updates into a clean per-source event stream.
pub struct Reconciler {
    session_id: String,
    source: SourceId,
    next_seq: u64,
    /// Segment id and text of the most recent live partial.
    open_partial: Option<(u64, String)>,
    /// Highest segment id that already reached a terminal update.
    last_settled_segment: Option<u64>,
}

impl Reconciler {
    pub fn new(session_id: impl Into<String>, source: SourceId) -> Self {
        Self {
            session_id: session_id.into(),
            source,
            next_seq: 0,
            open_partial: None,
            last_settled_segment: None,
        }
    }

    /// Emit an informational event, e.g. a connection greeting.
    pub fn info(&mut self, text: impl Into<String>) -> TranscriptEvent {
        self.emit(EventKind::Info, text.into(), None)
    }

    /// Emit an error event without disturbing partial/final bookkeeping.
    pub fn error(&mut self, text: impl Into<String>) -> TranscriptEvent {
        self.emit(EventKind::Error, text.into(), None)
    }

    /// Fold one recognition update into the stream.
    ///
    /// Returns `None` when the update is redundant (duplicate partial text)
    /// or stale (a partial for a segment that has already settled).
    pub fn apply(&mut self, update: RecognitionUpdate) -> Option<TranscriptEvent> {
        match update {
            RecognitionUpdate::Partial {
                segment_id,
                text,
                confidence,
            } => {
                if self.is_settled(segment_id) {
                    return None;
                }
                if let Some((open_id, open_text)) = &self.open_partial
                    && *open_id == segment_id
                    && *open_text == text
                {
                    return None;
                }
                if text.is_empty() {
                    return None;
                }
                self.open_partial = Some((segment_id, text.clone()));
                Some(self.emit(EventKind::Partial, text, confidence))
            }
            RecognitionUpdate::Final {
                segment_id,
                text,
                confidence,
            } => {
                self.settle(segment_id);
                text.map(|text| self.emit(EventKind::Final, text, confidence))
            }
            RecognitionUpdate::Failed {
                segment_id,
                message,
            } => {
                self.settle(segment_id);
                Some(self.emit(EventKind::Error, message, None))
            }
        }
    }

    fn is_settled(&self, segment_id: u64) -> bool {
        self.last_settled_segment
            .is_some_and(|settled| segment_id <= settled)
    }

    fn settle(&mut self, segment_id: u64) {
        self.last_settled_segment = Some(
            self.last_settled_segment
                .map_or(segment_id, |s| s.max(segment_id)),
        );
        if self
            .open_partial
            .as_ref()
            .is_some_and(|(id, _)| *id <= segment_id)
        {
            self.open_partial = None;
        }
    }

    fn emit(&mut self, kind: EventKind, text: String, confidence: Option<f32>) -> TranscriptEvent {
        let seq = self.next_seq;
        self.next_seq += 1;
        TranscriptEvent {
            session_id: self.session_id.clone(),
            source: self.source,
            kind,
            seq,
            text,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconciler() -> Reconciler {
        Reconciler::new("interview-1", SourceId::Mic)
    }

    fn partial(segment_id: u64, text: &str) -> RecognitionUpdate {
        RecognitionUpdate::Partial {
            segment_id,
            text: text.to_string(),
            confidence: None,
        }
    }

    fn fin(segment_id: u64, text: &str) -> RecognitionUpdate {
        RecognitionUpdate::Final {
            segment_id,
            text: Some(text.to_string()),
            confidence: Some(0.95),
        }
    }

    #[test]
    fn test_seq_is_monotonic_across_kinds() {
        let mut r = reconciler();
        let a = r.info("connected");
        let b = r.apply(partial(0, "hel")).unwrap();
        let c = r.apply(partial(0, "hello")).unwrap();
        let d = r.apply(fin(0, "hello world")).unwrap();

        assert_eq!(
            (a.seq, b.seq, c.seq, d.seq),
            (0, 1, 2, 3)
        );
        assert_eq!(d.kind, EventKind::Final);
        assert_eq!(d.confidence, Some(0.95));
    }

    #[test]
    fn test_duplicate_partial_text_suppressed() {
        let mut r = reconciler();
        assert!(r.apply(partial(0, "hello")).is_some());
        assert!(r.apply(partial(0, "hello")).is_none());
        assert!(r.apply(partial(0, "hello there")).is_some());
    }

    #[test]
    fn test_partial_after_final_for_same_segment_dropped() {
        let mut r = reconciler();
        assert!(r.apply(partial(0, "draft")).is_some());
        assert!(r.apply(fin(0, "final text")).is_some());

        // A slow partial task for segment 0 completes after the final
        assert!(r.apply(partial(0, "stale draft")).is_none());

        // The next segment's partials flow normally
        assert!(r.apply(partial(1, "next segment")).is_some());
    }

    #[test]
    fn test_failed_retires_lineage_with_error_event() {
        let mut r = reconciler();
        assert!(r.apply(partial(0, "doomed")).is_some());

        let err = r
            .apply(RecognitionUpdate::Failed {
                segment_id: 0,
                message: "recognition timed out after 8000 ms".to_string(),
            })
            .unwrap();
        assert_eq!(err.kind, EventKind::Error);

        assert!(r.apply(partial(0, "late hypothesis")).is_none());
    }

    #[test]
    fn test_empty_final_settles_without_event() {
        let mut r = reconciler();
        assert!(r.apply(partial(0, "uh")).is_some());

        let event = r.apply(RecognitionUpdate::Final {
            segment_id: 0,
            text: None,
            confidence: None,
        });
        assert!(event.is_none());

        // Lineage is still retired
        assert!(r.apply(partial(0, "uh huh")).is_none());
    }

    #[test]
    fn test_partials_never_followed_by_final_do_not_block_stream() {
        let mut r = reconciler();
        assert!(r.apply(partial(0, "abandoned")).is_some());
        // Segment 0 never settles; a later segment still flows
        assert!(r.apply(partial(1, "new speech")).is_some());
        assert!(r.apply(fin(1, "new speech indeed")).is_some());
        // Now segment 0 is older than the settled high-water mark
        assert!(r.apply(partial(0, "very stale")).is_none());
    }

    #[test]
    fn test_empty_partial_text_suppressed() {
        let mut r = reconciler();
        assert!(r.apply(partial(0, "")).is_none());
    }
}
