//! Voice-activity segmentation.
//!
//! Partitions one source's ordered frame stream into speech segments: a
//! rolling pre-speech buffer keeps utterance onsets from being clipped, an
//! end-silence timeout closes segments, a duration cap force-closes runaway
//! ones, and a minimum viable length filters noise bursts.
//!
//! The state machine is driven entirely by frame timestamps, never the wall
//! clock, so every transition (including the duration-cap force-close and
//! the pre-speech seeding) is deterministic and testable without a live
//! audio source. Sequence gaps show up as timestamp gaps and therefore count
//! as silence; the absent samples are simply not concatenated.

use crate::audio::frame::AudioFrame;
use crate::audio::vad::VadPredicate;
use crate::config::VadSettings;
use std::collections::VecDeque;

/// Lifecycle state of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Still accumulating frames.
    Open,
    /// Finalized by silence, duration cap, or stream end.
    Closed,
    /// Closed below the minimum viable length; never dispatched.
    Discarded,
}

/// A contiguous run of frames bounded by voice-activity decisions.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Monotonic per-source segment ordinal.
    pub id: u64,
    /// Sequence number of the first frame (including pre-speech padding).
    pub start_seq: u32,
    /// Sequence number of the last appended frame; None while open.
    pub end_seq: Option<u32>,
    /// Stream time of the segment start in seconds.
    pub start_t: f64,
    /// Stream time of the end of the last appended frame.
    pub end_t: f64,
    /// Concatenated PCM samples.
    pub samples: Vec<i16>,
    /// Whether the segment hit the duration cap (speech is still ongoing).
    pub capped: bool,
    pub state: SegmentState,
}

impl Segment {
    /// Total buffered duration in seconds, trailing silence included.
    pub fn duration_secs(&self) -> f64 {
        self.end_t - self.start_t
    }
}

/// Current phase of the segmenter state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterPhase {
    /// No speech; frames are retained in the pre-speech buffer.
    Idle,
    /// An open segment is receiving voiced frames.
    Active,
    /// An open segment is accumulating end silence.
    Trailing,
}

/// Output of one segmenter step.
#[derive(Debug, Clone)]
pub enum SegmentEvent {
    /// A segment opened on voice-activity onset.
    Opened { id: u64 },
    /// A segment closed and is ready for final recognition.
    Closed(Segment),
    /// A segment closed below the minimum viable length.
    Discarded { id: u64 },
}

/// Endpointing parameters, in stream seconds.
#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    pub pre_speech_secs: f64,
    pub end_silence_secs: f64,
    pub max_segment_secs: f64,
    pub min_segment_secs: f64,
}

impl From<&VadSettings> for SegmenterConfig {
    fn from(v: &VadSettings) -> Self {
        Self {
            pre_speech_secs: v.pre_speech_ms as f64 / 1000.0,
            end_silence_secs: v.end_silence_ms as f64 / 1000.0,
            max_segment_secs: v.max_segment_ms as f64 / 1000.0,
            min_segment_secs: v.min_segment_ms as f64 / 1000.0,
        }
    }
}

struct OpenSegment {
    id: u64,
    start_seq: u32,
    start_t: f64,
    /// Stream time of the first voiced frame; pre-speech padding excluded.
    first_voiced_t: f64,
    end_seq: u32,
    end_t: f64,
    samples: Vec<i16>,
}

impl OpenSegment {
    fn append(&mut self, frame: &AudioFrame) {
        self.samples.extend_from_slice(&frame.samples);
        self.end_seq = frame.seq;
        self.end_t = frame.end_t();
    }

    fn into_segment(self, capped: bool, state: SegmentState) -> Segment {
        Segment {
            id: self.id,
            start_seq: self.start_seq,
            end_seq: Some(self.end_seq),
            start_t: self.start_t,
            end_t: self.end_t,
            samples: self.samples,
            capped,
            state,
        }
    }
}

/// Per-source segmenter state machine.
pub struct Segmenter<V: VadPredicate> {
    config: SegmenterConfig,
    vad: V,
    phase: SegmenterPhase,
    pre_buffer: VecDeque<AudioFrame>,
    current: Option<OpenSegment>,
    /// Stream time at which the latest voiced frame ended.
    last_voiced_end: f64,
    next_id: u64,
}

impl<V: VadPredicate> Segmenter<V> {
    pub fn new(config: SegmenterConfig, vad: V) -> Self {
        Self {
            config,
            vad,
            phase: SegmenterPhase::Idle,
            pre_buffer: VecDeque::new(),
            current: None,
            last_voiced_end: 0.0,
            next_id: 0,
        }
    }

    pub fn phase(&self) -> SegmenterPhase {
        self.phase
    }

    /// Snapshot of the open segment's audio for partial recognition.
    pub fn active_snapshot(&self) -> Option<(u64, Vec<i16>)> {
        self.current.as_ref().map(|s| (s.id, s.samples.clone()))
    }

    /// Advances the state machine by one frame.
    pub fn push(&mut self, frame: AudioFrame) -> Vec<SegmentEvent> {
        let voiced = self.vad.is_voiced(&frame);
        let mut events = Vec::new();

        match self.phase {
            SegmenterPhase::Idle => {
                if voiced {
                    events.push(self.open_segment(&frame));
                    self.append(&frame);
                    self.last_voiced_end = frame.end_t();
                    self.phase = SegmenterPhase::Active;
                } else {
                    self.buffer_pre_speech(frame);
                    return events;
                }
            }
            SegmenterPhase::Active | SegmenterPhase::Trailing => {
                // A capped close leaves the phase Active with no open
                // segment; the next frame starts the successor directly.
                if self.current.is_none() {
                    events.push(self.open_bare_segment(&frame));
                }
                self.append(&frame);

                if voiced {
                    self.last_voiced_end = frame.end_t();
                    self.phase = SegmenterPhase::Active;
                } else {
                    self.phase = SegmenterPhase::Trailing;
                    // Timestamp arithmetic makes dropped-frame gaps count
                    // as silence without any special casing.
                    let silence = frame.end_t() - self.last_voiced_end;
                    if silence >= self.config.end_silence_secs {
                        events.push(self.close_current(false));
                        self.phase = SegmenterPhase::Idle;
                        return events;
                    }
                }
            }
        }

        // Duration cap: force-close and stay Active for the same speech.
        if let Some(open) = &self.current
            && frame.end_t() - open.start_t >= self.config.max_segment_secs
        {
            events.push(self.close_current(true));
            self.phase = SegmenterPhase::Active;
        }

        events
    }

    /// Closes any open segment at stream end.
    pub fn finish(&mut self) -> Option<SegmentEvent> {
        if self.current.is_none() {
            self.phase = SegmenterPhase::Idle;
            return None;
        }
        let event = self.close_current(false);
        self.phase = SegmenterPhase::Idle;
        Some(event)
    }

    /// Resets to Idle, dropping any open segment and buffered padding.
    pub fn reset(&mut self) {
        self.phase = SegmenterPhase::Idle;
        self.pre_buffer.clear();
        self.current = None;
        self.last_voiced_end = 0.0;
        self.vad.reset();
    }

    fn buffer_pre_speech(&mut self, frame: AudioFrame) {
        self.pre_buffer.push_back(frame);
        while self.pre_buffer_duration() > self.config.pre_speech_secs {
            if self.pre_buffer.pop_front().is_none() {
                break;
            }
        }
    }

    fn pre_buffer_duration(&self) -> f64 {
        self.pre_buffer.iter().map(|f| f.duration_secs()).sum()
    }

    fn open_segment(&mut self, onset: &AudioFrame) -> SegmentEvent {
        let id = self.next_id;
        self.next_id += 1;

        let (start_seq, start_t) = self
            .pre_buffer
            .front()
            .map(|f| (f.seq, f.t0))
            .unwrap_or((onset.seq, onset.t0));

        let mut open = OpenSegment {
            id,
            start_seq,
            start_t,
            first_voiced_t: onset.t0,
            end_seq: start_seq,
            end_t: start_t,
            samples: Vec::new(),
        };
        for buffered in self.pre_buffer.drain(..) {
            open.append(&buffered);
        }
        self.current = Some(open);
        SegmentEvent::Opened { id }
    }

    /// Opens a successor segment after a capped close; no pre-speech seed,
    /// speech is already in progress.
    fn open_bare_segment(&mut self, frame: &AudioFrame) -> SegmentEvent {
        let id = self.next_id;
        self.next_id += 1;
        self.current = Some(OpenSegment {
            id,
            start_seq: frame.seq,
            start_t: frame.t0,
            first_voiced_t: frame.t0,
            end_seq: frame.seq,
            end_t: frame.t0,
            samples: Vec::new(),
        });
        SegmentEvent::Opened { id }
    }

    fn append(&mut self, frame: &AudioFrame) {
        if let Some(open) = &mut self.current {
            open.append(frame);
        }
    }

    fn close_current(&mut self, capped: bool) -> SegmentEvent {
        // close_current is only called with an open segment present
        let open = match self.current.take() {
            Some(open) => open,
            None => {
                return SegmentEvent::Discarded { id: self.next_id };
            }
        };

        let voiced_duration = (self.last_voiced_end - open.first_voiced_t).max(0.0);
        if voiced_duration < self.config.min_segment_secs {
            SegmentEvent::Discarded { id: open.id }
        } else {
            SegmentEvent::Closed(open.into_segment(capped, SegmentState::Closed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted predicate so endpointing tests are independent of any
    /// signal processing.
    struct ScriptedVad {
        threshold: f32,
    }

    impl ScriptedVad {
        fn new() -> Self {
            Self { threshold: 0.02 }
        }
    }

    impl VadPredicate for ScriptedVad {
        fn is_voiced(&mut self, frame: &AudioFrame) -> bool {
            frame.rms > self.threshold
        }

        fn reset(&mut self) {}
    }

    fn config() -> SegmenterConfig {
        SegmenterConfig {
            pre_speech_secs: 0.4,
            end_silence_secs: 0.8,
            max_segment_secs: 10.0,
            min_segment_secs: 0.3,
        }
    }

    fn segmenter() -> Segmenter<ScriptedVad> {
        Segmenter::new(config(), ScriptedVad::new())
    }

    /// 200ms frame of either speech or silence at the given seq.
    fn frame(seq: u32, voiced: bool) -> AudioFrame {
        let amplitude = if voiced { 3000 } else { 0 };
        AudioFrame::new(seq, seq as f64 * 0.2, 16000, vec![amplitude; 3200])
    }

    fn closed_segments(events: Vec<SegmentEvent>) -> Vec<Segment> {
        events
            .into_iter()
            .filter_map(|e| match e {
                SegmentEvent::Closed(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_silence_only_never_opens_a_segment() {
        let mut seg = segmenter();
        for i in 0..50 {
            let events = seg.push(frame(i, false));
            assert!(events.is_empty());
        }
        assert_eq!(seg.phase(), SegmenterPhase::Idle);
        assert!(seg.finish().is_none());
    }

    #[test]
    fn test_onset_seeds_pre_speech_padding() {
        let mut seg = segmenter();
        // 5 silent frames; only the last two (400ms) fit the padding window
        for i in 0..5 {
            seg.push(frame(i, false));
        }
        let events = seg.push(frame(5, true));
        assert!(matches!(events[0], SegmentEvent::Opened { id: 0 }));

        let (_, samples) = seg.active_snapshot().unwrap();
        // 2 padding frames + 1 voiced frame
        assert_eq!(samples.len(), 3 * 3200);
        assert_eq!(seg.phase(), SegmenterPhase::Active);
    }

    #[test]
    fn test_long_utterance_closes_once_after_end_silence() {
        // 3.2s of voiced audio as frames seq 0..=15, then 1.5s of silence:
        // one segment covering frames 0-15 closes after the 0.8s timeout.
        let mut seg = segmenter();
        let mut all = Vec::new();
        for i in 0..16 {
            all.extend(seg.push(frame(i, true)));
        }
        assert_eq!(seg.phase(), SegmenterPhase::Active);

        for i in 16..24 {
            all.extend(seg.push(frame(i, false)));
        }

        let closed = closed_segments(all);
        assert_eq!(closed.len(), 1);
        let segment = &closed[0];
        assert_eq!(segment.start_seq, 0);
        assert!(segment.end_seq.unwrap() >= 15);
        assert!(!segment.capped);
        assert_eq!(segment.state, SegmentState::Closed);
        assert_eq!(seg.phase(), SegmenterPhase::Idle);
    }

    #[test]
    fn test_trailing_phase_before_close() {
        let mut seg = segmenter();
        for i in 0..4 {
            seg.push(frame(i, true));
        }
        seg.push(frame(4, false));
        assert_eq!(seg.phase(), SegmenterPhase::Trailing);

        // Speech resumes before the timeout
        seg.push(frame(5, true));
        assert_eq!(seg.phase(), SegmenterPhase::Active);
    }

    #[test]
    fn test_short_burst_is_discarded() {
        let mut seg = segmenter();
        // Single 200ms voiced frame, below the 300ms minimum
        seg.push(frame(0, true));
        let mut all = Vec::new();
        for i in 1..8 {
            all.extend(seg.push(frame(i, false)));
        }

        assert!(
            all.iter()
                .any(|e| matches!(e, SegmentEvent::Discarded { .. })),
            "sub-minimum segment should be discarded"
        );
        assert!(closed_segments(all).is_empty());
    }

    #[test]
    fn test_duration_cap_force_closes_and_reopens() {
        let mut seg = segmenter();
        let mut all = Vec::new();
        // 12s of continuous speech: cap at 10s forces a close mid-speech
        for i in 0..60 {
            all.extend(seg.push(frame(i, true)));
        }

        let capped: Vec<_> = closed_segments(all)
            .into_iter()
            .filter(|s| s.capped)
            .collect();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].start_seq, 0);
        assert!((capped[0].duration_secs() - 10.0).abs() < 0.21);

        // Successor is already active on the same speech
        assert_eq!(seg.phase(), SegmenterPhase::Active);
        let (id, _) = seg.active_snapshot().unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_seq_gap_treated_as_silence_without_abort() {
        let mut seg = segmenter();
        seg.push(frame(0, true));
        seg.push(frame(1, true));
        // Frames 2 and 3 lost: 400ms gap, below the 800ms timeout
        let events = seg.push(frame(4, true));
        assert!(events.is_empty());
        assert_eq!(seg.phase(), SegmenterPhase::Active);

        // Gap samples are absent, not zero-filled
        let (_, samples) = seg.active_snapshot().unwrap();
        assert_eq!(samples.len(), 3 * 3200);
    }

    #[test]
    fn test_long_seq_gap_closes_segment() {
        let mut seg = segmenter();
        for i in 0..4 {
            seg.push(frame(i, true));
        }
        // Next frame arrives 1.2s late and silent; gap plus frame exceeds timeout
        let late = frame(10, false);
        let events = seg.push(late);
        assert_eq!(closed_segments(events).len(), 1);
        assert_eq!(seg.phase(), SegmenterPhase::Idle);
    }

    #[test]
    fn test_finish_flushes_open_segment() {
        let mut seg = segmenter();
        for i in 0..5 {
            seg.push(frame(i, true));
        }
        let event = seg.finish().expect("open segment should flush");
        assert!(matches!(event, SegmentEvent::Closed(_)));
        assert!(seg.active_snapshot().is_none());
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut seg = segmenter();
        for i in 0..5 {
            seg.push(frame(i, true));
        }
        seg.reset();
        assert_eq!(seg.phase(), SegmenterPhase::Idle);
        assert!(seg.active_snapshot().is_none());
    }

    #[test]
    fn test_segment_ids_are_monotonic() {
        let mut seg = segmenter();
        let mut ids = Vec::new();
        // Two utterances separated by long silence
        for round in 0u32..2 {
            let base = round * 20;
            for i in 0..5 {
                for e in seg.push(frame(base + i, true)) {
                    if let SegmentEvent::Opened { id } = e {
                        ids.push(id);
                    }
                }
            }
            for i in 5..12 {
                seg.push(frame(base + i, false));
            }
        }
        assert_eq!(ids, vec![0, 1]);
    }
}
