//! Transcript cleanup applied between the engine and the event stream.
//!
//! Raw engine output is noisy: stutters come back as repeated words, filler
//! sounds come back as tokens, and finals arrive without terminal
//! punctuation. All steps are toggled from [`AsrConfig`] so a deployment
//! that wants verbatim output can turn them off.

use crate::config::AsrConfig;

/// Filler tokens stripped when they appear as standalone words.
const FILLERS: &[&str] = &["um", "uh", "uhm", "erm", "hmm", "mmm", "huh"];

/// Post-processing rules for recognized text.
#[derive(Debug, Clone)]
pub struct TranscriptPolish {
    collapse_repeats: bool,
    strip_fillers: bool,
    sentence_punctuation: bool,
    min_final_chars: usize,
}

impl TranscriptPolish {
    pub fn from_config(config: &AsrConfig) -> Self {
        Self {
            collapse_repeats: config.collapse_repeats,
            strip_fillers: config.strip_fillers,
            sentence_punctuation: config.sentence_punctuation,
            min_final_chars: config.min_final_chars,
        }
    }

    /// Light cleanup for in-flight partial hypotheses.
    ///
    /// Partials are throwaway text, so no punctuation and no length gate;
    /// just enough cleanup that the live caption is readable.
    pub fn partial(&self, raw: &str) -> String {
        self.clean_words(raw)
    }

    /// Full cleanup for a final transcript.
    ///
    /// `trailing_silence` is true when the segment closed because the speaker
    /// stopped, false when it was force-closed mid-speech; only the former
    /// gets terminal punctuation. Returns `None` when the cleaned text is too
    /// short to be worth emitting.
    pub fn final_text(&self, raw: &str, trailing_silence: bool) -> Option<String> {
        let mut text = self.clean_words(raw);
        if text.chars().count() < self.min_final_chars {
            return None;
        }
        if self.sentence_punctuation
            && trailing_silence
            && !text.ends_with(['.', '!', '?', ',', ';', ':', '。', '！', '？'])
        {
            text.push('.');
        }
        Some(text)
    }

    fn clean_words(&self, raw: &str) -> String {
        let mut out: Vec<&str> = Vec::new();
        for word in raw.split_whitespace() {
            if self.strip_fillers && FILLERS.contains(&trim_word(word).as_str()) {
                continue;
            }
            if self.collapse_repeats
                && let Some(prev) = out.last()
                && trim_word(prev) == trim_word(word)
                && !trim_word(word).is_empty()
            {
                continue;
            }
            out.push(word);
        }
        out.join(" ")
    }
}

/// Lowercased word with surrounding punctuation removed, for comparisons.
fn trim_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}
