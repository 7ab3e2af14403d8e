//! Ordering and backlog policy for narration.
//!
//! The queue itself never plays audio. A driver calls [`SpeechQueue::begin_next`]
//! when it is free to speak and [`SpeechQueue::finish`] when playback ends,
//! successfully or not. Only one segment is ever in the `Speaking` state.

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::text_clean::MIN_TEXT_CHARS;

pub type SegmentId = u64;

/// Tunables for [`SpeechQueue`]. The defaults were tuned by ear, not derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechQueueConfig {
    pub min_chars: usize,
    pub batch_target_chars: usize,
    pub backlog_limit: usize,
}

impl Default for SpeechQueueConfig {
    fn default() -> Self {
        Self {
            min_chars: MIN_TEXT_CHARS,
            batch_target_chars: 150,
            backlog_limit: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechSegment {
    pub id: SegmentId,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueState {
    #[default]
    Idle,
    Speaking(SegmentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Too short or pure status noise; nothing was queued.
    Rejected,
    /// `segments` were appended; `dropped` stale ones were discarded from the front.
    Queued { segments: usize, dropped: usize },
}

static SKIP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:thinking|processing|working|loading|waiting|reading|searching|editing|planning|delegating|running a command|looking things up)\b[\s.\x{2026}]*$",
    )
    .expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpeechQueue {
    config: SpeechQueueConfig,
    pending: VecDeque<SpeechSegment>,
    state: QueueState,
    next_id: SegmentId,
}

impl SpeechQueue {
    pub fn new(config: SpeechQueueConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SpeechQueueConfig {
        &self.config
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == QueueState::Idle
    }

    /// Number of segments waiting to be spoken (excludes the one playing).
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_texts(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(|segment| segment.text.as_str())
    }

    /// Appends `text`, pre-split into batches, and applies the backlog policy.
    pub fn enqueue(&mut self, text: &str) -> EnqueueOutcome {
        let text = text.trim();
        if text.chars().count() < self.config.min_chars || is_skippable(text) {
            return EnqueueOutcome::Rejected;
        }

        let batches = split_into_batches(text, self.config.batch_target_chars);
        let segments = batches.len();
        for batch in batches {
            self.next_id += 1;
            self.pending.push_back(SpeechSegment {
                id: self.next_id,
                text: batch,
            });
        }

        let mut dropped = 0;
        while self.pending.len() > self.config.backlog_limit.max(1) {
            self.pending.pop_front();
            dropped += 1;
        }

        EnqueueOutcome::Queued { segments, dropped }
    }

    /// Moves the oldest pending segment into playback. Returns `None` while
    /// another segment is still speaking or when nothing is queued.
    pub fn begin_next(&mut self) -> Option<SpeechSegment> {
        if !self.is_idle() {
            return None;
        }
        let segment = self.pending.pop_front()?;
        self.state = QueueState::Speaking(segment.id);
        Some(segment)
    }

    /// Marks `id` as finished. A completion for a segment that is no longer the
    /// one speaking (cancelled, superseded) is ignored and returns `false`.
    pub fn finish(&mut self, id: SegmentId) -> bool {
        if self.state == QueueState::Speaking(id) {
            self.state = QueueState::Idle;
            true
        } else {
            false
        }
    }

    /// Drops everything and returns to idle. Returns the segment that was speaking.
    pub fn cancel_all(&mut self) -> Option<SegmentId> {
        self.pending.clear();
        match std::mem::take(&mut self.state) {
            QueueState::Speaking(id) => Some(id),
            QueueState::Idle => None,
        }
    }
}

fn is_skippable(text: &str) -> bool {
    !text.chars().any(char::is_alphabetic) || SKIP_PATTERN.is_match(text)
}

/// Splits `text` at sentence-like boundaries and re-batches the pieces so that
/// each batch stays close to `target` characters.
pub fn split_into_batches(text: &str, target: usize) -> Vec<String> {
    let text = text.trim();
    let target = target.max(1);
    if text.chars().count() <= target {
        return vec![text.to_string()];
    }

    let mut batches = Vec::new();
    let mut current = String::new();
    for sentence in split_sentences(text) {
        for piece in split_long_sentence(&sentence, target) {
            if !current.is_empty() && current.chars().count() + 1 + piece.chars().count() > target
            {
                batches.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&piece);
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if !matches!(c, '.' | '!' | '?' | ';' | ':') {
            continue;
        }
        while let Some(&next) = chars.peek() {
            if matches!(next, '.' | '!' | '?') {
                current.push(next);
                chars.next();
            } else {
                break;
            }
        }
        // "3.14" and "main.rs" are not boundaries.
        if chars.peek().is_none_or(|next| next.is_whitespace()) {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

fn split_long_sentence(sentence: &str, target: usize) -> Vec<String> {
    if sentence.chars().count() <= target {
        return vec![sentence.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > target {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::{split_long_sentence, split_sentences};

    #[test]
    fn sentences_split_on_terminators_followed_by_space() {
        assert_eq!(
            split_sentences("Pi is 3.14. Open main.rs now! Done? Yes: ok"),
            vec!["Pi is 3.14.", "Open main.rs now!", "Done?", "Yes:", "ok"]
        );
    }

    #[test]
    fn repeated_terminators_stay_with_their_sentence() {
        assert_eq!(split_sentences("Wait... what?! Fine"), vec!["Wait...", "what?!", "Fine"]);
    }

    #[test]
    fn long_sentences_break_at_words() {
        let pieces = split_long_sentence("alpha beta gamma delta", 11);
        assert_eq!(pieces, vec!["alpha beta", "gamma delta"]);
    }
}
