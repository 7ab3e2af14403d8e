//! Reconciles growing job snapshots into live box and progress block updates.

use crate::chunk::extract_new_chunk;
use crate::text_clean::{clean_for_display, clean_for_speech};

/// Per-job streaming state. `previously_shown_len <= full_text_so_far.len()` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamState {
    pub full_text_so_far: String,
    pub previously_shown_len: usize,
    pub last_displayed_chunk: String,
    pub is_streaming: bool,
}

/// What a single snapshot changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileOutcome {
    /// Raw newly-arrived suffix; empty when the snapshot carried nothing new.
    pub chunk: String,
    pub live_box_changed: bool,
    pub progress_changed: bool,
    /// Speech-ready text for the narration queue.
    pub speech: Option<String>,
}

/// Splits a growing response between the live box (freshest chunk only) and
/// the progress block (everything shown before it).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamReconciler {
    state: StreamState,
    user_message: Option<String>,
    status_label: String,
    progress_block: Option<String>,
}

impl StreamReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets all per-job state and opens the live box.
    pub fn start(&mut self, user_message: Option<String>) {
        *self = Self {
            state: StreamState {
                is_streaming: true,
                ..StreamState::default()
            },
            user_message,
            ..Self::default()
        };
    }

    /// Closes the live box and forgets everything about the current stream.
    pub fn hide_live_box(&mut self) {
        *self = Self::default();
    }

    pub fn on_full_text_update(
        &mut self,
        full_text: &str,
        user_message: Option<&str>,
        status_label: Option<&str>,
        narrate: bool,
    ) -> ReconcileOutcome {
        if !self.state.is_streaming {
            return ReconcileOutcome::default();
        }
        if let Some(message) = user_message {
            self.user_message = Some(message.to_string());
        }
        if let Some(label) = status_label {
            self.set_status_label(label);
        }
        // A shorter snapshot would rewind the shown length and re-speak content later.
        if full_text.len() < self.state.full_text_so_far.len() {
            return ReconcileOutcome::default();
        }

        let chunk = extract_new_chunk(full_text, self.state.previously_shown_len).to_string();
        if chunk.is_empty() {
            return ReconcileOutcome::default();
        }

        let mut outcome = ReconcileOutcome {
            chunk,
            ..ReconcileOutcome::default()
        };

        let previous = &self.state.full_text_so_far[..self.state.previously_shown_len];
        if !previous.trim().is_empty() {
            self.progress_block = Some(previous.to_string());
            outcome.progress_changed = true;
        }

        let display = clean_for_display(&outcome.chunk);
        if !display.is_empty() {
            self.state.last_displayed_chunk = display;
            outcome.live_box_changed = true;
        }

        if narrate {
            let spoken = clean_for_speech(&outcome.chunk);
            if !spoken.is_empty() {
                outcome.speech = Some(spoken);
            }
        }

        self.state.full_text_so_far = full_text.to_string();
        self.state.previously_shown_len = full_text.len();
        outcome
    }

    pub fn set_status_label(&mut self, label: &str) {
        let label = clean_for_display(label);
        if !label.is_empty() {
            self.status_label = label;
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming
    }

    /// The freshest displayable chunk; never blanked by an empty poll.
    pub fn live_box(&self) -> &str {
        &self.state.last_displayed_chunk
    }

    pub fn progress_block(&self) -> Option<&str> {
        self.progress_block.as_deref()
    }

    pub fn status_label(&self) -> &str {
        &self.status_label
    }

    pub fn user_message(&self) -> Option<&str> {
        self.user_message.as_deref()
    }

    /// Everything displayed so far for this job, progress block plus live box.
    pub fn shown_text(&self) -> &str {
        &self.state.full_text_so_far[..self.state.previously_shown_len]
    }
}
