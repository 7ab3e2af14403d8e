use std::collections::VecDeque;

use crate::stream::StreamReconciler;
use crate::view_model::{AppViewModel, JobView};
use crate::voice::{CaptureRetry, VoiceEngine, VoiceEngineSelection};

/// Opaque backend job identifier.
pub type JobId = String;

const TITLE_MAX_CHARS: usize = 60;

/// Identity of the job currently in flight; persisted so it survives a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: JobId,
    pub project: Option<String>,
    pub title: String,
    pub pending_user_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content: String,
}

/// A user request waiting for its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub message: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Sending,
    /// A job restored from a previous run is being checked against the backend.
    Reconnecting,
    Streaming,
    Paused,
    Completing,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PauseState {
    pub is_paused: bool,
    pub paused_job_id: Option<JobId>,
    /// Input typed while paused, sent as a follow-up on resume.
    pub addendum: Vec<QueuedMessage>,
}

/// Backend answer to "is this job still running?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobActivity {
    Active,
    Finished { result: Option<String> },
    Failed { message: String },
    /// The backend does not know the job.
    Unknown,
    /// The backend could not be asked.
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusSeverity {
    #[default]
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusLine {
    pub text: String,
    pub severity: StatusSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptRole {
    User,
    Assistant,
    Notice,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub text: String,
}

/// User preferences; persisted best-effort by the platform layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    pub narration_enabled: bool,
    pub voice: VoiceEngineSelection,
    pub capture_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            narration_enabled: true,
            voice: VoiceEngineSelection::default(),
            capture_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub(crate) phase: Phase,
    pub(crate) project: Option<String>,
    pub(crate) model: Option<String>,
    pub(crate) current: Option<JobHandle>,
    pub(crate) sending: Option<QueuedMessage>,
    pub(crate) message_queue: VecDeque<QueuedMessage>,
    pub(crate) pause: PauseState,
    pub(crate) stream: StreamReconciler,
    pub(crate) questions: Vec<Question>,
    pub(crate) transcript: Vec<TranscriptEntry>,
    pub(crate) status: StatusLine,
    pub(crate) preferences: Preferences,
    pub(crate) capture: CaptureRetry,
    /// Narration fell back to the local engine for this session.
    pub(crate) voice_fell_back: bool,
    pub(crate) backgrounded: bool,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State bound to a backend project and model, sent along with every job.
    pub fn with_context(project: Option<String>, model: Option<String>) -> Self {
        Self {
            project,
            model,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_job(&self) -> Option<&JobHandle> {
        self.current.as_ref()
    }

    pub fn queued_messages(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.message_queue.iter()
    }

    pub fn pause_state(&self) -> &PauseState {
        &self.pause
    }

    pub fn stream(&self) -> &StreamReconciler {
        &self.stream
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            phase: self.phase,
            job: self.current.as_ref().map(|job| JobView {
                id: job.id.clone(),
                title: job.title.clone(),
                project: job.project.clone(),
            }),
            queued_messages: self.message_queue.len(),
            paused_addendum: self.pause.addendum.len(),
            user_message: self.stream.user_message().map(ToOwned::to_owned),
            live_box: self.stream.live_box().to_string(),
            progress: self.stream.progress_block().map(ToOwned::to_owned),
            activity: self.stream.status_label().to_string(),
            status: self.status.clone(),
            questions: self.questions.clone(),
            transcript: self.transcript.clone(),
            narration_enabled: self.preferences.narration_enabled,
            voice: self.active_voice(),
            capture: self.capture.state(),
            backgrounded: self.backgrounded,
            dirty: self.dirty,
        }
    }

    /// Voice actually in use; differs from the preference after a fallback.
    pub fn active_voice(&self) -> VoiceEngineSelection {
        let mut voice = self.preferences.voice.clone();
        if self.voice_fell_back {
            voice.engine = VoiceEngine::Local;
            voice.voice_id = None;
        }
        voice
    }

    /// Returns whether anything changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn is_current(&self, job_id: &str) -> bool {
        self.current.as_ref().is_some_and(|job| job.id == job_id)
    }

    pub(crate) fn set_status(&mut self, severity: StatusSeverity, text: impl Into<String>) {
        self.status = StatusLine {
            text: text.into(),
            severity,
        };
        self.mark_dirty();
    }

    pub(crate) fn push_transcript(&mut self, role: TranscriptRole, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        self.transcript.push(TranscriptEntry { role, text });
        self.mark_dirty();
    }
}

/// Short single-line title for a job, derived from the user's message.
pub fn job_title(message: &str) -> String {
    let first_line = message.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if first_line.chars().count() <= TITLE_MAX_CHARS {
        return first_line.to_string();
    }
    let mut title: String = first_line.chars().take(TITLE_MAX_CHARS - 1).collect();
    title.push('\u{2026}');
    title
}
