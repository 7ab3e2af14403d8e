use crate::voice::{CaptureState, VoiceEngineSelection};
use crate::{JobId, Phase, Question, StatusLine, TranscriptEntry};

/// Read-only snapshot handed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub phase: Phase,
    pub job: Option<JobView>,
    pub queued_messages: usize,
    pub paused_addendum: usize,
    pub user_message: Option<String>,
    pub live_box: String,
    pub progress: Option<String>,
    pub activity: String,
    pub status: StatusLine,
    pub questions: Vec<Question>,
    pub transcript: Vec<TranscriptEntry>,
    pub narration_enabled: bool,
    pub voice: VoiceEngineSelection,
    pub capture: CaptureState,
    pub backgrounded: bool,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobView {
    pub id: JobId,
    pub title: String,
    pub project: Option<String>,
}
