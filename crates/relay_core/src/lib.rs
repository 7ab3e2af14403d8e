//! Relay core: text cleaning, stream reconciliation, the speech queue and the
//! pure job lifecycle state machine. No I/O happens here.
mod chunk;
mod effect;
mod msg;
mod speech_queue;
mod state;
mod stream;
mod text_clean;
mod update;
mod view_model;
pub mod voice;

pub use chunk::extract_new_chunk;
pub use effect::{Effect, JobRequest};
pub use msg::Msg;
pub use speech_queue::{
    split_into_batches, EnqueueOutcome, QueueState, SegmentId, SpeechQueue, SpeechQueueConfig,
    SpeechSegment,
};
pub use state::{
    job_title, AppState, Attachment, JobActivity, JobHandle, JobId, PauseState, Phase,
    Preferences, Question, QueuedMessage, StatusLine, StatusSeverity, TranscriptEntry,
    TranscriptRole,
};
pub use stream::{ReconcileOutcome, StreamReconciler, StreamState};
pub use text_clean::{clean_for_display, clean_for_speech, is_noise, CODE_MARKER, MIN_TEXT_CHARS};
pub use update::{update, SETTLE_DELAY};
pub use view_model::{AppViewModel, JobView};
pub use voice::{
    CaptureDecision, CaptureErrorKind, CaptureRetry, CaptureRetryPolicy, CaptureState,
    FailoverDecision, TtsFailover, VoiceEngine, VoiceEngineSelection,
};
