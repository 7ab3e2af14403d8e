//! Relay engine: backend transport, narration, voice capture and state files.
mod api;
mod capture;
mod engine;
mod narrator;
mod persist;
mod poller;
mod sse;
mod tts;
mod types;

pub use api::{BackendClient, BackendSettings};
pub use capture::{CaptureSettings, CaptureSink, ChannelCaptureSink, VoiceCapture};
pub use engine::{EngineError, EngineHandle, EngineSettings};
pub use narrator::{ChannelNarrationSink, NarrationSink, Narrator, NarratorSettings};
pub use persist::{ensure_state_dir, PersistError, StateFiles};
pub use poller::{ChannelStatusSink, JobPoller, JobStatusSink};
pub use sse::{SseDecoder, SseEvent};
pub use tts::{
    backend_for, AudioPlayer, CommandAudioPlayer, HttpSpeechBackend, LocalSpeechBackend,
    SpeechBackend, SpeechError, SpeechSettings,
};
pub use types::{
    ApiError, EngineEvent, FailureKind, JobStatus, JobStatusPayload, JobUpdate, QuestionPayload,
};
