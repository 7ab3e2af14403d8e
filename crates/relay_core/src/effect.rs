use std::time::Duration;

use crate::voice::VoiceEngineSelection;
use crate::{Attachment, JobHandle, JobId, Preferences};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartJob { request: JobRequest },
    /// Start (or restart) the transport for `job_id`, tearing down any previous one.
    StartPolling { job_id: JobId },
    StopPolling,
    CheckJobActive { job_id: JobId },
    SubmitAnswers { job_id: JobId, answers: Vec<String> },
    Narrate { text: String },
    CancelSpeech,
    SetVoiceEngine(VoiceEngineSelection),
    PersistJob(JobHandle),
    ClearPersistedJob,
    PersistPreferences(Preferences),
    /// Deliver `Msg::SettleElapsed` after `delay`.
    ScheduleSettle { delay: Duration },
    StartCapture { delay: Duration },
    StopCapture,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub message: String,
    pub attachments: Vec<Attachment>,
    pub project: Option<String>,
    pub model: Option<String>,
    /// Set when the message continues a paused job.
    pub follow_up_of: Option<JobId>,
}
