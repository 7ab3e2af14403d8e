use crate::voice::{CaptureErrorKind, VoiceEngine, VoiceEngineSelection};
use crate::{Attachment, JobActivity, JobHandle, JobId, Preferences, Question};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User submitted a message, typed or dictated.
    Submit {
        message: String,
        attachments: Vec<Attachment>,
    },
    /// Backend accepted the start request.
    JobStarted { job_id: JobId },
    /// Backend rejected the start request.
    JobStartFailed { message: String },
    JobPending {
        job_id: JobId,
        activity: Option<String>,
    },
    JobProcessing {
        job_id: JobId,
        activity: Option<String>,
        stream: Option<String>,
    },
    JobWaitingForAnswers {
        job_id: JobId,
        questions: Vec<Question>,
        partial_response: Option<String>,
    },
    JobCompleted { job_id: JobId, result: String },
    JobFailed { job_id: JobId, message: String },
    /// User answered the questions of a waiting job.
    AnswersSubmitted { answers: Vec<String> },
    AnswersFailed { message: String },
    PauseClicked,
    ResumeClicked,
    /// The post-completion settle delay elapsed.
    SettleElapsed,
    /// Restore persisted preferences at start-up.
    RestorePreferences(Preferences),
    /// Restore the job that was in flight when the client last exited.
    RestoreJob(JobHandle),
    JobActivityChecked {
        job_id: JobId,
        activity: JobActivity,
    },
    NarrationToggled(bool),
    VoiceEngineSelected(VoiceEngineSelection),
    /// The narrator gave up on a remote engine for this session.
    VoiceEngineFellBack { from: VoiceEngine },
    CaptureToggled(bool),
    CaptureStarted,
    CaptureTranscript(String),
    CaptureFailed(CaptureErrorKind),
    /// Client went to the background.
    Backgrounded,
    /// Client came back to the foreground.
    Foregrounded,
}
