use std::fmt;

use relay_core::voice::{CaptureErrorKind, VoiceEngine};
use relay_core::{JobActivity, JobId, Question};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status reported by the backend for a job, identical for push and pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    #[serde(alias = "running")]
    Processing,
    WaitingForAnswers,
    #[serde(alias = "completed", alias = "done")]
    Complete,
    #[serde(alias = "failed")]
    Error,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionPayload {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "question")]
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl From<QuestionPayload> for Question {
    fn from(payload: QuestionPayload) -> Self {
        Question {
            id: payload.id,
            text: payload.text,
            options: payload.options,
        }
    }
}

/// Wire shape of a status event or poll response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobStatusPayload {
    pub status: JobStatus,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionPayload>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatusPayload {
    pub fn activity(&self) -> JobActivity {
        match self.status {
            JobStatus::Pending | JobStatus::Processing | JobStatus::WaitingForAnswers => {
                JobActivity::Active
            }
            JobStatus::Complete => JobActivity::Finished {
                result: self.result.clone().or_else(|| self.stream.clone()),
            },
            JobStatus::Error => JobActivity::Failed {
                message: self.error_message(),
            },
            JobStatus::Unknown => JobActivity::Unknown,
        }
    }

    pub(crate) fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "job failed".to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StartJobBody<'a> {
    pub message: &'a str,
    pub attachments: Vec<AttachmentBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_of: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AttachmentBody<'a> {
    pub name: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StartJobResponse {
    #[serde(default)]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JobIdBody<'a> {
    pub job_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AnswersBody<'a> {
    pub job_id: &'a str,
    pub answers: &'a [String],
}

/// Everything the engine reports back to the app loop.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    JobStarted {
        job_id: JobId,
    },
    JobStartFailed {
        error: ApiError,
    },
    Status {
        job_id: JobId,
        update: JobUpdate,
    },
    ActivityChecked {
        job_id: JobId,
        activity: JobActivity,
    },
    AnswersFailed {
        error: ApiError,
    },
    VoiceFellBack {
        from: VoiceEngine,
    },
    SettleElapsed,
    CaptureStarted,
    CaptureTranscript(String),
    CaptureFailed(CaptureErrorKind),
}

/// One status callback from the poller, regardless of transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    Pending {
        activity: Option<String>,
    },
    Processing {
        activity: Option<String>,
        stream: Option<String>,
    },
    WaitingForAnswers {
        questions: Vec<Question>,
        partial_response: Option<String>,
    },
    Complete {
        result: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: FailureKind,
    pub message: String,
}

impl ApiError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Short text that is safe to show to a user.
    pub fn user_message(&self) -> String {
        match &self.kind {
            FailureKind::Rejected => self.message.clone(),
            kind => kind.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    /// The backend answered but refused the request.
    Rejected,
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid backend url"),
            FailureKind::HttpStatus(code) => write!(f, "backend returned http status {code}"),
            FailureKind::Timeout => write!(f, "backend timed out"),
            FailureKind::Network => write!(f, "backend unreachable"),
            FailureKind::Rejected => write!(f, "request rejected"),
            FailureKind::Decode => write!(f, "unexpected backend response"),
        }
    }
}
