use std::time::Duration;

use engine_logging::engine_debug;
use relay_core::{JobActivity, JobId, JobRequest};
use url::Url;

use crate::types::{
    AnswersBody, AttachmentBody, JobIdBody, JobStatusPayload, StartJobBody, StartJobResponse,
};
use crate::{ApiError, FailureKind};

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Interval of the pull transport.
    pub poll_interval: Duration,
    /// Try the push stream before falling back to pull.
    pub prefer_push: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(1500),
            prefer_push: true,
        }
    }
}

/// HTTP client for the relay backend's job endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    settings: BackendSettings,
    base: Url,
    client: reqwest::Client,
    /// The push stream stays open for the whole job, so it gets no total timeout.
    stream_client: reqwest::Client,
}

impl BackendClient {
    pub fn new(settings: BackendSettings) -> Result<Self, ApiError> {
        let mut base = Url::parse(&settings.base_url)
            .map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::new(FailureKind::Network, err.to_string()))?;
        let stream_client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| ApiError::new(FailureKind::Network, err.to_string()))?;

        Ok(Self {
            settings,
            base,
            client,
            stream_client,
        })
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))
    }

    /// `POST api/job/start`. A missing `job_id` counts as a rejection.
    pub async fn start_job(&self, request: &JobRequest) -> Result<JobId, ApiError> {
        let body = StartJobBody {
            message: &request.message,
            attachments: request
                .attachments
                .iter()
                .map(|attachment| AttachmentBody {
                    name: &attachment.name,
                    content: &attachment.content,
                })
                .collect(),
            project: request.project.as_deref(),
            model: request.model.as_deref(),
            follow_up_of: request.follow_up_of.as_deref(),
        };
        let response = self
            .client
            .post(self.endpoint("api/job/start")?)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response)?;
        let parsed: StartJobResponse = response
            .json()
            .await
            .map_err(|err| ApiError::new(FailureKind::Decode, err.to_string()))?;

        match parsed.job_id {
            Some(job_id) if !job_id.is_empty() => {
                engine_debug!("Backend accepted job {}", job_id);
                Ok(job_id)
            }
            _ => Err(ApiError::new(
                FailureKind::Rejected,
                parsed
                    .error
                    .unwrap_or_else(|| "the backend did not start a job".to_string()),
            )),
        }
    }

    /// `POST api/job/status`, the pull transport.
    pub async fn poll_status(&self, job_id: &str) -> Result<JobStatusPayload, ApiError> {
        let response = self
            .client
            .post(self.endpoint("api/job/status")?)
            .json(&JobIdBody { job_id })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response)?;
        response
            .json()
            .await
            .map_err(|err| ApiError::new(FailureKind::Decode, err.to_string()))
    }

    /// `GET api/job/stream/{job_id}`, the push transport. Returns the open
    /// response; the body is an SSE stream.
    pub async fn open_stream(&self, job_id: &str) -> Result<reqwest::Response, ApiError> {
        let mut url = self.endpoint("api/job/stream/")?;
        url.path_segments_mut()
            .map_err(|()| ApiError::new(FailureKind::InvalidUrl, "base url cannot be a base"))?
            .pop_if_empty()
            .push(job_id);
        let response = self
            .stream_client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(response)
    }

    /// `POST api/job/answers`.
    pub async fn submit_answers(&self, job_id: &str, answers: &[String]) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.endpoint("api/job/answers")?)
            .json(&AnswersBody { job_id, answers })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(response)?;
        Ok(())
    }

    /// Asks the backend whether `job_id` is still running. Never fails: an
    /// unknown job maps to `Unknown`, a transport failure to `Unreachable`.
    pub async fn check_activity(&self, job_id: &str) -> JobActivity {
        match self.poll_status(job_id).await {
            Ok(payload) => payload.activity(),
            Err(ApiError {
                kind: FailureKind::HttpStatus(404 | 410),
                ..
            }) => JobActivity::Unknown,
            Err(err) => {
                engine_debug!("Activity check for {} failed: {}", job_id, err);
                JobActivity::Unreachable
            }
        }
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::new(
            FailureKind::HttpStatus(status.as_u16()),
            status.to_string(),
        ))
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return ApiError::new(FailureKind::Decode, err.to_string());
    }
    ApiError::new(FailureKind::Network, err.to_string())
}
