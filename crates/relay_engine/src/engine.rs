use std::io;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use relay_core::voice::VoiceEngineSelection;
use relay_core::{JobId, JobRequest};
use thiserror::Error;
use tokio::runtime::Handle;

use crate::api::{BackendClient, BackendSettings};
use crate::capture::{CaptureSettings, ChannelCaptureSink, VoiceCapture};
use crate::narrator::{ChannelNarrationSink, Narrator, NarratorSettings};
use crate::poller::{ChannelStatusSink, JobPoller};
use crate::tts::{backend_for, LocalSpeechBackend, SpeechSettings};
use crate::{ApiError, EngineEvent};

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub backend: BackendSettings,
    pub speech: SpeechSettings,
    pub narrator: NarratorSettings,
    pub capture: CaptureSettings,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start the async runtime: {0}")]
    Runtime(#[from] io::Error),
    #[error(transparent)]
    Backend(#[from] ApiError),
}

enum EngineCommand {
    StartJob(JobRequest),
    CheckJobActive(JobId),
    SubmitAnswers { job_id: JobId, answers: Vec<String> },
    ScheduleSettle(Duration),
}

struct Inner {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_tx: mpsc::Sender<EngineEvent>,
    event_rx: Mutex<mpsc::Receiver<EngineEvent>>,
    runtime: Handle,
    speech: SpeechSettings,
    poller: JobPoller,
    narrator: Narrator,
    capture: VoiceCapture,
}

/// Owns the async runtime and every live IO resource. Request/response work
/// goes through a command channel; transport, narration and capture control
/// act synchronously so that stop and cancel take effect before returning.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Inner>,
}

impl EngineHandle {
    pub fn new(settings: EngineSettings) -> Result<Self, EngineError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let client = Arc::new(BackendClient::new(settings.backend)?);
        let runtime = tokio::runtime::Runtime::new()?;
        let handle = runtime.handle().clone();

        let local = Arc::new(LocalSpeechBackend::new(
            settings.speech.local_command.clone(),
            1.0,
        ));
        let narrator = Narrator::new(
            handle.clone(),
            settings.narrator,
            local,
            Arc::new(ChannelNarrationSink::new(event_tx.clone())),
        );

        let worker_client = client.clone();
        let worker_events = event_tx.clone();
        thread::spawn(move || {
            while let Ok(command) = cmd_rx.recv() {
                let client = worker_client.clone();
                let event_tx = worker_events.clone();
                runtime.spawn(async move {
                    handle_command(client.as_ref(), command, event_tx).await;
                });
            }
            engine_info!("Engine command loop finished");
        });

        Ok(Self {
            inner: Arc::new(Inner {
                cmd_tx,
                event_tx,
                event_rx: Mutex::new(event_rx),
                runtime: handle,
                speech: settings.speech,
                poller: JobPoller::new(client),
                narrator,
                capture: VoiceCapture::new(settings.capture),
            }),
        })
    }

    fn send(&self, command: EngineCommand) {
        let _ = self.inner.cmd_tx.send(command);
    }

    pub fn start_job(&self, request: JobRequest) {
        self.send(EngineCommand::StartJob(request));
    }

    pub fn check_job_active(&self, job_id: JobId) {
        self.send(EngineCommand::CheckJobActive(job_id));
    }

    pub fn submit_answers(&self, job_id: JobId, answers: Vec<String>) {
        self.send(EngineCommand::SubmitAnswers { job_id, answers });
    }

    /// Emits [`EngineEvent::SettleElapsed`] after `delay`.
    pub fn schedule_settle(&self, delay: Duration) {
        self.send(EngineCommand::ScheduleSettle(delay));
    }

    pub fn start_polling(&self, job_id: JobId) {
        let sink = Arc::new(ChannelStatusSink::new(
            job_id.clone(),
            self.inner.event_tx.clone(),
        ));
        self.inner.poller.start(&self.inner.runtime, job_id, sink);
    }

    pub fn stop_polling(&self) {
        self.inner.poller.stop();
    }

    pub fn narrate(&self, text: &str) {
        self.inner.narrator.enqueue(text);
    }

    pub fn cancel_speech(&self) {
        self.inner.narrator.cancel_all();
    }

    pub fn set_voice(&self, selection: &VoiceEngineSelection) {
        match backend_for(selection, &self.inner.speech) {
            Ok(backend) => self.inner.narrator.set_backend(backend),
            Err(err) => engine_warn!(
                "Keeping the current voice; {} is unavailable: {}",
                selection.engine.as_str(),
                err
            ),
        }
    }

    pub fn start_capture(&self, delay: Duration) {
        let sink = Arc::new(ChannelCaptureSink::new(self.inner.event_tx.clone()));
        self.inner.capture.start(&self.inner.runtime, delay, sink);
    }

    pub fn stop_capture(&self) {
        self.inner.capture.stop();
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.inner.event_rx.lock().ok()?.try_recv().ok()
    }
}

async fn handle_command(
    client: &BackendClient,
    command: EngineCommand,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let event = match command {
        EngineCommand::StartJob(request) => match client.start_job(&request).await {
            Ok(job_id) => EngineEvent::JobStarted { job_id },
            Err(error) => {
                engine_warn!("Starting a job failed: {}", error);
                EngineEvent::JobStartFailed { error }
            }
        },
        EngineCommand::CheckJobActive(job_id) => {
            let activity = client.check_activity(&job_id).await;
            EngineEvent::ActivityChecked { job_id, activity }
        }
        EngineCommand::SubmitAnswers { job_id, answers } => {
            match client.submit_answers(&job_id, &answers).await {
                Ok(()) => return,
                Err(error) => {
                    engine_warn!("Submitting answers for {} failed: {}", job_id, error);
                    EngineEvent::AnswersFailed { error }
                }
            }
        }
        EngineCommand::ScheduleSettle(delay) => {
            tokio::time::sleep(delay).await;
            EngineEvent::SettleElapsed
        }
    };
    let _ = event_tx.send(event);
}
