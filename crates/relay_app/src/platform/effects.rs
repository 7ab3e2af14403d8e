use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use relay_core::{Effect, Msg};
use relay_engine::{EngineEvent, EngineHandle, JobUpdate, StateFiles};

use super::persistence;

pub struct EffectRunner {
    engine: EngineHandle,
    files: StateFiles,
}

impl EffectRunner {
    pub fn new(engine: EngineHandle, files: StateFiles, msg_tx: mpsc::Sender<Msg>) -> Self {
        let runner = Self { engine, files };
        runner.spawn_event_loop(msg_tx);
        runner
    }

    pub fn enqueue(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartJob { request } => {
                    engine_info!(
                        "StartJob message_len={} attachments={} follow_up_of={:?}",
                        request.message.len(),
                        request.attachments.len(),
                        request.follow_up_of
                    );
                    self.engine.start_job(request);
                }
                Effect::StartPolling { job_id } => self.engine.start_polling(job_id),
                Effect::StopPolling => self.engine.stop_polling(),
                Effect::CheckJobActive { job_id } => self.engine.check_job_active(job_id),
                Effect::SubmitAnswers { job_id, answers } => {
                    self.engine.submit_answers(job_id, answers)
                }
                Effect::Narrate { text } => {
                    engine_debug!("Narrate {} chars", text.len());
                    self.engine.narrate(&text);
                }
                Effect::CancelSpeech => self.engine.cancel_speech(),
                Effect::SetVoiceEngine(selection) => self.engine.set_voice(&selection),
                Effect::PersistJob(job) => persistence::save_job(&self.files, &job),
                Effect::ClearPersistedJob => persistence::clear_job(&self.files),
                Effect::PersistPreferences(prefs) => {
                    persistence::save_preferences(&self.files, &prefs)
                }
                Effect::ScheduleSettle { delay } => self.engine.schedule_settle(delay),
                Effect::StartCapture { delay } => self.engine.start_capture(delay),
                Effect::StopCapture => self.engine.stop_capture(),
            }
        }
    }

    /// Releases live resources. The persisted job is left in place so the
    /// next run can reconnect to it.
    pub fn shutdown(&self) {
        self.engine.stop_polling();
        self.engine.cancel_speech();
        self.engine.stop_capture();
    }

    fn spawn_event_loop(&self, msg_tx: mpsc::Sender<Msg>) {
        let engine = self.engine.clone();
        thread::spawn(move || loop {
            if let Some(event) = engine.try_recv() {
                if msg_tx.send(map_event(event)).is_err() {
                    break;
                }
            } else {
                thread::sleep(Duration::from_millis(20));
            }
        });
    }
}

fn map_event(event: EngineEvent) -> Msg {
    match event {
        EngineEvent::JobStarted { job_id } => Msg::JobStarted { job_id },
        EngineEvent::JobStartFailed { error } => Msg::JobStartFailed {
            message: error.user_message(),
        },
        EngineEvent::Status { job_id, update } => map_update(job_id, update),
        EngineEvent::ActivityChecked { job_id, activity } => {
            Msg::JobActivityChecked { job_id, activity }
        }
        EngineEvent::AnswersFailed { error } => Msg::AnswersFailed {
            message: error.user_message(),
        },
        EngineEvent::VoiceFellBack { from } => {
            engine_warn!("Voice engine {} fell back to local", from.as_str());
            Msg::VoiceEngineFellBack { from }
        }
        EngineEvent::SettleElapsed => Msg::SettleElapsed,
        EngineEvent::CaptureStarted => Msg::CaptureStarted,
        EngineEvent::CaptureTranscript(text) => Msg::CaptureTranscript(text),
        EngineEvent::CaptureFailed(kind) => Msg::CaptureFailed(kind),
    }
}

fn map_update(job_id: String, update: JobUpdate) -> Msg {
    match update {
        JobUpdate::Pending { activity } => Msg::JobPending { job_id, activity },
        JobUpdate::Processing { activity, stream } => Msg::JobProcessing {
            job_id,
            activity,
            stream,
        },
        JobUpdate::WaitingForAnswers {
            questions,
            partial_response,
        } => Msg::JobWaitingForAnswers {
            job_id,
            questions,
            partial_response,
        },
        JobUpdate::Complete { result } => Msg::JobCompleted { job_id, result },
        JobUpdate::Error { message } => Msg::JobFailed { job_id, message },
    }
}
