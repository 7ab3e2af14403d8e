use std::time::Duration;

use crate::state::job_title;
use crate::text_clean::clean_for_display;
use crate::voice::{CaptureDecision, CaptureErrorKind};
use crate::{
    AppState, Attachment, Effect, JobActivity, JobHandle, JobId, JobRequest, Msg, Phase,
    PauseState, QueuedMessage, Question, StatusSeverity, TranscriptRole,
};

/// Pause between a job finishing and the next queued message starting, so the
/// final render lands first.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

const FOLLOW_UP_LABEL: &str = "Additional input from the user while you were paused:";

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::Submit {
            message,
            attachments,
        } => submit(&mut state, message, attachments),
        Msg::JobStarted { job_id } => job_started(&mut state, job_id),
        Msg::JobStartFailed { message } => {
            if state.phase != Phase::Sending {
                return (state, Vec::new());
            }
            state.phase = Phase::Idle;
            state.sending = None;
            state.set_status(StatusSeverity::Error, "Couldn't send your message.");
            state.push_transcript(TranscriptRole::Error, short_error(&message));
            let mut effects = Vec::new();
            // A failed follow-up leaves the paused job behind; Idle owns no job.
            if state.current.take().is_some() {
                state.stream.hide_live_box();
                state.questions.clear();
                state.pause = PauseState::default();
                effects.push(Effect::ClearPersistedJob);
            }
            effects.extend(settle_if_queued(&state));
            effects
        }
        Msg::JobPending { job_id, activity } => {
            if !accepts_status(&state, &job_id) {
                return (state, Vec::new());
            }
            let label = activity.as_deref().unwrap_or("Waiting for the assistant");
            state.stream.set_status_label(label);
            state.mark_dirty();
            Vec::new()
        }
        Msg::JobProcessing {
            job_id,
            activity,
            stream,
        } => {
            if !accepts_status(&state, &job_id) {
                return (state, Vec::new());
            }
            if let Some(label) = activity.as_deref() {
                state.stream.set_status_label(label);
            }
            state.mark_dirty();
            match stream {
                Some(text) => reconcile(&mut state, &text),
                None => Vec::new(),
            }
        }
        Msg::JobWaitingForAnswers {
            job_id,
            questions,
            partial_response,
        } => waiting_for_answers(&mut state, &job_id, questions, partial_response),
        Msg::JobCompleted { job_id, result } => {
            if !accepts_status(&state, &job_id) {
                return (state, Vec::new());
            }
            complete(&mut state, Some(result))
        }
        Msg::JobFailed { job_id, message } => {
            if !accepts_status(&state, &job_id) {
                return (state, Vec::new());
            }
            fail(&mut state, &message)
        }
        Msg::AnswersSubmitted { answers } => {
            let Some(job_id) = state.current.as_ref().map(|job| job.id.clone()) else {
                return (state, Vec::new());
            };
            if state.phase != Phase::Streaming || state.questions.is_empty() {
                return (state, Vec::new());
            }
            state.questions.clear();
            state.push_transcript(TranscriptRole::User, answers.join("\n"));
            state.set_status(StatusSeverity::Info, "Answers sent.");
            vec![Effect::SubmitAnswers { job_id, answers }]
        }
        Msg::AnswersFailed { message } => {
            state.set_status(
                StatusSeverity::Error,
                format!("Couldn't send your answers: {}", short_error(&message)),
            );
            Vec::new()
        }
        Msg::PauseClicked => pause(&mut state),
        Msg::ResumeClicked => resume(&mut state),
        Msg::SettleElapsed => {
            if !matches!(state.phase, Phase::Completing | Phase::Idle) {
                return (state, Vec::new());
            }
            state.phase = Phase::Idle;
            state.mark_dirty();
            match state.message_queue.pop_front() {
                Some(next) => begin_sending(&mut state, next, None),
                None => Vec::new(),
            }
        }
        Msg::RestorePreferences(preferences) => {
            state.preferences = preferences;
            state.mark_dirty();
            let mut effects = vec![Effect::SetVoiceEngine(state.preferences.voice.clone())];
            if state.preferences.capture_enabled && state.capture.enable() {
                effects.push(Effect::StartCapture {
                    delay: Duration::ZERO,
                });
            }
            effects
        }
        Msg::RestoreJob(handle) => {
            if state.phase != Phase::Idle || state.current.is_some() {
                return (state, Vec::new());
            }
            let job_id = handle.id.clone();
            state.set_status(
                StatusSeverity::Info,
                format!("Reconnecting to \u{201c}{}\u{201d}\u{2026}", handle.title),
            );
            state.current = Some(handle);
            state.phase = Phase::Reconnecting;
            vec![Effect::CheckJobActive { job_id }]
        }
        Msg::JobActivityChecked { job_id, activity } => {
            if !state.is_current(&job_id) {
                return (state, Vec::new());
            }
            match state.phase {
                Phase::Reconnecting => reconnect(&mut state, job_id, activity),
                Phase::Streaming => resync(&mut state, job_id, activity),
                _ => Vec::new(),
            }
        }
        Msg::NarrationToggled(enabled) => {
            state.preferences.narration_enabled = enabled;
            state.mark_dirty();
            let mut effects = Vec::with_capacity(2);
            if !enabled {
                effects.push(Effect::CancelSpeech);
            }
            effects.push(Effect::PersistPreferences(state.preferences.clone()));
            effects
        }
        Msg::VoiceEngineSelected(selection) => {
            state.preferences.voice = selection.clone();
            state.voice_fell_back = false;
            state.set_status(
                StatusSeverity::Info,
                format!("Voice engine: {}", selection.engine.as_str()),
            );
            vec![
                Effect::SetVoiceEngine(selection),
                Effect::PersistPreferences(state.preferences.clone()),
            ]
        }
        Msg::VoiceEngineFellBack { from } => {
            // Session-only; the stored preference keeps the remote engine.
            state.voice_fell_back = true;
            state.set_status(
                StatusSeverity::Warning,
                format!(
                    "The {} voice kept failing, so narration switched to the local voice.",
                    from.as_str()
                ),
            );
            Vec::new()
        }
        Msg::CaptureToggled(enabled) => {
            state.preferences.capture_enabled = enabled;
            state.mark_dirty();
            let mut effects = Vec::with_capacity(2);
            if enabled {
                if state.capture.enable() {
                    effects.push(Effect::StartCapture {
                        delay: Duration::ZERO,
                    });
                }
            } else {
                state.capture.disable();
                effects.push(Effect::StopCapture);
            }
            effects.push(Effect::PersistPreferences(state.preferences.clone()));
            effects
        }
        Msg::CaptureStarted => {
            state.capture.on_started();
            state.mark_dirty();
            Vec::new()
        }
        Msg::CaptureTranscript(text) => {
            state.capture.on_transcript();
            submit(&mut state, text, Vec::new())
        }
        Msg::CaptureFailed(kind) => capture_failed(&mut state, kind),
        Msg::Backgrounded => {
            state.backgrounded = true;
            state.mark_dirty();
            if state.capture.suspend() {
                vec![Effect::StopCapture]
            } else {
                Vec::new()
            }
        }
        Msg::Foregrounded => {
            state.backgrounded = false;
            state.mark_dirty();
            let mut effects = Vec::new();
            if state.capture.resume() {
                effects.push(Effect::StartCapture {
                    delay: Duration::ZERO,
                });
            }
            // Cached stream state may be stale; ask the backend before showing more.
            if state.phase == Phase::Streaming {
                if let Some(job) = state.current.as_ref() {
                    effects.push(Effect::CheckJobActive {
                        job_id: job.id.clone(),
                    });
                }
            }
            effects
        }
    };

    (state, effects)
}

fn submit(state: &mut AppState, message: String, attachments: Vec<Attachment>) -> Vec<Effect> {
    let message = message.trim().to_string();
    if message.is_empty() && attachments.is_empty() {
        return Vec::new();
    }
    let queued = QueuedMessage {
        message,
        attachments,
    };

    match state.phase {
        Phase::Idle => begin_sending(state, queued, None),
        Phase::Paused => {
            state.pause.addendum.push(queued);
            state.set_status(StatusSeverity::Info, "Noted. It will be sent when you resume.");
            Vec::new()
        }
        Phase::Sending | Phase::Reconnecting | Phase::Streaming | Phase::Completing => {
            state.message_queue.push_back(queued);
            let waiting = state.message_queue.len();
            state.set_status(
                StatusSeverity::Info,
                format!("Queued ({waiting} waiting)."),
            );
            Vec::new()
        }
    }
}

fn begin_sending(
    state: &mut AppState,
    queued: QueuedMessage,
    follow_up_of: Option<JobId>,
) -> Vec<Effect> {
    state.phase = Phase::Sending;
    state.push_transcript(TranscriptRole::User, queued.message.clone());
    state.set_status(StatusSeverity::Info, "Sending\u{2026}");
    let request = JobRequest {
        message: queued.message.clone(),
        attachments: queued.attachments.clone(),
        project: state.project.clone(),
        model: state.model.clone(),
        follow_up_of,
    };
    state.sending = Some(queued);
    vec![Effect::CancelSpeech, Effect::StartJob { request }]
}

fn job_started(state: &mut AppState, job_id: JobId) -> Vec<Effect> {
    if state.phase != Phase::Sending {
        return Vec::new();
    }
    let sent = state.sending.take().unwrap_or_else(|| QueuedMessage {
        message: String::new(),
        attachments: Vec::new(),
    });
    let handle = JobHandle {
        id: job_id.clone(),
        project: state.project.clone(),
        title: job_title(&sent.message),
        pending_user_message: sent.message.clone(),
    };
    state.current = Some(handle.clone());
    state.phase = Phase::Streaming;
    state.pause = PauseState::default();
    state.questions.clear();
    state.stream.start(Some(sent.message));
    state.set_status(StatusSeverity::Info, "Working\u{2026}");
    vec![Effect::PersistJob(handle), Effect::StartPolling { job_id }]
}

/// Status events only count for the current job while its transport is live.
fn accepts_status(state: &AppState, job_id: &str) -> bool {
    state.phase == Phase::Streaming && state.is_current(job_id)
}

fn reconcile(state: &mut AppState, full_text: &str) -> Vec<Effect> {
    let narrate = state.preferences.narration_enabled;
    let outcome = state
        .stream
        .on_full_text_update(full_text, None, None, narrate);
    if outcome.live_box_changed || outcome.progress_changed {
        state.mark_dirty();
    }
    match outcome.speech {
        Some(text) => vec![Effect::Narrate { text }],
        None => Vec::new(),
    }
}

fn waiting_for_answers(
    state: &mut AppState,
    job_id: &str,
    questions: Vec<Question>,
    partial_response: Option<String>,
) -> Vec<Effect> {
    if !accepts_status(state, job_id) {
        return Vec::new();
    }
    let effects = match partial_response {
        Some(text) => reconcile(state, &text),
        None => Vec::new(),
    };
    // The transport repeats this event while the job waits; only announce once.
    if !questions.is_empty() && questions != state.questions {
        state.questions = questions;
        state.set_status(StatusSeverity::Info, "Waiting for your answers.");
    }
    effects
}

fn complete(state: &mut AppState, result: Option<String>) -> Vec<Effect> {
    let mut effects = Vec::new();
    let final_text = match result {
        Some(result) if !result.trim().is_empty() => {
            // Speak whatever the final result adds beyond the streamed text.
            if result.starts_with(state.stream.shown_text()) {
                effects.extend(reconcile(state, &result));
            }
            result
        }
        _ => state.stream.shown_text().to_string(),
    };
    state.push_transcript(TranscriptRole::Assistant, final_text);
    state.set_status(StatusSeverity::Info, "Done.");
    effects.extend(teardown(state));
    effects
}

fn fail(state: &mut AppState, message: &str) -> Vec<Effect> {
    state.push_transcript(TranscriptRole::Error, short_error(message));
    state.set_status(StatusSeverity::Error, "The request failed.");
    teardown(state)
}

fn teardown(state: &mut AppState) -> Vec<Effect> {
    state.stream.hide_live_box();
    state.current = None;
    state.questions.clear();
    state.pause = PauseState::default();
    state.phase = Phase::Completing;
    state.mark_dirty();
    vec![
        Effect::StopPolling,
        Effect::ClearPersistedJob,
        Effect::ScheduleSettle {
            delay: SETTLE_DELAY,
        },
    ]
}

fn settle_if_queued(state: &AppState) -> Vec<Effect> {
    if state.message_queue.is_empty() {
        Vec::new()
    } else {
        vec![Effect::ScheduleSettle {
            delay: SETTLE_DELAY,
        }]
    }
}

fn pause(state: &mut AppState) -> Vec<Effect> {
    if state.phase != Phase::Streaming {
        return Vec::new();
    }
    let Some(job_id) = state.current.as_ref().map(|job| job.id.clone()) else {
        return Vec::new();
    };
    state.phase = Phase::Paused;
    state.pause = PauseState {
        is_paused: true,
        paused_job_id: Some(job_id),
        addendum: Vec::new(),
    };
    state.set_status(StatusSeverity::Info, "Paused.");
    vec![Effect::StopPolling, Effect::CancelSpeech]
}

fn resume(state: &mut AppState) -> Vec<Effect> {
    if state.phase != Phase::Paused {
        return Vec::new();
    }
    let pause = std::mem::take(&mut state.pause);
    let Some(job_id) = pause.paused_job_id else {
        state.phase = Phase::Idle;
        state.mark_dirty();
        return Vec::new();
    };

    if pause.addendum.is_empty() {
        state.phase = Phase::Streaming;
        state.set_status(StatusSeverity::Info, "Resumed.");
        return vec![Effect::StartPolling { job_id }];
    }

    let typed: Vec<&str> = pause
        .addendum
        .iter()
        .map(|queued| queued.message.as_str())
        .filter(|message| !message.is_empty())
        .collect();
    let follow_up = QueuedMessage {
        message: format!("{FOLLOW_UP_LABEL}\n{}", typed.join("\n")),
        attachments: pause
            .addendum
            .iter()
            .flat_map(|queued| queued.attachments.iter().cloned())
            .collect(),
    };
    begin_sending(state, follow_up, Some(job_id))
}

fn reconnect(state: &mut AppState, job_id: JobId, activity: JobActivity) -> Vec<Effect> {
    match activity {
        JobActivity::Active | JobActivity::Unreachable => {
            let pending = state
                .current
                .as_ref()
                .map(|job| job.pending_user_message.clone());
            state.phase = Phase::Streaming;
            state.stream.start(pending);
            state.set_status(StatusSeverity::Info, "Reconnected.");
            vec![Effect::StartPolling { job_id }]
        }
        JobActivity::Finished { result } => {
            if let Some(result) = result {
                state.push_transcript(TranscriptRole::Assistant, result);
            }
            discard_restored(state, "Your last request finished while the client was closed.")
        }
        JobActivity::Failed { .. } | JobActivity::Unknown => {
            discard_restored(state, "Your last request is no longer running.")
        }
    }
}

fn discard_restored(state: &mut AppState, notice: &str) -> Vec<Effect> {
    state.current = None;
    state.phase = Phase::Idle;
    state.push_transcript(TranscriptRole::Notice, notice);
    state.set_status(StatusSeverity::Info, "Ready.");
    let mut effects = vec![Effect::ClearPersistedJob];
    effects.extend(settle_if_queued(state));
    effects
}

fn resync(state: &mut AppState, job_id: JobId, activity: JobActivity) -> Vec<Effect> {
    match activity {
        JobActivity::Active | JobActivity::Unreachable => vec![Effect::StartPolling { job_id }],
        JobActivity::Finished { result } => complete(state, result),
        JobActivity::Failed { message } => fail(state, &message),
        JobActivity::Unknown => fail(state, "The backend no longer knows this request."),
    }
}

fn capture_failed(state: &mut AppState, kind: CaptureErrorKind) -> Vec<Effect> {
    match state.capture.on_error(kind) {
        CaptureDecision::Restart { delay, .. } => {
            state.mark_dirty();
            vec![Effect::StartCapture { delay }]
        }
        CaptureDecision::Block => {
            state.set_status(
                StatusSeverity::Error,
                "Microphone access was denied. Turn voice input on again to retry.",
            );
            vec![Effect::StopCapture]
        }
        CaptureDecision::GiveUp => {
            state.set_status(
                StatusSeverity::Warning,
                "Voice input stopped after repeated errors.",
            );
            vec![Effect::StopCapture]
        }
        CaptureDecision::Ignore => Vec::new(),
    }
}

/// First line of an error, cleaned and bounded; never the raw payload.
fn short_error(message: &str) -> String {
    let first_line = message.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let cleaned = clean_for_display(first_line);
    let text = if cleaned.is_empty() {
        "Something went wrong.".to_string()
    } else {
        cleaned
    };
    if text.chars().count() > 160 {
        let mut short: String = text.chars().take(159).collect();
        short.push('\u{2026}');
        short
    } else {
        text
    }
}
