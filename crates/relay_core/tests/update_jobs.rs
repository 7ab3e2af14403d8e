use std::sync::Once;

use pretty_assertions::assert_eq;
use relay_core::{
    update, AppState, Effect, JobActivity, JobHandle, Msg, Phase, Question, StatusSeverity,
    TranscriptRole, SETTLE_DELAY,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn submit(state: AppState, message: &str) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::Submit {
            message: message.to_string(),
            attachments: Vec::new(),
        },
    )
}

fn streaming_job(job_id: &str) -> AppState {
    let (state, _) = submit(AppState::new(), "Explain the build");
    let (state, _) = update(
        state,
        Msg::JobStarted {
            job_id: job_id.to_string(),
        },
    );
    state
}

fn processing(job_id: &str, text: &str) -> Msg {
    Msg::JobProcessing {
        job_id: job_id.to_string(),
        activity: None,
        stream: Some(text.to_string()),
    }
}

fn started_request_message(effects: &[Effect]) -> Option<&str> {
    effects.iter().find_map(|effect| match effect {
        Effect::StartJob { request } => Some(request.message.as_str()),
        _ => None,
    })
}

#[test]
fn submit_from_idle_starts_a_job() {
    init_logging();
    let (state, effects) = submit(AppState::new(), "  Explain the build  ");

    assert_eq!(state.phase(), Phase::Sending);
    assert_eq!(effects.len(), 2);
    assert_eq!(effects[0], Effect::CancelSpeech);
    assert_eq!(started_request_message(&effects), Some("Explain the build"));

    let (state, effects) = update(
        state,
        Msg::JobStarted {
            job_id: "job-1".to_string(),
        },
    );
    let handle = state.current_job().cloned().expect("current job");
    assert_eq!(handle.id, "job-1");
    assert_eq!(handle.title, "Explain the build");
    assert_eq!(state.phase(), Phase::Streaming);
    assert_eq!(
        effects,
        vec![
            Effect::PersistJob(handle),
            Effect::StartPolling {
                job_id: "job-1".to_string()
            },
        ]
    );
}

#[test]
fn empty_submit_is_ignored() {
    init_logging();
    let (state, effects) = submit(AppState::new(), "   \n ");
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Idle);
}

#[test]
fn second_submit_queues_until_first_completes() {
    init_logging();
    let state = streaming_job("job-1");
    let (state, effects) = submit(state, "And the tests?");

    assert!(effects.is_empty());
    assert_eq!(state.current_job().map(|job| job.id.as_str()), Some("job-1"));
    assert_eq!(state.queued_messages().count(), 1);

    let (state, effects) = update(
        state,
        Msg::JobCompleted {
            job_id: "job-1".to_string(),
            result: "The build uses cargo workspaces.".to_string(),
        },
    );
    assert_eq!(state.phase(), Phase::Completing);
    assert!(state.current_job().is_none());
    assert_eq!(
        &effects[effects.len() - 3..],
        &[
            Effect::StopPolling,
            Effect::ClearPersistedJob,
            Effect::ScheduleSettle {
                delay: SETTLE_DELAY
            },
        ]
    );

    let (state, effects) = update(state, Msg::SettleElapsed);
    assert_eq!(state.phase(), Phase::Sending);
    assert_eq!(started_request_message(&effects), Some("And the tests?"));
    assert_eq!(state.queued_messages().count(), 0);
}

#[test]
fn completion_speaks_only_the_unspoken_remainder() {
    init_logging();
    let state = streaming_job("job-1");
    let (state, effects) = update(state, processing("job-1", "Hello there"));
    assert_eq!(
        effects,
        vec![Effect::Narrate {
            text: "Hello there".to_string()
        }]
    );

    let (state, effects) = update(
        state,
        Msg::JobCompleted {
            job_id: "job-1".to_string(),
            result: "Hello there, and goodbye".to_string(),
        },
    );
    assert_eq!(
        effects[0],
        Effect::Narrate {
            text: "and goodbye".to_string()
        }
    );
    let last = state.view().transcript.last().cloned().expect("transcript entry");
    assert_eq!(last.role, TranscriptRole::Assistant);
    assert_eq!(last.text, "Hello there, and goodbye");
}

#[test]
fn stream_updates_fill_live_box_and_progress() {
    init_logging();
    let state = streaming_job("job-1");
    let (state, _) = update(state, processing("job-1", "Reading the manifest"));
    let (mut state, _) = update(state, processing("job-1", "Reading the manifest\nFound two crates"));

    let view = state.view();
    assert_eq!(view.live_box, "Found two crates");
    assert_eq!(view.progress.as_deref(), Some("Reading the manifest"));
    assert_eq!(view.user_message.as_deref(), Some("Explain the build"));
    assert!(state.consume_dirty());
    assert!(!state.consume_dirty());
}

#[test]
fn events_for_other_jobs_are_ignored() {
    init_logging();
    let state = streaming_job("job-1");
    let (state, effects) = update(state, processing("job-0", "Stale text from an old job"));
    assert!(effects.is_empty());
    assert_eq!(state.view().live_box, "");

    let (state, effects) = update(
        state,
        Msg::JobCompleted {
            job_id: "job-0".to_string(),
            result: "old".to_string(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Streaming);
}

#[test]
fn pause_and_resume_keep_the_same_job() {
    init_logging();
    let state = streaming_job("job-1");
    let (state, effects) = update(state, Msg::PauseClicked);
    assert_eq!(effects, vec![Effect::StopPolling, Effect::CancelSpeech]);
    assert_eq!(state.phase(), Phase::Paused);
    assert_eq!(state.pause_state().paused_job_id.as_deref(), Some("job-1"));

    // Late transport events are dropped while paused.
    let (state, effects) = update(state, processing("job-1", "Late text after pause"));
    assert!(effects.is_empty());

    let (state, effects) = update(state, Msg::ResumeClicked);
    assert_eq!(
        effects,
        vec![Effect::StartPolling {
            job_id: "job-1".to_string()
        }]
    );
    assert_eq!(state.phase(), Phase::Streaming);
    assert!(!state.pause_state().is_paused);
}

#[test]
fn resume_with_addendum_sends_a_follow_up() {
    init_logging();
    let state = streaming_job("job-1");
    let (state, _) = update(state, Msg::PauseClicked);
    let (state, effects) = submit(state, "Also check the tests");
    assert!(effects.is_empty());
    assert_eq!(state.view().paused_addendum, 1);

    let (state, effects) = update(state, Msg::ResumeClicked);
    assert_eq!(state.phase(), Phase::Sending);
    let request = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::StartJob { request } => Some(request.clone()),
            _ => None,
        })
        .expect("follow-up request");
    assert_eq!(request.follow_up_of.as_deref(), Some("job-1"));
    assert!(request.message.contains("Also check the tests"));
}

#[test]
fn failed_follow_up_drops_the_paused_job() {
    init_logging();
    let state = streaming_job("job-1");
    let (state, _) = update(state, processing("job-1", "Hello there friend"));
    let (state, _) = update(state, Msg::PauseClicked);
    let (state, _) = submit(state, "Also check the tests");
    let (state, _) = update(state, Msg::ResumeClicked);
    assert_eq!(state.phase(), Phase::Sending);

    let (state, effects) = update(
        state,
        Msg::JobStartFailed {
            message: "backend unreachable".to_string(),
        },
    );
    assert_eq!(effects, vec![Effect::ClearPersistedJob]);
    assert_eq!(state.phase(), Phase::Idle);
    assert_eq!(state.current_job(), None);
    assert!(!state.stream().is_streaming());
    let view = state.view();
    assert_eq!(view.job, None);
    assert_eq!(view.live_box, "");

    // Nothing is left blocking a later restore.
    let (state, effects) = update(state, Msg::RestoreJob(restored_handle()));
    assert_eq!(state.phase(), Phase::Reconnecting);
    assert!(matches!(effects[..], [Effect::CheckJobActive { .. }]));
}

#[test]
fn pause_outside_streaming_is_ignored() {
    init_logging();
    let (state, effects) = update(AppState::new(), Msg::PauseClicked);
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Idle);
}

#[test]
fn start_failure_returns_to_idle_with_error() {
    init_logging();
    let (state, _) = submit(AppState::new(), "First request");
    let (state, effects) = update(
        state,
        Msg::JobStartFailed {
            message: "HTTP 500: {\"detail\":\"boom\"}".to_string(),
        },
    );

    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Idle);
    assert_eq!(state.view().status.severity, StatusSeverity::Error);
}

#[test]
fn start_failure_still_drains_the_queue() {
    init_logging();
    let (state, _) = submit(AppState::new(), "First request");
    let (state, _) = submit(state, "Second request");
    let (state, effects) = update(
        state,
        Msg::JobStartFailed {
            message: "unreachable".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::ScheduleSettle {
            delay: SETTLE_DELAY
        }]
    );

    let (_, effects) = update(state, Msg::SettleElapsed);
    assert_eq!(started_request_message(&effects), Some("Second request"));
}

#[test]
fn failure_tears_down_the_job() {
    init_logging();
    let state = streaming_job("job-1");
    let (state, effects) = update(
        state,
        Msg::JobFailed {
            job_id: "job-1".to_string(),
            message: "model overloaded".to_string(),
        },
    );
    assert_eq!(state.phase(), Phase::Completing);
    assert!(effects.contains(&Effect::StopPolling));
    assert!(effects.contains(&Effect::ClearPersistedJob));
    let last = state.view().transcript.last().cloned().expect("error entry");
    assert_eq!(last.role, TranscriptRole::Error);
}

fn restored_handle() -> JobHandle {
    JobHandle {
        id: "job-7".to_string(),
        project: Some("demo".to_string()),
        title: "Refactor the parser".to_string(),
        pending_user_message: "Refactor the parser".to_string(),
    }
}

#[test]
fn restored_active_job_resumes_polling() {
    init_logging();
    let (state, effects) = update(AppState::new(), Msg::RestoreJob(restored_handle()));
    assert_eq!(state.phase(), Phase::Reconnecting);
    assert_eq!(
        effects,
        vec![Effect::CheckJobActive {
            job_id: "job-7".to_string()
        }]
    );

    let (state, effects) = update(
        state,
        Msg::JobActivityChecked {
            job_id: "job-7".to_string(),
            activity: JobActivity::Active,
        },
    );
    assert_eq!(state.phase(), Phase::Streaming);
    assert_eq!(
        effects,
        vec![Effect::StartPolling {
            job_id: "job-7".to_string()
        }]
    );
}

#[test]
fn restored_finished_job_is_discarded() {
    init_logging();
    let (state, _) = update(AppState::new(), Msg::RestoreJob(restored_handle()));
    let (state, effects) = update(
        state,
        Msg::JobActivityChecked {
            job_id: "job-7".to_string(),
            activity: JobActivity::Finished {
                result: Some("The parser is refactored.".to_string()),
            },
        },
    );

    assert_eq!(effects, vec![Effect::ClearPersistedJob]);
    assert_eq!(state.phase(), Phase::Idle);
    assert!(state.current_job().is_none());
    assert!(state
        .view()
        .transcript
        .iter()
        .any(|entry| entry.role == TranscriptRole::Assistant));
}

#[test]
fn restored_unknown_job_is_discarded() {
    init_logging();
    let (state, _) = update(AppState::new(), Msg::RestoreJob(restored_handle()));
    let (state, effects) = update(
        state,
        Msg::JobActivityChecked {
            job_id: "job-7".to_string(),
            activity: JobActivity::Unknown,
        },
    );
    assert_eq!(effects, vec![Effect::ClearPersistedJob]);
    assert_eq!(state.phase(), Phase::Idle);
}

#[test]
fn foregrounding_rechecks_the_streaming_job() {
    init_logging();
    let state = streaming_job("job-1");
    let (state, effects) = update(state, Msg::Foregrounded);
    assert_eq!(
        effects,
        vec![Effect::CheckJobActive {
            job_id: "job-1".to_string()
        }]
    );

    let (state, effects) = update(
        state,
        Msg::JobActivityChecked {
            job_id: "job-1".to_string(),
            activity: JobActivity::Finished {
                result: Some("Finished while away.".to_string()),
            },
        },
    );
    assert_eq!(state.phase(), Phase::Completing);
    assert!(effects.contains(&Effect::StopPolling));
}

#[test]
fn narration_toggle_cancels_and_silences() {
    init_logging();
    let state = streaming_job("job-1");
    let (state, effects) = update(state, Msg::NarrationToggled(false));
    assert_eq!(effects[0], Effect::CancelSpeech);
    assert!(matches!(effects[1], Effect::PersistPreferences(ref prefs) if !prefs.narration_enabled));

    let (_, effects) = update(state, processing("job-1", "This should not be spoken"));
    assert!(effects.is_empty());
}

#[test]
fn questions_are_answered_once() {
    init_logging();
    let state = streaming_job("job-1");
    let question = Question {
        id: "q1".to_string(),
        text: "Which crate?".to_string(),
        options: vec!["core".to_string(), "engine".to_string()],
    };
    let (state, _) = update(
        state,
        Msg::JobWaitingForAnswers {
            job_id: "job-1".to_string(),
            questions: vec![question.clone()],
            partial_response: None,
        },
    );
    assert_eq!(state.view().questions, vec![question]);

    let answers = vec!["core".to_string()];
    let (state, effects) = update(
        state,
        Msg::AnswersSubmitted {
            answers: answers.clone(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::SubmitAnswers {
            job_id: "job-1".to_string(),
            answers: answers.clone(),
        }]
    );
    assert!(state.view().questions.is_empty());

    let (_, effects) = update(state, Msg::AnswersSubmitted { answers });
    assert!(effects.is_empty());
}
