//! Single-flight narration driver on top of [`SpeechQueue`].

use std::sync::{mpsc, Arc, Mutex, MutexGuard};

use engine_logging::{engine_debug, engine_warn};
use relay_core::voice::{FailoverDecision, TtsFailover, VoiceEngine, DEFAULT_FAILOVER_THRESHOLD};
use relay_core::{EnqueueOutcome, SegmentId, SpeechQueue, SpeechQueueConfig};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::tts::{SpeechBackend, SpeechError};
use crate::EngineEvent;

#[derive(Debug, Clone)]
pub struct NarratorSettings {
    pub queue: SpeechQueueConfig,
    /// Consecutive remote failures before switching to the local engine.
    pub failover_threshold: u32,
}

impl Default for NarratorSettings {
    fn default() -> Self {
        Self {
            queue: SpeechQueueConfig::default(),
            failover_threshold: DEFAULT_FAILOVER_THRESHOLD,
        }
    }
}

pub trait NarrationSink: Send + Sync {
    /// The remote engine `from` was abandoned for the local one.
    fn on_engine_fallback(&self, from: VoiceEngine);
}

pub struct ChannelNarrationSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelNarrationSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl NarrationSink for ChannelNarrationSink {
    fn on_engine_fallback(&self, from: VoiceEngine) {
        let _ = self.tx.send(EngineEvent::VoiceFellBack { from });
    }
}

struct Playback {
    id: SegmentId,
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct NarratorState {
    queue: SpeechQueue,
    selected: Arc<dyn SpeechBackend>,
    local: Arc<dyn SpeechBackend>,
    failover: TtsFailover,
    failover_threshold: u32,
    playback: Option<Playback>,
}

struct Shared {
    runtime: Handle,
    sink: Arc<dyn NarrationSink>,
    state: Mutex<NarratorState>,
}

/// Speaks queued segments one at a time. `enqueue` never blocks; a finished
/// or failed segment always advances the queue.
pub struct Narrator {
    shared: Arc<Shared>,
}

impl Narrator {
    pub fn new(
        runtime: Handle,
        settings: NarratorSettings,
        local: Arc<dyn SpeechBackend>,
        sink: Arc<dyn NarrationSink>,
    ) -> Self {
        let state = NarratorState {
            queue: SpeechQueue::new(settings.queue),
            selected: local.clone(),
            local,
            failover: TtsFailover::new(settings.failover_threshold),
            failover_threshold: settings.failover_threshold,
            playback: None,
        };
        Self {
            shared: Arc::new(Shared {
                runtime,
                sink,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn enqueue(&self, text: &str) -> EnqueueOutcome {
        let mut state = lock(&self.shared.state);
        let outcome = state.queue.enqueue(text);
        if let EnqueueOutcome::Queued { dropped, .. } = outcome {
            if dropped > 0 {
                engine_debug!("Narration backlog: skipped {} stale segment(s)", dropped);
            }
        }
        pump(&self.shared, &mut state);
        outcome
    }

    /// Stops the segment that is playing, clears the queue and returns to idle.
    /// Safe to call at any time.
    pub fn cancel_all(&self) {
        let mut state = lock(&self.shared.state);
        if let Some(playback) = state.playback.take() {
            engine_debug!("Cancelling narration segment {}", playback.id);
            playback.token.cancel();
            playback.task.abort();
        }
        state.queue.cancel_all();
    }

    /// Switches the backend for segments started from now on. An explicit
    /// switch also clears the failover history.
    pub fn set_backend(&self, backend: Arc<dyn SpeechBackend>) {
        let mut state = lock(&self.shared.state);
        engine_debug!("Narration engine set to {}", backend.engine().as_str());
        state.selected = backend;
        state.failover = TtsFailover::new(state.failover_threshold);
    }

    pub fn engine(&self) -> VoiceEngine {
        lock(&self.shared.state).selected.engine()
    }

    pub fn is_idle(&self) -> bool {
        let state = lock(&self.shared.state);
        state.playback.is_none() && state.queue.is_idle()
    }

    pub fn pending(&self) -> usize {
        lock(&self.shared.state).queue.len()
    }
}

impl Drop for Narrator {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn pump(shared: &Arc<Shared>, state: &mut NarratorState) {
    if state.playback.is_some() {
        return;
    }
    let Some(segment) = state.queue.begin_next() else {
        return;
    };

    let backend = state.selected.clone();
    let token = CancellationToken::new();
    let task_token = token.clone();
    let task_shared = shared.clone();
    let id = segment.id;
    let task = shared.runtime.spawn(async move {
        let result = backend.speak(&segment.text, &task_token).await;
        on_finished(&task_shared, segment.id, backend.engine(), result);
    });
    state.playback = Some(Playback { id, token, task });
}

fn on_finished(
    shared: &Arc<Shared>,
    id: SegmentId,
    engine: VoiceEngine,
    result: Result<(), SpeechError>,
) {
    let mut fell_back = None;
    {
        let mut state = lock(&shared.state);
        if !state.queue.finish(id) {
            // Cancelled or superseded while playing.
            return;
        }
        if state.playback.as_ref().is_some_and(|playback| playback.id == id) {
            state.playback = None;
        }

        match result {
            Ok(()) => {
                if engine.is_remote() {
                    state.failover.record_success();
                }
            }
            Err(SpeechError::Cancelled) => {}
            Err(err) => {
                engine_warn!("Narration segment {} failed on {}: {}", id, engine.as_str(), err);
                let still_selected = state.selected.engine() == engine;
                if engine.is_remote()
                    && still_selected
                    && state.failover.record_failure() == FailoverDecision::SwitchToLocal
                {
                    engine_warn!("{} keeps failing; narrating locally", engine.as_str());
                    state.selected = state.local.clone();
                    fell_back = Some(engine);
                }
            }
        }
        pump(shared, &mut state);
    }

    if let Some(from) = fell_back {
        shared.sink.on_engine_fallback(from);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
