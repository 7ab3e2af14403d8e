use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use relay_core::voice::VoiceEngine;
use relay_engine::{NarrationSink, Narrator, NarratorSettings, SpeechBackend, SpeechError};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Records every spoken segment and the peak number of concurrent playbacks.
struct FakeBackend {
    engine: VoiceEngine,
    delay: Duration,
    fail: bool,
    spoken: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    cancelled: AtomicUsize,
}

impl FakeBackend {
    fn new(engine: VoiceEngine, delay: Duration, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            engine,
            delay,
            fail,
            spoken: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        })
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SpeechBackend for FakeBackend {
    fn engine(&self) -> VoiceEngine {
        self.engine
    }

    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<(), SpeechError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.spoken.lock().unwrap().push(text.to_string());

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                Err(SpeechError::Cancelled)
            }
            _ = tokio::time::sleep(self.delay) => {
                if self.fail || text.contains("broken") {
                    Err(SpeechError::Synthesis("fake failure".to_string()))
                } else {
                    Ok(())
                }
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
struct RecordingSink {
    fallbacks: Mutex<Vec<VoiceEngine>>,
}

impl NarrationSink for RecordingSink {
    fn on_engine_fallback(&self, from: VoiceEngine) {
        self.fallbacks.lock().unwrap().push(from);
    }
}

async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

fn narrator(local: Arc<FakeBackend>, sink: Arc<RecordingSink>) -> Narrator {
    Narrator::new(Handle::current(), NarratorSettings::default(), local, sink)
}

#[tokio::test]
async fn segments_play_one_at_a_time_in_order() {
    engine_logging::initialize_for_tests();
    let local = FakeBackend::new(VoiceEngine::Local, Duration::from_millis(20), false);
    let narrator = narrator(local.clone(), Arc::new(RecordingSink::default()));

    narrator.enqueue("The first segment");
    narrator.enqueue("The second segment");
    narrator.enqueue("The third segment");

    wait_for(|| local.spoken().len() == 3 && narrator.is_idle()).await;
    assert_eq!(
        local.spoken(),
        vec!["The first segment", "The second segment", "The third segment"]
    );
    assert_eq!(local.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_failed_segment_does_not_stall_the_queue() {
    let local = FakeBackend::new(VoiceEngine::Local, Duration::from_millis(5), false);
    let narrator = narrator(local.clone(), Arc::new(RecordingSink::default()));

    narrator.enqueue("This one is broken");
    narrator.enqueue("This one plays fine");

    wait_for(|| local.spoken().len() == 2 && narrator.is_idle()).await;
    assert_eq!(local.spoken()[1], "This one plays fine");
}

#[tokio::test]
async fn repeated_remote_failures_switch_to_local() {
    let local = FakeBackend::new(VoiceEngine::Local, Duration::from_millis(5), false);
    let remote = FakeBackend::new(VoiceEngine::ElevenLabs, Duration::from_millis(5), true);
    let sink = Arc::new(RecordingSink::default());
    let narrator = narrator(local.clone(), sink.clone());
    narrator.set_backend(remote.clone());
    assert_eq!(narrator.engine(), VoiceEngine::ElevenLabs);

    for i in 0..4 {
        narrator.enqueue(&format!("Narration number {i}"));
    }

    wait_for(|| local.spoken().len() == 1 && narrator.is_idle()).await;
    assert_eq!(remote.spoken().len(), 3);
    assert_eq!(local.spoken(), vec!["Narration number 3"]);
    assert_eq!(narrator.engine(), VoiceEngine::Local);
    assert_eq!(*sink.fallbacks.lock().unwrap(), vec![VoiceEngine::ElevenLabs]);
}

#[tokio::test]
async fn cancel_all_stops_playback_and_clears_the_queue() {
    let local = FakeBackend::new(VoiceEngine::Local, Duration::from_secs(10), false);
    let narrator = narrator(local.clone(), Arc::new(RecordingSink::default()));

    narrator.enqueue("A very long narration");
    narrator.enqueue("Something that never plays");
    wait_for(|| local.spoken().len() == 1).await;

    narrator.cancel_all();
    assert!(narrator.is_idle());
    assert_eq!(narrator.pending(), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(local.spoken(), vec!["A very long narration"]);

    narrator.enqueue("Fresh narration after cancel");
    wait_for(|| local.spoken().len() == 2).await;
    narrator.cancel_all();
}

#[tokio::test]
async fn cancel_all_when_idle_is_harmless() {
    let local = FakeBackend::new(VoiceEngine::Local, Duration::from_millis(5), false);
    let narrator = narrator(local, Arc::new(RecordingSink::default()));
    narrator.cancel_all();
    narrator.cancel_all();
    assert!(narrator.is_idle());
}
