//! Job status transport: push stream first, pull polling as the fallback.
//!
//! At most one transport is live per poller. Starting a new one tears the
//! previous one down first, and after [`JobPoller::stop`] returns no sink
//! callback is delivered.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};

use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::StreamExt;
use relay_core::{JobId, Question};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::BackendClient;
use crate::sse::SseDecoder;
use crate::types::{JobStatus, JobStatusPayload};
use crate::{EngineEvent, FailureKind, JobUpdate};

/// Callback surface shared by both transports.
///
/// Callbacks for one transport never overlap. A callback may stop or restart
/// the poller that is delivering to it; nothing more reaches the sink once
/// that call returns.
pub trait JobStatusSink: Send + Sync {
    fn on_pending(&self, activity: Option<String>);
    fn on_processing(&self, activity: Option<String>, stream: Option<String>);
    fn on_waiting_for_answers(&self, questions: Vec<Question>, partial_response: Option<String>);
    fn on_complete(&self, result: String);
    fn on_error(&self, message: String);
}

/// Forwards status callbacks for one job as [`EngineEvent::Status`].
pub struct ChannelStatusSink {
    job_id: JobId,
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelStatusSink {
    pub fn new(job_id: JobId, tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { job_id, tx }
    }

    fn send(&self, update: JobUpdate) {
        let _ = self.tx.send(EngineEvent::Status {
            job_id: self.job_id.clone(),
            update,
        });
    }
}

impl JobStatusSink for ChannelStatusSink {
    fn on_pending(&self, activity: Option<String>) {
        self.send(JobUpdate::Pending { activity });
    }

    fn on_processing(&self, activity: Option<String>, stream: Option<String>) {
        self.send(JobUpdate::Processing { activity, stream });
    }

    fn on_waiting_for_answers(&self, questions: Vec<Question>, partial_response: Option<String>) {
        self.send(JobUpdate::WaitingForAnswers {
            questions,
            partial_response,
        });
    }

    fn on_complete(&self, result: String) {
        self.send(JobUpdate::Complete { result });
    }

    fn on_error(&self, message: String) {
        self.send(JobUpdate::Error { message });
    }
}

thread_local! {
    /// Address of the gate whose callback is running on this thread, or 0.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Serializes delivery against shutdown: once closed, nothing reaches the sink.
struct DeliveryGate {
    open: AtomicBool,
    delivery: Mutex<()>,
    sink: Arc<dyn JobStatusSink>,
}

impl DeliveryGate {
    fn new(sink: Arc<dyn JobStatusSink>) -> Self {
        Self {
            open: AtomicBool::new(true),
            delivery: Mutex::new(()),
            sink,
        }
    }

    fn id(&self) -> usize {
        self as *const Self as usize
    }

    /// Closes the gate and waits out a callback in flight on another thread.
    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        if DELIVERING.with(Cell::get) != self.id() {
            drop(lock(&self.delivery));
        }
    }

    fn with_sink(&self, deliver: impl FnOnce(&dyn JobStatusSink)) {
        let _delivery = lock(&self.delivery);
        if !self.open.load(Ordering::SeqCst) {
            return;
        }
        let _marker = DeliveringMarker::enter(self.id());
        deliver(self.sink.as_ref());
    }

    fn deliver(&self, payload: JobStatusPayload) {
        self.with_sink(|sink| match payload.status {
            JobStatus::Pending => sink.on_pending(payload.activity),
            JobStatus::Processing => sink.on_processing(payload.activity, payload.stream),
            JobStatus::WaitingForAnswers => sink.on_waiting_for_answers(
                payload.questions.into_iter().map(Question::from).collect(),
                payload.stream,
            ),
            JobStatus::Complete => {
                sink.on_complete(payload.result.or(payload.stream).unwrap_or_default())
            }
            JobStatus::Error => sink.on_error(payload.error_message()),
            JobStatus::Unknown => {}
        });
    }

    fn deliver_error(&self, message: &str) {
        self.with_sink(|sink| sink.on_error(message.to_string()));
    }
}

/// Marks this thread as delivering for one gate until dropped.
struct DeliveringMarker {
    previous: usize,
}

impl DeliveringMarker {
    fn enter(gate: usize) -> Self {
        Self {
            previous: DELIVERING.with(|current| current.replace(gate)),
        }
    }
}

impl Drop for DeliveringMarker {
    fn drop(&mut self) {
        DELIVERING.with(|current| current.set(self.previous));
    }
}

struct Transport {
    job_id: JobId,
    token: CancellationToken,
    gate: Arc<DeliveryGate>,
    task: JoinHandle<()>,
}

impl Transport {
    fn shutdown(self) {
        self.gate.close();
        self.token.cancel();
        self.task.abort();
    }
}

pub struct JobPoller {
    client: Arc<BackendClient>,
    active: Mutex<Option<Transport>>,
}

impl JobPoller {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self {
            client,
            active: Mutex::new(None),
        }
    }

    /// Starts watching `job_id`, replacing any transport that is still live.
    pub fn start(&self, runtime: &Handle, job_id: JobId, sink: Arc<dyn JobStatusSink>) {
        // Shut down outside the lock; a sink may call back into the poller.
        let previous = lock(&self.active).take();
        if let Some(previous) = previous {
            engine_debug!("Tearing down transport for {}", previous.job_id);
            previous.shutdown();
        }

        let token = CancellationToken::new();
        let gate = Arc::new(DeliveryGate::new(sink));
        let task = runtime.spawn(run_transport(
            self.client.clone(),
            job_id.clone(),
            gate.clone(),
            token.clone(),
        ));
        engine_info!("Watching job {}", job_id);
        let raced = lock(&self.active).replace(Transport {
            job_id,
            token,
            gate,
            task,
        });
        if let Some(raced) = raced {
            raced.shutdown();
        }
    }

    pub fn stop(&self) {
        let transport = lock(&self.active).take();
        if let Some(transport) = transport {
            engine_debug!("Stopping transport for {}", transport.job_id);
            transport.shutdown();
        }
    }

    /// Job whose transport is still running, if any.
    pub fn active_job(&self) -> Option<JobId> {
        lock(&self.active)
            .as_ref()
            .filter(|transport| !transport.task.is_finished())
            .map(|transport| transport.job_id.clone())
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

enum PushOutcome {
    /// A terminal status arrived; confirm it with a pull before reporting.
    Terminal,
    Failed(String),
}

async fn run_transport(
    client: Arc<BackendClient>,
    job_id: JobId,
    gate: Arc<DeliveryGate>,
    token: CancellationToken,
) {
    if client.settings().prefer_push {
        let outcome = tokio::select! {
            _ = token.cancelled() => return,
            outcome = run_push(&client, &job_id, &gate) => outcome,
        };
        match outcome {
            PushOutcome::Terminal => {
                engine_debug!("Push reported a terminal status for {}; confirming", job_id)
            }
            PushOutcome::Failed(reason) => {
                engine_warn!("Push transport for {} failed ({}); polling instead", job_id, reason)
            }
        }
    }

    tokio::select! {
        _ = token.cancelled() => {}
        _ = run_pull(&client, &job_id, &gate) => {}
    }
}

async fn run_push(client: &BackendClient, job_id: &str, gate: &DeliveryGate) -> PushOutcome {
    let response = match client.open_stream(job_id).await {
        Ok(response) => response,
        Err(err) => return PushOutcome::Failed(err.to_string()),
    };

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => return PushOutcome::Failed(err.to_string()),
        };
        for event in decoder.push(&chunk) {
            if let Some(outcome) = handle_push_event(job_id, &event.data, gate) {
                return outcome;
            }
        }
    }
    if let Some(event) = decoder.finish() {
        if let Some(outcome) = handle_push_event(job_id, &event.data, gate) {
            return outcome;
        }
    }
    PushOutcome::Failed("stream ended before the job finished".to_string())
}

fn handle_push_event(job_id: &str, data: &str, gate: &DeliveryGate) -> Option<PushOutcome> {
    let payload: JobStatusPayload = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(err) => {
            engine_debug!("Skipping malformed push event for {}: {}", job_id, err);
            return None;
        }
    };
    if payload.status.is_terminal() {
        return Some(PushOutcome::Terminal);
    }
    gate.deliver(payload);
    None
}

async fn run_pull(client: &BackendClient, job_id: &str, gate: &DeliveryGate) {
    let interval = client.settings().poll_interval;
    loop {
        match client.poll_status(job_id).await {
            Ok(payload) => {
                let terminal = payload.status.is_terminal();
                gate.deliver(payload);
                if terminal {
                    return;
                }
            }
            Err(err) if matches!(err.kind, FailureKind::HttpStatus(404 | 410)) => {
                engine_warn!("Backend no longer knows job {}", job_id);
                gate.deliver_error("The backend no longer knows this request.");
                return;
            }
            Err(err) => engine_debug!("Poll for {} failed, retrying: {}", job_id, err),
        }
        tokio::time::sleep(interval).await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
