//! Voice input through an external recognizer process.
//!
//! The recognizer prints one transcript per line on stdout. A line of the
//! form `error: <kind>` reports a recognition error instead. The process
//! exiting ends the capture session; restarts are decided by the core's
//! retry machine, never here.

use std::io;
use std::process::Stdio;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use relay_core::CaptureErrorKind;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::EngineEvent;

#[derive(Debug, Clone, Default)]
pub struct CaptureSettings {
    /// Recognizer command line; capture is unavailable when empty.
    pub command: Vec<String>,
}

pub trait CaptureSink: Send + Sync {
    fn on_started(&self);
    fn on_transcript(&self, text: String);
    fn on_error(&self, kind: CaptureErrorKind);
}

pub struct ChannelCaptureSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelCaptureSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl CaptureSink for ChannelCaptureSink {
    fn on_started(&self) {
        let _ = self.tx.send(EngineEvent::CaptureStarted);
    }

    fn on_transcript(&self, text: String) {
        let _ = self.tx.send(EngineEvent::CaptureTranscript(text));
    }

    fn on_error(&self, kind: CaptureErrorKind) {
        let _ = self.tx.send(EngineEvent::CaptureFailed(kind));
    }
}

struct Session {
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct VoiceCapture {
    settings: CaptureSettings,
    session: Mutex<Option<Session>>,
}

impl VoiceCapture {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            session: Mutex::new(None),
        }
    }

    /// Starts a capture session after `delay`, replacing any running one.
    pub fn start(&self, runtime: &Handle, delay: Duration, sink: Arc<dyn CaptureSink>) {
        let mut session = lock(&self.session);
        if let Some(previous) = session.take() {
            previous.token.cancel();
            previous.task.abort();
        }
        if self.settings.command.is_empty() {
            engine_warn!("Voice input requested but no recognizer command is configured");
            sink.on_error(CaptureErrorKind::AudioCapture);
            return;
        }

        let token = CancellationToken::new();
        let task = runtime.spawn(run_session(
            self.settings.command.clone(),
            delay,
            sink,
            token.clone(),
        ));
        *session = Some(Session { token, task });
    }

    /// Releases the capture resource. The recognizer process is killed.
    pub fn stop(&self) {
        if let Some(session) = lock(&self.session).take() {
            engine_debug!("Stopping voice capture");
            session.token.cancel();
            session.task.abort();
        }
    }
}

impl Drop for VoiceCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_session(
    command: Vec<String>,
    delay: Duration,
    sink: Arc<dyn CaptureSink>,
    token: CancellationToken,
) {
    if !delay.is_zero() {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tokio::select! {
        _ = token.cancelled() => {}
        outcome = capture_once(&command, sink.as_ref()) => {
            if token.is_cancelled() {
                return;
            }
            if let Err(kind) = outcome {
                sink.on_error(kind);
            }
        }
    }
}

/// Runs the recognizer until it exits. A clean exit counts as "no speech" so
/// the retry machine decides whether to listen again.
async fn capture_once(command: &[String], sink: &dyn CaptureSink) -> Result<(), CaptureErrorKind> {
    let Some((program, args)) = command.split_first() else {
        return Err(CaptureErrorKind::AudioCapture);
    };
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| map_spawn_error(&err))?;
    let stdout = child.stdout.take().ok_or(CaptureErrorKind::AudioCapture)?;

    engine_info!("Voice capture started ({})", program);
    sink.on_started();

    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                RecognizerLine::Transcript(text) => sink.on_transcript(text),
                RecognizerLine::Error(kind) => {
                    let _ = child.kill().await;
                    return Err(kind);
                }
                RecognizerLine::Blank => {}
            },
            Ok(None) => break,
            Err(err) => {
                engine_warn!("Reading recognizer output failed: {}", err);
                return Err(CaptureErrorKind::AudioCapture);
            }
        }
    }

    let status = child.wait().await.map_err(|_| CaptureErrorKind::AudioCapture)?;
    engine_debug!("Recognizer exited with {}", status);
    if status.success() {
        Err(CaptureErrorKind::NoSpeech)
    } else {
        Err(CaptureErrorKind::Other)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RecognizerLine {
    Transcript(String),
    Error(CaptureErrorKind),
    Blank,
}

fn parse_line(line: &str) -> RecognizerLine {
    let line = line.trim();
    if line.is_empty() {
        return RecognizerLine::Blank;
    }
    match line.strip_prefix("error:") {
        Some(kind) => RecognizerLine::Error(parse_error_kind(kind.trim())),
        None => RecognizerLine::Transcript(line.to_string()),
    }
}

fn parse_error_kind(kind: &str) -> CaptureErrorKind {
    match kind.to_ascii_lowercase().as_str() {
        "not-allowed" | "permission-denied" | "service-not-allowed" => {
            CaptureErrorKind::PermissionDenied
        }
        "no-speech" => CaptureErrorKind::NoSpeech,
        "audio-capture" => CaptureErrorKind::AudioCapture,
        "network" => CaptureErrorKind::Network,
        _ => CaptureErrorKind::Other,
    }
}

fn map_spawn_error(err: &io::Error) -> CaptureErrorKind {
    match err.kind() {
        io::ErrorKind::PermissionDenied => CaptureErrorKind::PermissionDenied,
        _ => CaptureErrorKind::AudioCapture,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
