//! Speech synthesis backends. Each backend speaks one segment to completion
//! and stops promptly when its cancellation token fires.

use std::io::{self, Write};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use engine_logging::engine_debug;
use relay_core::voice::{VoiceEngine, VoiceEngineSelection};
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("synthesis failed: {0}")]
    Synthesis(String),
    #[error("playback failed: {0}")]
    Playback(String),
    #[error("cancelled")]
    Cancelled,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    /// Remote synthesis endpoint; remote engines fall back to local without it.
    pub tts_url: Option<String>,
    pub request_timeout: Duration,
    /// Local synthesizer, invoked as `program args... <text>`.
    pub local_command: Vec<String>,
    /// Audio player for remote payloads, invoked as `program args... <file>`.
    pub player_command: Vec<String>,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            tts_url: None,
            request_timeout: Duration::from_secs(30),
            local_command: vec!["espeak-ng".to_string()],
            player_command: ["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[async_trait::async_trait]
pub trait SpeechBackend: Send + Sync {
    fn engine(&self) -> VoiceEngine;

    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<(), SpeechError>;
}

#[async_trait::async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, audio: Bytes, cancel: &CancellationToken) -> Result<(), SpeechError>;
}

/// Plays an audio payload by handing a temp file to an external player.
#[derive(Debug, Clone)]
pub struct CommandAudioPlayer {
    command: Vec<String>,
}

impl CommandAudioPlayer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait::async_trait]
impl AudioPlayer for CommandAudioPlayer {
    async fn play(&self, audio: Bytes, cancel: &CancellationToken) -> Result<(), SpeechError> {
        let mut file = NamedTempFile::new()?;
        file.write_all(&audio)?;
        file.flush()?;

        let (program, args) = split_command(&self.command)
            .ok_or_else(|| SpeechError::Playback("no audio player configured".to_string()))?;
        let mut command = Command::new(program);
        command.args(args).arg(file.path());
        run_to_completion(command, cancel)
            .await
            .map_err(|err| match err {
                SpeechError::Io(io) => SpeechError::Playback(io.to_string()),
                other => other,
            })
    }
}

/// On-device synthesis through a local command such as `espeak-ng`.
#[derive(Debug, Clone)]
pub struct LocalSpeechBackend {
    command: Vec<String>,
    rate: f32,
}

impl LocalSpeechBackend {
    pub fn new(command: Vec<String>, rate: f32) -> Self {
        Self { command, rate }
    }
}

#[async_trait::async_trait]
impl SpeechBackend for LocalSpeechBackend {
    fn engine(&self) -> VoiceEngine {
        VoiceEngine::Local
    }

    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<(), SpeechError> {
        let (program, args) = split_command(&self.command)
            .ok_or_else(|| SpeechError::Synthesis("no local synthesizer configured".to_string()))?;
        let mut command = Command::new(program);
        command.args(args);
        if program.ends_with("espeak-ng") || program.ends_with("espeak") {
            // espeak's default is 175 words per minute.
            let words_per_minute = (175.0 * self.rate).round().clamp(80.0, 450.0) as u32;
            command.arg("-s").arg(words_per_minute.to_string());
        }
        command.arg(text);
        run_to_completion(command, cancel).await
    }
}

#[derive(Debug, Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    engine: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
    rate: f32,
    pitch: f32,
}

/// Remote engine behind an HTTP endpoint that returns an audio payload.
pub struct HttpSpeechBackend {
    client: reqwest::Client,
    url: String,
    selection: VoiceEngineSelection,
    player: Arc<dyn AudioPlayer>,
}

impl HttpSpeechBackend {
    pub fn new(
        url: impl Into<String>,
        selection: VoiceEngineSelection,
        timeout: Duration,
        player: Arc<dyn AudioPlayer>,
    ) -> Result<Self, SpeechError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SpeechError::Synthesis(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            selection,
            player,
        })
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes, SpeechError> {
        let body = SynthesisBody {
            text,
            engine: self.selection.engine.as_str(),
            voice: self.selection.voice_id.as_deref(),
            rate: self.selection.rate,
            pitch: self.selection.pitch,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|err| SpeechError::Synthesis(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::Synthesis(format!("http status {}", status.as_u16())));
        }
        let audio = response
            .bytes()
            .await
            .map_err(|err| SpeechError::Synthesis(err.to_string()))?;
        if audio.is_empty() {
            return Err(SpeechError::Synthesis("empty audio payload".to_string()));
        }
        Ok(audio)
    }
}

#[async_trait::async_trait]
impl SpeechBackend for HttpSpeechBackend {
    fn engine(&self) -> VoiceEngine {
        self.selection.engine
    }

    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<(), SpeechError> {
        let audio = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SpeechError::Cancelled),
            audio = self.synthesize(text) => audio?,
        };
        engine_debug!("Synthesized {} bytes with {}", audio.len(), self.selection.engine.as_str());
        self.player.play(audio, cancel).await
    }
}

/// Builds the backend for `selection`. Remote engines need a synthesis URL;
/// without one the local backend is used.
pub fn backend_for(
    selection: &VoiceEngineSelection,
    settings: &SpeechSettings,
) -> Result<Arc<dyn SpeechBackend>, SpeechError> {
    match (selection.engine.is_remote(), settings.tts_url.as_deref()) {
        (true, Some(url)) => {
            let player = Arc::new(CommandAudioPlayer::new(settings.player_command.clone()));
            let backend =
                HttpSpeechBackend::new(url, selection.clone(), settings.request_timeout, player)?;
            Ok(Arc::new(backend))
        }
        _ => Ok(Arc::new(LocalSpeechBackend::new(
            settings.local_command.clone(),
            selection.rate,
        ))),
    }
}

fn split_command(command: &[String]) -> Option<(&str, &[String])> {
    let (program, args) = command.split_first()?;
    Some((program.as_str(), args))
}

/// Runs `command` until it exits or `cancel` fires; the child is killed on cancel.
async fn run_to_completion(
    mut command: Command,
    cancel: &CancellationToken,
) -> Result<(), SpeechError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    let mut child = command.spawn()?;
    tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            Err(SpeechError::Cancelled)
        }
        status = child.wait() => {
            let status = status?;
            if status.success() {
                Ok(())
            } else {
                Err(SpeechError::Playback(format!("process exited with {status}")))
            }
        }
    }
}
