mod platform;

use std::path::PathBuf;

use clap::Parser;
use relay_core::voice::VoiceEngine;
use relay_engine::{BackendSettings, CaptureSettings, EngineSettings, SpeechSettings};

/// Terminal client for a chat relay backend with streamed, narrated replies.
#[derive(Debug, Parser)]
#[command(name = "relay", version)]
pub struct Cli {
    /// Base URL of the relay backend.
    #[arg(long, env = "RELAY_API_URL", default_value = "http://127.0.0.1:8000")]
    pub api_url: String,

    /// Project the jobs run against.
    #[arg(long, env = "RELAY_PROJECT")]
    pub project: Option<String>,

    #[arg(long, env = "RELAY_MODEL")]
    pub model: Option<String>,

    /// Turn narration on or off, overriding the saved preference.
    #[arg(long, value_parser = parse_switch)]
    pub narrate: Option<bool>,

    /// Voice engine: local, edge-tts, piper or elevenlabs.
    #[arg(long, value_parser = parse_voice_engine)]
    pub voice_engine: Option<VoiceEngine>,

    #[arg(long)]
    pub voice_id: Option<String>,

    /// Synthesis endpoint used by the remote voice engines.
    #[arg(long, env = "RELAY_TTS_URL")]
    pub tts_url: Option<String>,

    /// Audio player command for remote synthesis, e.g. "mpv --really-quiet".
    #[arg(long)]
    pub player: Option<String>,

    /// Local synthesizer command, e.g. "espeak-ng -v en-us".
    #[arg(long)]
    pub local_tts: Option<String>,

    /// Speech recognizer command; each stdout line is sent as a message.
    #[arg(long, env = "RELAY_LISTEN_CMD")]
    pub listen_cmd: Option<String>,

    /// Where the current job and preferences are kept.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Poll for job status instead of opening the event stream.
    #[arg(long)]
    pub no_stream: bool,

    /// Mirror the log to the terminal as well as ./relay.log.
    #[arg(long)]
    pub log_terminal: bool,
}

impl Cli {
    pub fn engine_settings(&self) -> EngineSettings {
        let mut speech = SpeechSettings {
            tts_url: self.tts_url.clone(),
            ..SpeechSettings::default()
        };
        if let Some(player) = self.player.as_deref().map(split_command_line) {
            if !player.is_empty() {
                speech.player_command = player;
            }
        }
        if let Some(local) = self.local_tts.as_deref().map(split_command_line) {
            if !local.is_empty() {
                speech.local_command = local;
            }
        }

        EngineSettings {
            backend: BackendSettings {
                base_url: self.api_url.clone(),
                prefer_push: !self.no_stream,
                ..BackendSettings::default()
            },
            speech,
            capture: CaptureSettings {
                command: self
                    .listen_cmd
                    .as_deref()
                    .map(split_command_line)
                    .unwrap_or_default(),
            },
            ..EngineSettings::default()
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("relay")
        })
    }
}

fn split_command_line(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on or off, got '{other}'")),
    }
}

fn parse_voice_engine(value: &str) -> Result<VoiceEngine, String> {
    VoiceEngine::parse(value).ok_or_else(|| format!("unknown voice engine '{value}'"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    platform::run_app(cli)
}
