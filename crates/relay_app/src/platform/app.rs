use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use engine_logging::{engine_info, engine_warn};
use relay_core::{update, AppState, Attachment, Msg, Preferences};
use relay_engine::{EngineHandle, StateFiles};

use super::effects::EffectRunner;
use super::logging::{self, LogDestination};
use super::persistence;
use super::ui::commands::{self, Command, HELP};
use super::ui::render::{Output, Renderer};
use crate::Cli;

const LOOP_INTERVAL: Duration = Duration::from_millis(20);

pub fn run_app(cli: Cli) -> anyhow::Result<()> {
    logging::initialize(if cli.log_terminal {
        LogDestination::Both
    } else {
        LogDestination::File
    });

    let files = StateFiles::new(cli.state_dir());
    let engine = EngineHandle::new(cli.engine_settings()).context("starting the relay engine")?;
    engine_info!("Relay client talking to {}", cli.api_url);

    let (msg_tx, msg_rx) = mpsc::channel::<Msg>();
    let runner = EffectRunner::new(engine, files.clone(), msg_tx);
    let mut app = App::new(
        AppState::with_context(cli.project.clone(), cli.model.clone()),
        runner,
    );

    let saved = persistence::load_preferences(&files);
    app.dispatch(Msg::RestorePreferences(initial_preferences(&cli, saved)));
    if let Some(job) = persistence::load_job(&files) {
        app.dispatch(Msg::RestoreJob(job));
    }
    app.print(vec![Output::Line("Type a message, or /help.".to_string())]);

    let input_rx = spawn_input_thread();
    loop {
        while let Ok(msg) = msg_rx.try_recv() {
            app.dispatch(msg);
        }
        match input_rx.try_recv() {
            Ok(line) => {
                if !app.handle_line(&line) {
                    break;
                }
            }
            Err(TryRecvError::Empty) => thread::sleep(LOOP_INTERVAL),
            Err(TryRecvError::Disconnected) => break,
        }
    }

    app.runner.shutdown();
    app.print(vec![Output::Live(String::new())]);
    engine_info!("Relay client exiting");
    Ok(())
}

/// Saved preferences with command-line overrides applied.
fn initial_preferences(cli: &Cli, saved: Option<Preferences>) -> Preferences {
    let mut prefs = saved.unwrap_or_default();
    if let Some(narrate) = cli.narrate {
        prefs.narration_enabled = narrate;
    }
    if let Some(engine) = cli.voice_engine {
        if engine != prefs.voice.engine {
            prefs.voice.voice_id = None;
        }
        prefs.voice.engine = engine;
    }
    if let Some(voice_id) = &cli.voice_id {
        prefs.voice.voice_id = Some(voice_id.clone());
    }
    if cli.listen_cmd.is_none() {
        prefs.capture_enabled = false;
    }
    prefs
}

fn spawn_input_thread() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    engine_warn!("Reading input failed: {}", err);
                    break;
                }
            }
        }
    });
    rx
}

struct App {
    state: AppState,
    runner: EffectRunner,
    renderer: Renderer,
    staged: Vec<Attachment>,
}

impl App {
    fn new(state: AppState, runner: EffectRunner) -> Self {
        Self {
            state,
            runner,
            renderer: Renderer::new(),
            staged: Vec::new(),
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (mut state, effects) = update(state, msg);
        let was_dirty = state.consume_dirty();
        self.state = state;
        self.runner.enqueue(effects);

        if was_dirty {
            let view = self.state.view();
            let out = self.renderer.render(&view);
            self.print(out);
        }
    }

    /// Returns `false` when the user asked to quit.
    fn handle_line(&mut self, line: &str) -> bool {
        match commands::parse_line(line) {
            None => {}
            Some(Command::Send(Msg::Submit {
                message,
                mut attachments,
            })) => {
                attachments.append(&mut self.staged);
                self.dispatch(Msg::Submit {
                    message,
                    attachments,
                });
            }
            Some(Command::Send(msg)) => self.dispatch(msg),
            Some(Command::Attach(path)) => match read_attachment(&path) {
                Ok(attachment) => {
                    let notice = format!(
                        "  attached {} ({} chars) to your next message",
                        attachment.name,
                        attachment.content.chars().count()
                    );
                    self.staged.push(attachment);
                    self.print(vec![Output::Line(notice)]);
                }
                Err(err) => self.print(vec![Output::Line(format!("  !! {err:#}"))]),
            },
            Some(Command::Help) => self.print(vec![Output::Line(HELP.to_string())]),
            Some(Command::Invalid(usage)) => self.print(vec![Output::Line(format!("  {usage}"))]),
            Some(Command::Quit) => return false,
        }
        true
    }

    fn print(&self, out: Vec<Output>) {
        let mut stdout = io::stdout().lock();
        for item in out {
            let _ = match item {
                Output::Line(text) => writeln!(
                    stdout,
                    "\r\x1b[2K{} {}",
                    Local::now().format("%H:%M:%S"),
                    text
                ),
                Output::Live(text) => write!(stdout, "\r\x1b[2K{text}"),
            };
        }
        let _ = stdout.flush();
    }
}

fn read_attachment(path: &Path) -> anyhow::Result<Attachment> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Attachment { name, content })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use relay_core::voice::{VoiceEngine, VoiceEngineSelection};
    use tempfile::TempDir;

    #[test]
    fn command_line_overrides_saved_preferences() {
        let saved = Preferences {
            narration_enabled: true,
            voice: VoiceEngineSelection {
                voice_id: Some("en_GB-alan".to_string()),
                ..VoiceEngineSelection::with_engine(VoiceEngine::Piper)
            },
            capture_enabled: true,
        };
        let cli = Cli::try_parse_from([
            "relay",
            "--narrate",
            "off",
            "--voice-engine",
            "elevenlabs",
            "--listen-cmd",
            "whisper-stream",
        ])
        .unwrap();

        let prefs = initial_preferences(&cli, Some(saved));
        assert!(!prefs.narration_enabled);
        assert_eq!(prefs.voice.engine, VoiceEngine::ElevenLabs);
        assert_eq!(prefs.voice.voice_id, None);
        assert!(prefs.capture_enabled);
    }

    #[test]
    fn capture_stays_off_without_a_recognizer() {
        let saved = Preferences {
            capture_enabled: true,
            ..Preferences::default()
        };
        let cli = Cli::try_parse_from(["relay"]).unwrap();
        let prefs = initial_preferences(&cli, Some(saved));
        assert!(!prefs.capture_enabled);
        assert!(prefs.narration_enabled);
    }

    #[test]
    fn attachments_are_named_after_the_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.md");
        fs::write(&path, "# Notes\nship it").unwrap();

        let attachment = read_attachment(&path).unwrap();
        assert_eq!(attachment.name, "notes.md");
        assert_eq!(attachment.content, "# Notes\nship it");
        assert!(read_attachment(&temp.path().join("missing.md")).is_err());
    }
}
