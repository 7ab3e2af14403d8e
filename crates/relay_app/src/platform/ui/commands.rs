//! Parsing of typed input lines. Plain text is a message; lines starting with
//! `/` are client commands.

use std::path::PathBuf;

use relay_core::voice::{VoiceEngine, VoiceEngineSelection};
use relay_core::Msg;

pub const HELP: &str = "\
Commands:
  /pause                  pause the running job
  /resume                 resume it, sending anything typed meanwhile
  /answer A | B | ...     answer the job's questions in order
  /attach <file>          attach a file to the next message
  /narrate on|off         toggle narration
  /voice <engine> [id]    local, edge-tts, piper or elevenlabs
  /listen on|off          toggle voice input
  /hide, /show            release or reacquire the microphone and refresh
  /help, /quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(Msg),
    Attach(PathBuf),
    Help,
    Quit,
    Invalid(String),
}

/// Returns `None` for blank lines.
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Send(Msg::Submit {
            message: line.to_string(),
            attachments: Vec::new(),
        }));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "pause" => Command::Send(Msg::PauseClicked),
        "resume" => Command::Send(Msg::ResumeClicked),
        "answer" => parse_answers(args),
        "attach" if !args.is_empty() => Command::Attach(PathBuf::from(args)),
        "attach" => Command::Invalid("usage: /attach <file>".to_string()),
        "narrate" => match parse_switch(args) {
            Some(on) => Command::Send(Msg::NarrationToggled(on)),
            None => Command::Invalid("usage: /narrate on|off".to_string()),
        },
        "listen" => match parse_switch(args) {
            Some(on) => Command::Send(Msg::CaptureToggled(on)),
            None => Command::Invalid("usage: /listen on|off".to_string()),
        },
        "voice" => parse_voice(args),
        "hide" => Command::Send(Msg::Backgrounded),
        "show" => Command::Send(Msg::Foregrounded),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command /{other}, try /help")),
    };
    Some(command)
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" => Some(true),
        "off" | "no" | "false" => Some(false),
        _ => None,
    }
}

fn parse_answers(args: &str) -> Command {
    let answers: Vec<String> = args
        .split('|')
        .map(str::trim)
        .filter(|answer| !answer.is_empty())
        .map(String::from)
        .collect();
    if answers.is_empty() {
        return Command::Invalid("usage: /answer A | B | ...".to_string());
    }
    Command::Send(Msg::AnswersSubmitted { answers })
}

fn parse_voice(args: &str) -> Command {
    let mut parts = args.split_whitespace();
    let Some(engine) = parts.next().and_then(VoiceEngine::parse) else {
        return Command::Invalid("usage: /voice local|edge-tts|piper|elevenlabs [voice id]".into());
    };
    let voice_id = parts.next().map(String::from);
    Command::Send(Msg::VoiceEngineSelected(VoiceEngineSelection {
        voice_id,
        ..VoiceEngineSelection::with_engine(engine)
    }))
}
