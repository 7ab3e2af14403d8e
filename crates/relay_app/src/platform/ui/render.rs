use relay_core::voice::CaptureState;
use relay_core::{AppViewModel, Phase, Question, StatusSeverity, TranscriptEntry, TranscriptRole};

const LIVE_MAX_CHARS: usize = 110;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// A permanent line, printed above the live line.
    Line(String),
    /// Replace the single in-place live line.
    Live(String),
}

/// Turns successive view models into terminal output, emitting only what
/// changed since the previous render.
#[derive(Debug, Default)]
pub struct Renderer {
    transcript_seen: usize,
    header: String,
    voice: String,
    status: String,
    /// Progress text already printed as permanent lines.
    progress_printed: String,
    questions: Vec<Question>,
    live: String,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, view: &AppViewModel) -> Vec<Output> {
        let mut out = Vec::new();

        if view.transcript.len() < self.transcript_seen {
            self.transcript_seen = 0;
        }
        for entry in &view.transcript[self.transcript_seen..] {
            out.push(Output::Line(format_entry(entry)));
        }
        self.transcript_seen = view.transcript.len();

        let header = header_line(view);
        if header != self.header {
            out.push(Output::Line(header.clone()));
            self.header = header;
        }

        let voice = voice_line(view);
        if voice != self.voice {
            out.push(Output::Line(voice.clone()));
            self.voice = voice;
        }

        match &view.progress {
            None => self.progress_printed.clear(),
            Some(progress) if *progress != self.progress_printed => {
                // The block grows by appending; anything else starts over.
                let fresh = progress
                    .strip_prefix(self.progress_printed.as_str())
                    .unwrap_or(progress);
                let fresh = fresh.split_whitespace().collect::<Vec<_>>().join(" ");
                if !fresh.is_empty() {
                    out.push(Output::Line(format!("  \u{2022} {fresh}")));
                }
                self.progress_printed = progress.clone();
            }
            Some(_) => {}
        }

        if view.questions != self.questions {
            for (index, question) in view.questions.iter().enumerate() {
                out.push(Output::Line(format_question(index, question)));
            }
            if !view.questions.is_empty() {
                out.push(Output::Line("  reply with /answer A | B | ...".to_string()));
            }
            self.questions = view.questions.clone();
        }

        let status = status_line(view);
        if status != self.status {
            if !status.is_empty() {
                out.push(Output::Line(status.clone()));
            }
            self.status = status;
        }

        let live = live_line(view);
        if live != self.live || !out.is_empty() {
            out.push(Output::Live(live.clone()));
            self.live = live;
        }

        out
    }
}

fn format_entry(entry: &TranscriptEntry) -> String {
    let prefix = match entry.role {
        TranscriptRole::User => "you",
        TranscriptRole::Assistant => "relay",
        TranscriptRole::Notice => "note",
        TranscriptRole::Error => "error",
    };
    let mut lines = entry.text.lines();
    let first = lines.next().unwrap_or_default();
    let mut text = format!("{prefix}> {first}");
    for line in lines {
        text.push_str("\n      ");
        text.push_str(line);
    }
    text
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "Idle",
        Phase::Sending => "Sending",
        Phase::Reconnecting => "Reconnecting",
        Phase::Streaming => "Streaming",
        Phase::Paused => "Paused",
        Phase::Completing => "Completing",
    }
}

fn header_line(view: &AppViewModel) -> String {
    let mut header = format!("[{}]", phase_label(view.phase));
    if let Some(job) = &view.job {
        header.push_str(&format!(" {}", job.title));
        if let Some(project) = &job.project {
            header.push_str(&format!(" ({project})"));
        }
    }
    if view.queued_messages > 0 {
        header.push_str(&format!(" | queued: {}", view.queued_messages));
    }
    if view.paused_addendum > 0 {
        header.push_str(&format!(" | held for resume: {}", view.paused_addendum));
    }
    header
}

fn voice_line(view: &AppViewModel) -> String {
    let narration = if view.narration_enabled {
        match &view.voice.voice_id {
            Some(id) => format!("{} ({id})", view.voice.engine.as_str()),
            None => view.voice.engine.as_str().to_string(),
        }
    } else {
        "off".to_string()
    };
    let capture = match view.capture {
        CaptureState::Off => "off".to_string(),
        CaptureState::Listening => "listening".to_string(),
        CaptureState::Retrying { attempt } => format!("retrying ({attempt})"),
        CaptureState::Suspended => "suspended".to_string(),
        CaptureState::Blocked => "blocked".to_string(),
        CaptureState::GaveUp => "stopped".to_string(),
    };
    let mut line = format!("  narration: {narration} | mic: {capture}");
    if view.backgrounded {
        line.push_str(" | hidden");
    }
    line
}

fn format_question(index: usize, question: &Question) -> String {
    let mut line = format!("  Q{}: {}", index + 1, question.text);
    if !question.options.is_empty() {
        line.push_str(&format!(" [{}]", question.options.join(" / ")));
    }
    line
}

fn status_line(view: &AppViewModel) -> String {
    if view.status.text.is_empty() {
        return String::new();
    }
    match view.status.severity {
        StatusSeverity::Info => format!("  {}", view.status.text),
        StatusSeverity::Warning => format!("  ! {}", view.status.text),
        StatusSeverity::Error => format!("  !! {}", view.status.text),
    }
}

fn live_line(view: &AppViewModel) -> String {
    let live = view.live_box.split_whitespace().collect::<Vec<_>>().join(" ");
    let text = match (view.activity.is_empty(), live.is_empty()) {
        (true, true) => return String::new(),
        (false, true) => view.activity.clone(),
        (true, false) => live,
        (false, false) => format!("{} \u{00b7} {live}", view.activity),
    };
    tail_chars(&text, LIVE_MAX_CHARS)
}

/// Keeps the last `max` characters, marking the cut with an ellipsis.
fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let mut tail = String::from("\u{2026}");
    tail.extend(text.chars().skip(count - (max - 1)));
    tail
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use relay_core::{update, AppState, JobView, Msg, StatusLine};

    fn streaming_view() -> AppViewModel {
        AppViewModel {
            phase: Phase::Streaming,
            job: Some(JobView {
                id: "job-1".to_string(),
                title: "Explain the poller".to_string(),
                project: Some("relay".to_string()),
            }),
            transcript: vec![TranscriptEntry {
                role: TranscriptRole::User,
                text: "Explain the poller".to_string(),
            }],
            status: StatusLine {
                text: "Working\u{2026}".to_string(),
                severity: StatusSeverity::Info,
            },
            activity: "Reading files".to_string(),
            live_box: "It opens a stream".to_string(),
            narration_enabled: true,
            ..AppViewModel::default()
        }
    }

    #[test]
    fn first_render_prints_everything() {
        let mut renderer = Renderer::new();
        let out = renderer.render(&streaming_view());
        assert_eq!(
            out,
            vec![
                Output::Line("you> Explain the poller".to_string()),
                Output::Line("[Streaming] Explain the poller (relay)".to_string()),
                Output::Line("  narration: local | mic: off".to_string()),
                Output::Line("  Working\u{2026}".to_string()),
                Output::Live("Reading files \u{00b7} It opens a stream".to_string()),
            ]
        );
    }

    #[test]
    fn later_renders_only_emit_changes() {
        let mut renderer = Renderer::new();
        let mut view = streaming_view();
        renderer.render(&view);

        assert_eq!(renderer.render(&view), Vec::new());

        view.live_box = "It opens a stream and falls back".to_string();
        assert_eq!(
            renderer.render(&view),
            vec![Output::Live(
                "Reading files \u{00b7} It opens a stream and falls back".to_string()
            )]
        );

        view.transcript.push(TranscriptEntry {
            role: TranscriptRole::Assistant,
            text: "It streams.\nThen it polls.".to_string(),
        });
        view.phase = Phase::Completing;
        view.job = None;
        view.activity.clear();
        view.live_box.clear();
        assert_eq!(
            renderer.render(&view),
            vec![
                Output::Line("relay> It streams.\n      Then it polls.".to_string()),
                Output::Line("[Completing]".to_string()),
                Output::Live(String::new()),
            ]
        );
    }

    #[test]
    fn questions_are_listed_once() {
        let mut renderer = Renderer::new();
        let mut view = streaming_view();
        renderer.render(&view);

        view.questions = vec![Question {
            id: "q1".to_string(),
            text: "Which branch?".to_string(),
            options: vec!["main".to_string(), "dev".to_string()],
        }];
        let out = renderer.render(&view);
        assert!(out.contains(&Output::Line("  Q1: Which branch? [main / dev]".to_string())));
        assert_eq!(renderer.render(&view), Vec::new());
    }

    #[test]
    fn long_live_text_keeps_its_tail() {
        let text = "word ".repeat(40);
        let tail = tail_chars(text.trim_end(), 20);
        assert_eq!(tail.chars().count(), 20);
        assert!(tail.starts_with('\u{2026}'));
        assert!(tail.ends_with("word"));
    }

    #[test]
    fn growing_progress_prints_each_sentence_once() {
        let (state, _) = update(
            AppState::new(),
            Msg::Submit {
                message: "Tell me about the poller".to_string(),
                attachments: Vec::new(),
            },
        );
        let (mut state, _) = update(
            state,
            Msg::JobStarted {
                job_id: "job-1".to_string(),
            },
        );
        let mut renderer = Renderer::new();
        let mut lines = Vec::new();
        let mut text = String::new();
        for sentence in [
            "Alpha beta gamma.",
            " Delta epsilon zeta.",
            " Eta theta iota.",
            " Kappa lambda mu.",
        ] {
            text.push_str(sentence);
            let (next, _) = update(
                state,
                Msg::JobProcessing {
                    job_id: "job-1".to_string(),
                    activity: None,
                    stream: Some(text.clone()),
                },
            );
            state = next;
            for output in renderer.render(&state.view()) {
                if let Output::Line(line) = output {
                    lines.push(line);
                }
            }
        }

        for word in ["Alpha", "Delta", "Eta"] {
            let printed = lines.iter().filter(|line| line.contains(word)).count();
            assert_eq!(printed, 1, "{word} printed {printed} times in {lines:#?}");
        }
        assert!(lines.contains(&"  \u{2022} Eta theta iota.".to_string()));
        assert!(!lines.iter().any(|line| line.contains("Kappa")));
    }

    #[test]
    fn progress_starts_over_after_it_is_cleared() {
        let mut renderer = Renderer::new();
        let mut view = streaming_view();
        view.progress = Some("First job text.".to_string());
        renderer.render(&view);

        view.progress = None;
        renderer.render(&view);
        view.progress = Some("First job text.".to_string());
        let out = renderer.render(&view);
        assert!(out.contains(&Output::Line("  \u{2022} First job text.".to_string())));
    }
}
