//! Cleaning of raw assistant text for the live box and for narration.
//!
//! Both cleaners are pure and deterministic. An empty result means
//! "do not display / do not speak this".

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Texts shorter than this many characters are never displayed or spoken.
pub const MIN_TEXT_CHARS: usize = 5;

/// Marker shown in place of a multi-line code block.
pub const CODE_MARKER: &str = "[code]";

const SHORT_INLINE_CODE_CHARS: usize = 30;

// Internal pause placeholder; rendered as "... " at the very end of speech cleaning.
const PAUSE: &str = "\u{2026}";

const ORDINALS: [&str; 10] = [
    "First", "Second", "Third", "Fourth", "Fifth", "Sixth", "Seventh", "Eighth", "Ninth", "Tenth",
];

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex")
}

static FENCED_CODE: Lazy<Regex> = Lazy::new(|| regex(r"(?s)```(.*?)```"));
static IMAGE: Lazy<Regex> = Lazy::new(|| regex(r"!\[[^\]]*\]\([^)]*\)"));
static LINK: Lazy<Regex> = Lazy::new(|| regex(r"\[([^\]]+)\]\([^)]*\)"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| regex(r"`([^`\n]+)`"));
static HORIZONTAL_RULE: Lazy<Regex> =
    Lazy::new(|| regex(r"(?m)^[ \t]*(?:-{3,}|\*{3,}|_{3,})[ \t]*$"));
static HEADING: Lazy<Regex> = Lazy::new(|| regex(r"(?m)^[ \t]*#{1,6}[ \t]+"));
static BLOCKQUOTE: Lazy<Regex> = Lazy::new(|| regex(r"(?m)^[ \t]*(?:>[ \t]?)+"));
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| regex(r"(?m)^[ \t]*(?:(?:[-*+\x{2022}]|\d+[.)])[ \t]+)+"));
static BULLET: Lazy<Regex> = Lazy::new(|| regex(r"(?m)^[ \t]*(?:[-*+\x{2022}][ \t]+)+"));
static NUMBERED_ITEM: Lazy<Regex> = Lazy::new(|| regex(r"(?m)^[ \t]*(\d+)[.)][ \t]+"));
static BOLD_STARS: Lazy<Regex> = Lazy::new(|| regex(r"\*\*([^*]+)\*\*"));
static BOLD_UNDERSCORES: Lazy<Regex> = Lazy::new(|| regex(r"__([^_]+)__"));
static ITALIC_STARS: Lazy<Regex> = Lazy::new(|| regex(r"\*([^*\n]+)\*"));
static STRIKETHROUGH: Lazy<Regex> = Lazy::new(|| regex(r"~~([^~]+)~~"));
static STRAY_STARS: Lazy<Regex> = Lazy::new(|| regex(r"\*{2,}"));
static ABSOLUTE_PATH: Lazy<Regex> =
    Lazy::new(|| regex(r#"(^|[\s("'])/(?:[\w.\-@]+/)+([\w.\-@]+)/?"#));
static TOOL_PHRASE: Lazy<Regex> =
    Lazy::new(|| regex(r"\bUsing (?:the )?`?([A-Za-z_]+)`? tool\b"));
static ELLIPSIS: Lazy<Regex> = Lazy::new(|| regex(r"\.{3,}"));
static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| regex(r"\s*\(([^()]+)\)"));
static COLON_OR_SEMICOLON: Lazy<Regex> = Lazy::new(|| regex(r"\s*[:;](?:\s+|$)"));
static SPACED_DASH: Lazy<Regex> = Lazy::new(|| regex(r"\s+(?:-{1,2}|\x{2013}|\x{2014})\s+"));
static EM_DASH: Lazy<Regex> = Lazy::new(|| regex(r"\x{2014}"));
static MARKDOWN_SYMBOLS: Lazy<Regex> = Lazy::new(|| regex(r"[*#|~>`]"));
static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| regex(r"\s+([,.!?\x{2026}])"));
static PAUSE_RUN: Lazy<Regex> =
    Lazy::new(|| regex(r"[,;]?\s*\x{2026}(?:[\s,.;]*\x{2026})*[,.]?"));
static STOP_BEFORE_PAUSE: Lazy<Regex> = Lazy::new(|| regex(r"([.!?])\s*\x{2026}"));
static COMMA_BEFORE_STOP: Lazy<Regex> = Lazy::new(|| regex(r",\s*([.!?])"));
static STOP_THEN_COMMA: Lazy<Regex> = Lazy::new(|| regex(r"([.!?]),+"));
static REPEATED_COMMA: Lazy<Regex> = Lazy::new(|| regex(r",(?:\s*,)+"));
static REPEATED_STOP: Lazy<Regex> = Lazy::new(|| regex(r"([.!?])[.!?]+"));
static LEADING_PUNCT: Lazy<Regex> = Lazy::new(|| regex(r"^[\s,.;]+"));
static TRAILING_PUNCT: Lazy<Regex> = Lazy::new(|| regex(r"[\s,;]+$"));

static BARE_FILENAME: Lazy<Regex> = Lazy::new(|| regex(r"^[\w.\-/]+\.[A-Za-z0-9]{1,6}$"));
static ACKNOWLEDGEMENT: Lazy<Regex> = Lazy::new(|| {
    regex(r"(?i)^(?:ok(?:ay)?|done|sure|yes|yep|no|thanks|got it|understood|alright|great)[.!]*$")
});
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    regex(r"(?i)^(?:\.{3}|\x{2026}|null|undefined|none|\[object object\]|\{\}|\[\]|\[code\])$")
});

/// Cleans raw assistant text for the live box / activity line.
pub fn clean_for_display(raw: &str) -> String {
    if is_too_short(raw) {
        return String::new();
    }

    let text = replace_code_fences(raw, |body| {
        if body.contains('\n') {
            format!(" {CODE_MARKER} ")
        } else {
            body.trim().to_string()
        }
    });
    let text = IMAGE.replace_all(&text, "");
    let text = LINK.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = HORIZONTAL_RULE.replace_all(&text, "");
    let text = HEADING.replace_all(&text, "");
    let text = BLOCKQUOTE.replace_all(&text, "");
    let text = LIST_MARKER.replace_all(&text, "");
    let text = strip_emphasis(&text);
    let text = shorten_paths(&text);
    let text = friendly_tool_phrases(&text);
    let text = capitalize_first(&collapse_whitespace(&text));

    if is_noise(&text) {
        String::new()
    } else {
        text
    }
}

/// Cleans raw assistant text into prose suitable for speech synthesis.
pub fn clean_for_speech(raw: &str) -> String {
    if is_too_short(raw) {
        return String::new();
    }

    let text = ELLIPSIS.replace_all(raw, PAUSE);
    let text = replace_code_fences(&text, |body| {
        if body.contains('\n') {
            format!("\n{PAUSE} Skipping code block{PAUSE}\n")
        } else {
            body.trim().to_string()
        }
    });
    let text = IMAGE.replace_all(&text, "");
    let text = LINK.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, |caps: &Captures| {
        let code = &caps[1];
        if code.chars().count() <= SHORT_INLINE_CODE_CHARS {
            code.to_string()
        } else {
            String::new()
        }
    });
    let text = HORIZONTAL_RULE.replace_all(&text, "");
    let text = HEADING.replace_all(&text, "");
    let text = BLOCKQUOTE.replace_all(&text, "");
    let text = NUMBERED_ITEM.replace_all(&text, |caps: &Captures| {
        let ordinal = caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| ORDINALS.get(idx))
            .copied()
            .unwrap_or("Next");
        format!("{ordinal}, ")
    });
    let text = BULLET.replace_all(&text, "");
    let text = strip_emphasis(&text);
    let text = shorten_paths(&text);
    let text = friendly_tool_phrases(&text);
    let text = join_spoken_lines(&text);

    let text = PARENTHETICAL.replace_all(&text, ", $1,");
    let text = COLON_OR_SEMICOLON.replace_all(&text, format!("{PAUSE} ").as_str());
    let text = SPACED_DASH.replace_all(&text, format!("{PAUSE} ").as_str());
    let text = EM_DASH.replace_all(&text, format!("{PAUSE} ").as_str());
    let text = MARKDOWN_SYMBOLS.replace_all(&text, "");
    let text = text.replace('_', " ");
    let text = collapse_whitespace(&text);

    let text = tidy_punctuation(&text);
    if !text.chars().any(char::is_alphanumeric) || is_noise(&text) {
        return String::new();
    }
    text
}

/// True when the text carries nothing worth showing or saying.
pub fn is_noise(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.chars().count() < MIN_TEXT_CHARS
        || BARE_FILENAME.is_match(trimmed)
        || ACKNOWLEDGEMENT.is_match(trimmed)
        || PLACEHOLDER.is_match(trimmed)
}

fn is_too_short(raw: &str) -> bool {
    raw.trim().chars().count() < MIN_TEXT_CHARS
}

/// Replaces closed fences through `render`; an unclosed fence swallows the rest
/// of the text (streamed chunks regularly stop inside a code block).
fn replace_code_fences(text: &str, render: impl Fn(&str) -> String) -> String {
    let replaced = FENCED_CODE.replace_all(text, |caps: &Captures| render(&caps[1]));
    match replaced.find("```") {
        Some(idx) => {
            let tail = &replaced[idx + 3..];
            let mut out = replaced[..idx].to_string();
            if !tail.trim().is_empty() {
                out.push_str(&render(&format!("{tail}\n")));
            }
            out
        }
        None => replaced.into_owned(),
    }
}

fn strip_emphasis(text: &str) -> String {
    let text = BOLD_STARS.replace_all(text, "$1");
    let text = BOLD_UNDERSCORES.replace_all(&text, "$1");
    let text = ITALIC_STARS.replace_all(&text, "$1");
    let text = STRIKETHROUGH.replace_all(&text, "$1");
    STRAY_STARS.replace_all(&text, "").into_owned()
}

fn shorten_paths(text: &str) -> String {
    ABSOLUTE_PATH.replace_all(text, "$1$2").into_owned()
}

fn friendly_tool_phrases(text: &str) -> String {
    TOOL_PHRASE
        .replace_all(text, |caps: &Captures| friendly_verb(&caps[1]).to_string())
        .into_owned()
}

fn friendly_verb(tool: &str) -> &'static str {
    match tool.to_ascii_lowercase().as_str() {
        "read" | "view" | "cat" => "Reading",
        "grep" | "glob" | "search" | "find" | "ls" => "Searching",
        "write" | "edit" | "multiedit" | "notebookedit" => "Editing",
        "bash" | "shell" | "terminal" => "Running a command",
        "webfetch" | "websearch" | "fetch" => "Looking things up",
        "task" | "agent" => "Delegating",
        "todowrite" => "Planning",
        _ => "Working",
    }
}

fn join_spoken_lines(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let mut out = String::with_capacity(text.len());
    for (idx, line) in lines.iter().enumerate() {
        out.push_str(line);
        if idx + 1 < lines.len() {
            let ends_clause = line
                .chars()
                .last()
                .is_some_and(|c| matches!(c, '.' | '!' | '?' | ',' | ':' | ';' | '\u{2026}'));
            if !ends_clause {
                out.push('.');
            }
            out.push(' ');
        }
    }
    out
}

fn tidy_punctuation(text: &str) -> String {
    let text = SPACE_BEFORE_PUNCT.replace_all(text, "$1");
    let text = STOP_BEFORE_PAUSE.replace_all(&text, "$1");
    let text = PAUSE_RUN.replace_all(&text, PAUSE);
    let text = COMMA_BEFORE_STOP.replace_all(&text, "$1");
    let text = STOP_THEN_COMMA.replace_all(&text, "$1");
    let text = REPEATED_COMMA.replace_all(&text, ",");
    let text = REPEATED_STOP.replace_all(&text, "$1");
    let text = LEADING_PUNCT.replace_all(&text, "");
    let text = TRAILING_PUNCT.replace_all(&text, "");
    let text = text.replace(PAUSE, "... ");
    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
