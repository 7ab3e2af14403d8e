//! Voice output selection, remote TTS failover and the voice-capture retry machine.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VoiceEngine {
    /// On-device synthesis; always available.
    #[default]
    Local,
    EdgeTts,
    Piper,
    ElevenLabs,
}

impl VoiceEngine {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "browser" | "system" => Some(Self::Local),
            "edge" | "edgetts" | "edge-tts" => Some(Self::EdgeTts),
            "piper" => Some(Self::Piper),
            "elevenlabs" | "eleven" => Some(Self::ElevenLabs),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::EdgeTts => "edge-tts",
            Self::Piper => "piper",
            Self::ElevenLabs => "elevenlabs",
        }
    }

    pub fn is_remote(self) -> bool {
        !matches!(self, Self::Local)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceEngineSelection {
    pub engine: VoiceEngine,
    pub voice_id: Option<String>,
    pub rate: f32,
    pub pitch: f32,
}

impl Default for VoiceEngineSelection {
    fn default() -> Self {
        Self {
            engine: VoiceEngine::Local,
            voice_id: None,
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

impl VoiceEngineSelection {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: VoiceEngine) -> Self {
        Self {
            engine,
            ..Self::default()
        }
    }
}

pub const DEFAULT_FAILOVER_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverDecision {
    Continue,
    SwitchToLocal,
}

/// Counts consecutive remote synthesis failures. Trips once and stays tripped
/// for the rest of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsFailover {
    threshold: u32,
    consecutive_failures: u32,
    tripped: bool,
}

impl Default for TtsFailover {
    fn default() -> Self {
        Self::new(DEFAULT_FAILOVER_THRESHOLD)
    }
}

impl TtsFailover {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
            tripped: false,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) -> FailoverDecision {
        if self.tripped {
            return FailoverDecision::Continue;
        }
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.threshold {
            self.tripped = true;
            FailoverDecision::SwitchToLocal
        } else {
            FailoverDecision::Continue
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureErrorKind {
    PermissionDenied,
    NoSpeech,
    AudioCapture,
    Network,
    Other,
}

impl CaptureErrorKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Off,
    Listening,
    Retrying {
        attempt: u32,
    },
    /// Released while the client is in the background; restarts on return.
    Suspended,
    /// Permission denied. Only an explicit enable leaves this state.
    Blocked,
    /// Retry budget exhausted. Only an explicit enable leaves this state.
    GaveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDecision {
    Restart { delay: Duration, attempt: u32 },
    Block,
    GiveUp,
    /// Capture is not wanted right now; the error needs no action.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for CaptureRetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            max_attempts: 3,
        }
    }
}

impl CaptureRetryPolicy {
    /// Delay before restart number `attempt` (1-based): base, 2x base, 4x base, ... capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptureRetry {
    policy: CaptureRetryPolicy,
    state: CaptureState,
    attempts: u32,
}

impl CaptureRetry {
    pub fn new(policy: CaptureRetryPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_wanted(&self) -> bool {
        matches!(
            self.state,
            CaptureState::Listening | CaptureState::Retrying { .. } | CaptureState::Suspended
        )
    }

    /// Explicit user request to listen. Clears a terminal state. Returns `true`
    /// when capture should be started.
    pub fn enable(&mut self) -> bool {
        if matches!(self.state, CaptureState::Listening | CaptureState::Retrying { .. }) {
            return false;
        }
        self.attempts = 0;
        self.state = CaptureState::Listening;
        true
    }

    pub fn disable(&mut self) {
        self.attempts = 0;
        self.state = CaptureState::Off;
    }

    pub fn on_started(&mut self) {
        if matches!(self.state, CaptureState::Retrying { .. }) {
            self.state = CaptureState::Listening;
        }
    }

    /// A recognised utterance proves the capture path works again.
    pub fn on_transcript(&mut self) {
        self.attempts = 0;
    }

    pub fn on_error(&mut self, kind: CaptureErrorKind) -> CaptureDecision {
        if !matches!(self.state, CaptureState::Listening | CaptureState::Retrying { .. }) {
            return CaptureDecision::Ignore;
        }
        if kind.is_terminal() {
            self.state = CaptureState::Blocked;
            return CaptureDecision::Block;
        }
        self.attempts += 1;
        if self.attempts > self.policy.max_attempts {
            self.state = CaptureState::GaveUp;
            return CaptureDecision::GiveUp;
        }
        self.state = CaptureState::Retrying {
            attempt: self.attempts,
        };
        CaptureDecision::Restart {
            delay: self.policy.delay_for(self.attempts),
            attempt: self.attempts,
        }
    }

    /// Returns `true` when a live capture resource must be released.
    pub fn suspend(&mut self) -> bool {
        if matches!(self.state, CaptureState::Listening | CaptureState::Retrying { .. }) {
            self.state = CaptureState::Suspended;
            true
        } else {
            false
        }
    }

    /// Returns `true` when capture should be started again.
    pub fn resume(&mut self) -> bool {
        if self.state == CaptureState::Suspended {
            self.state = CaptureState::Listening;
            true
        } else {
            false
        }
    }
}
