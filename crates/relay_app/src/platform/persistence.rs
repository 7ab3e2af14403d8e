//! Best-effort persistence of the in-flight job and user preferences. A
//! missing or unreadable file only means nothing is restored.

use engine_logging::{engine_error, engine_info, engine_warn};
use relay_core::voice::{VoiceEngine, VoiceEngineSelection};
use relay_core::{JobHandle, Preferences};
use relay_engine::StateFiles;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const JOB_FILENAME: &str = "current_job.ron";
const PREFERENCES_FILENAME: &str = "preferences.ron";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedJob {
    id: String,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    pending_user_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct PersistedPreferences {
    narration_enabled: bool,
    voice_engine: String,
    voice_id: Option<String>,
    rate: f32,
    pitch: f32,
    capture_enabled: bool,
}

impl Default for PersistedPreferences {
    fn default() -> Self {
        Self::from(&Preferences::default())
    }
}

impl From<&Preferences> for PersistedPreferences {
    fn from(prefs: &Preferences) -> Self {
        Self {
            narration_enabled: prefs.narration_enabled,
            voice_engine: prefs.voice.engine.as_str().to_string(),
            voice_id: prefs.voice.voice_id.clone(),
            rate: prefs.voice.rate,
            pitch: prefs.voice.pitch,
            capture_enabled: prefs.capture_enabled,
        }
    }
}

impl From<PersistedPreferences> for Preferences {
    fn from(saved: PersistedPreferences) -> Self {
        let engine = VoiceEngine::parse(&saved.voice_engine).unwrap_or_else(|| {
            engine_warn!("Unknown saved voice engine '{}', using local", saved.voice_engine);
            VoiceEngine::Local
        });
        Self {
            narration_enabled: saved.narration_enabled,
            voice: VoiceEngineSelection {
                engine,
                voice_id: saved.voice_id,
                rate: sanitize_factor(saved.rate),
                pitch: sanitize_factor(saved.pitch),
            },
            capture_enabled: saved.capture_enabled,
        }
    }
}

fn sanitize_factor(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value.clamp(0.25, 4.0)
    } else {
        1.0
    }
}

pub(crate) fn load_job(files: &StateFiles) -> Option<JobHandle> {
    let saved: PersistedJob = load(files, JOB_FILENAME)?;
    if saved.id.trim().is_empty() {
        engine_warn!("Ignoring persisted job without an id");
        return None;
    }
    engine_info!("Restoring job {} from {:?}", saved.id, files.dir());
    Some(JobHandle {
        id: saved.id,
        project: saved.project,
        title: saved.title,
        pending_user_message: saved.pending_user_message,
    })
}

pub(crate) fn save_job(files: &StateFiles, job: &JobHandle) {
    let saved = PersistedJob {
        id: job.id.clone(),
        project: job.project.clone(),
        title: job.title.clone(),
        pending_user_message: job.pending_user_message.clone(),
    };
    save(files, JOB_FILENAME, &saved);
}

pub(crate) fn clear_job(files: &StateFiles) {
    if let Err(err) = files.remove(JOB_FILENAME) {
        engine_error!("Failed to clear persisted job in {:?}: {}", files.dir(), err);
    }
}

pub(crate) fn load_preferences(files: &StateFiles) -> Option<Preferences> {
    load::<PersistedPreferences>(files, PREFERENCES_FILENAME).map(Preferences::from)
}

pub(crate) fn save_preferences(files: &StateFiles, prefs: &Preferences) {
    save(files, PREFERENCES_FILENAME, &PersistedPreferences::from(prefs));
}

fn load<T: DeserializeOwned>(files: &StateFiles, filename: &str) -> Option<T> {
    let content = match files.read(filename) {
        Ok(Some(text)) => text,
        Ok(None) => return None,
        Err(err) => {
            engine_warn!("Failed to read {} from {:?}: {}", filename, files.dir(), err);
            return None;
        }
    };

    match ron::from_str(&content) {
        Ok(value) => Some(value),
        Err(err) => {
            engine_warn!("Failed to parse {} from {:?}: {}", filename, files.dir(), err);
            None
        }
    }
}

fn save<T: Serialize>(files: &StateFiles, filename: &str, value: &T) {
    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(value, pretty) {
        Ok(text) => text,
        Err(err) => {
            engine_error!("Failed to serialize {}: {}", filename, err);
            return;
        }
    };

    if let Err(err) = files.write(filename, &content) {
        engine_error!("Failed to write {} to {:?}: {}", filename, files.dir(), err);
    }
}
