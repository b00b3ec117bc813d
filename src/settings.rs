//! User settings
//!
//! Appearance and session preferences, read at startup and written on every
//! change. Stored as JSON in the user config directory with atomic writes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::live::DEFAULT_MODEL;
use crate::memory::write_json_atomic;

const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Theme preset name.
    pub theme: String,

    /// Accent color as a hex string.
    pub accent_color: String,

    /// Font family name.
    pub font: String,

    /// Display name of the language all replies are forced into.
    pub language: String,

    /// Prebuilt voice used for NIA's speech.
    pub voice: String,

    /// Live model identifier.
    pub model: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: "dusk".to_string(),
            accent_color: "#b48ead".to_string(),
            font: "Inter".to_string(),
            language: "English".to_string(),
            voice: "Aoede".to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Default location under the user config directory.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nia").join(SETTINGS_FILE_NAME))
}

/// Load settings from `path`, falling back to defaults on any failure.
pub fn load_settings(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

/// Persist settings to `path` atomically.
pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), String> {
    write_json_atomic(path, settings)
}
