use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::errors::LuminaError;
use crate::media::{CaptureConstraints, PREVIEW_HEIGHT, PREVIEW_WIDTH};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub last_room: Option<String>,
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_true")]
    pub audio_enabled_on_join: bool,
    #[serde(default = "default_true")]
    pub video_enabled_on_join: bool,
    #[serde(default = "default_preview_width")]
    pub preview_width: u32,
    #[serde(default = "default_preview_height")]
    pub preview_height: u32,
}

fn default_true() -> bool {
    true
}

fn default_server_url() -> String {
    "ws://localhost:7880".to_string()
}

fn default_token_endpoint() -> String {
    "http://localhost:3000/api/token".to_string()
}

fn default_preview_width() -> u32 {
    PREVIEW_WIDTH
}

fn default_preview_height() -> u32 {
    PREVIEW_HEIGHT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_name: None,
            last_room: None,
            server_url: default_server_url(),
            token_endpoint: default_token_endpoint(),
            audio_enabled_on_join: true,
            video_enabled_on_join: true,
            preview_width: PREVIEW_WIDTH,
            preview_height: PREVIEW_HEIGHT,
        }
    }
}

impl Settings {
    pub fn preview_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            width: self.preview_width,
            height: self.preview_height,
        }
    }
}

/// Check that `server_url` is a WebSocket URL the session can dial.
pub fn validate_server_url(server_url: &str) -> Result<url::Url, LuminaError> {
    let parsed = url::Url::parse(server_url.trim())
        .map_err(|e| LuminaError::InvalidUrl(format!("'{server_url}': {e}")))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => Err(LuminaError::InvalidUrl(format!(
            "expected ws:// or wss://, got '{other}://'"
        ))),
    }
}

pub struct SettingsStore {
    settings: Mutex<Settings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let file_path = data_dir.as_ref().join("settings.json");
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    pub fn get(&self) -> Settings {
        self.lock().clone()
    }

    pub fn set_display_name(&self, name: Option<String>) {
        self.lock().display_name = name;
        self.save();
    }

    pub fn set_last_room(&self, room: Option<String>) {
        self.lock().last_room = room;
        self.save();
    }

    pub fn set_server_url(&self, server_url: &str) -> Result<(), LuminaError> {
        let parsed = validate_server_url(server_url)?;
        self.lock().server_url = parsed.as_str().trim_end_matches('/').to_string();
        self.save();
        Ok(())
    }

    pub fn set_token_endpoint(&self, endpoint: String) {
        self.lock().token_endpoint = endpoint;
        self.save();
    }

    pub fn set_join_media(&self, audio_enabled: bool, video_enabled: bool) {
        {
            let mut settings = self.lock();
            settings.audio_enabled_on_join = audio_enabled;
            settings.video_enabled_on_join = video_enabled;
        }
        self.save();
    }

    fn lock(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self) {
        let settings = self.get();
        if let Some(parent) = self.file_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("cannot create settings dir {}: {e}", parent.display());
                return;
            }
        }
        match serde_json::to_string_pretty(&settings) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.file_path, json) {
                    tracing::warn!("cannot write {}: {e}", self.file_path.display());
                }
            }
            Err(e) => tracing::warn!("cannot serialize settings: {e}"),
        }
    }

    fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable {}: {e}", path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }
}
