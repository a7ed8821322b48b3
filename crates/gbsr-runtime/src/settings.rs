//! Persisted user settings (`settings.toml`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::{DEFAULT_DEVICE_NAME, clamp_buffer_target};
use crate::input::BindingSet;

const FILE_NAME: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_audio_device")]
    pub audio_device_name: String,
    /// Output volume in percent, `[0, 100]`.
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default)]
    pub bindings: BindingSet,
    /// Preferred gamepad; empty means "first connected".
    #[serde(default)]
    pub joystick_name: String,
    /// Queued-audio level at which the driving loop stops emulating.
    #[serde(default = "default_buffer_target_ms")]
    pub buffer_target_ms: u64,
}

fn default_audio_device() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}
fn default_volume() -> u8 {
    1
}
fn default_buffer_target_ms() -> u64 {
    68
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            audio_device_name: default_audio_device(),
            volume: default_volume(),
            bindings: BindingSet::default(),
            joystick_name: String::new(),
            buffer_target_ms: default_buffer_target_ms(),
        }
    }
}

impl Settings {
    /// `settings.toml` in the platform config directory, or the working
    /// directory when none is available.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("io", "gbsr", "gbsr")
            .map(|dirs| dirs.config_dir().join(FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(FILE_NAME))
    }

    /// Reads settings from `path`. Missing or unparsable files yield defaults.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to read settings: {}", e);
                return Self::default();
            }
        };

        match toml::from_str::<Settings>(&text) {
            Ok(mut settings) => {
                settings.volume = settings.volume.min(100);
                settings
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring unparsable settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, content)
    }

    /// Backpressure target, clamped to what the output queues can hold.
    pub fn buffer_target(&self) -> Duration {
        clamp_buffer_target(Duration::from_millis(self.buffer_target_ms))
    }

    pub fn joystick(&self) -> Option<&str> {
        Some(self.joystick_name.as_str()).filter(|n| !n.is_empty())
    }
}
