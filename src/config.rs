use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::chat::{self, GenerationConfig};
use crate::crop;
use crate::gallery;

pub const GALLERY_DIR_ENV: &str = "RETOUCH_GALLERY_DIR";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
/// Persisted UI/application settings for Retouch.
pub struct AppConfig {
    pub window_width: Option<f32>,
    pub window_height: Option<f32>,
    pub last_image: Option<PathBuf>,
    pub gallery_dir: Option<PathBuf>,
    pub jpeg_quality: Option<u8>,
    /// Downscale images whose longest edge exceeds this on load.
    pub load_max_edge: Option<u32>,
    pub crop_max_width: Option<u32>,
    pub crop_max_height: Option<u32>,
    /// External cropper, e.g. `mycrop {source} {destination} {aspect}`.
    pub crop_command: Option<String>,
    #[serde(default)]
    pub chat: ChatSettings,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

impl ChatSettings {
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(chat::DEFAULT_ENDPOINT)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(chat::DEFAULT_MODEL)
    }

    /// The environment variable wins over the config file.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone())
    }

    pub fn generation(&self) -> GenerationConfig {
        let defaults = GenerationConfig::default();
        GenerationConfig {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            top_k: self.top_k.unwrap_or(defaults.top_k),
        }
    }
}

impl AppConfig {
    /// Returns the user config file path, if a config directory is available.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("retouch").join("config.toml"))
    }

    /// Loads config from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Self {
        match toml::from_str(contents) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("ignoring malformed config: {}", err);
                Self::default()
            }
        }
    }

    /// Writes config to disk, ignoring filesystem/serialization errors.
    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(s) = toml::to_string_pretty(self) {
            let _ = std::fs::write(&path, s);
        }
    }

    /// Where saved images go: env override, then config, then ~/Pictures.
    pub fn gallery_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(GALLERY_DIR_ENV) {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        self.gallery_dir.clone().unwrap_or_else(|| {
            dirs::picture_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
            .unwrap_or(gallery::DEFAULT_JPEG_QUALITY)
            .clamp(1, 100)
    }

    pub fn crop_max_size(&self) -> (u32, u32) {
        (
            self.crop_max_width.unwrap_or(crop::DEFAULT_MAX_WIDTH).max(1),
            self.crop_max_height.unwrap_or(crop::DEFAULT_MAX_HEIGHT).max(1),
        )
    }

    /// Scratch space for crop hand-off files.
    pub fn crop_work_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("retouch")
            .join("crop")
    }
}
