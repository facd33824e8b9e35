use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ACCESS_TOKEN_ENV: &str = "TMDB_ACCESS_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlixConfig {
    pub api: ApiConfig,
    pub favorites: FavoritesConfig,
    pub trigger: TriggerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub request_timeout_seconds: u64,
    pub sort_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoritesConfig {
    pub storage_key: String,
    pub toggle_latency_ms: u64,
    pub min_comment_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub threshold_px: f64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org".to_owned(),
            access_token: None,
            request_timeout_seconds: 10,
            sort_by: "popularity.desc".to_owned(),
        }
    }
}

impl Default for FavoritesConfig {
    fn default() -> Self {
        Self {
            storage_key: "my-movies".to_owned(),
            toggle_latency_ms: 1500,
            min_comment_len: 5,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self { threshold_px: 100.0 }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl FavoritesConfig {
    pub fn toggle_latency(&self) -> Duration {
        Duration::from_millis(self.toggle_latency_ms)
    }
}

impl FlixConfig {
    /// Directory holding config.json and persisted stores.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("flix"))
    }

    pub fn config_file_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.json"))
    }

    /// Loads the user configuration, or falls back to defaults and tries to
    /// write them out so the file can be edited afterwards.
    pub fn load() -> Self {
        let Some(path) = Self::config_file_path() else {
            warn!("no config directory available, using defaults");
            return Self::default().with_env_overrides();
        };
        match Self::load_from_file(&path) {
            Ok(config) => config.with_env_overrides(),
            Err(err) => {
                warn!(error = %err, path = %path.display(), "failed to load config, using defaults");
                let config = Self::default();
                if let Err(save_err) = config.save_to(&path) {
                    warn!(error = %save_err, path = %path.display(), "failed to write default config");
                }
                config.with_env_overrides()
            }
        }
    }

    /// Loads an explicit file, falling back to defaults when it is unreadable.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path) {
            Ok(config) => config.with_env_overrides(),
            Err(err) => {
                warn!(error = %err, path = %path.display(), "failed to load config, using defaults");
                Self::default().with_env_overrides()
            }
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.api.access_token = Some(token);
            }
        }
        self
    }
}
