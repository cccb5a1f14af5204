use crate::batch::DEFAULT_PACING;
use crate::gemini_api::{DEFAULT_API_BASE_URL, DEFAULT_MODEL};
use crate::storage::DEFAULT_QUOTA_BYTES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR_NAME: &str = "degenerate-meme";
pub const CONFIG_FILE: &str = "config.json";
pub const DATABASE_FILE: &str = "degenerate-meme.db";

const API_KEY_ENV: &str = "GEMINI_API_KEY";
const PACING_ENV: &str = "MEME_PACING_MS";
const API_BASE_URL_ENV: &str = "MEME_API_BASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub model: String,
    pub pacing_ms: u64,
    pub request_timeout_secs: Option<u64>,
    pub storage_quota_bytes: usize,
    pub sync_interval_ms: u64,
    /// Only ever read from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            pacing_ms: DEFAULT_PACING.as_millis() as u64,
            request_timeout_secs: None,
            storage_quota_bytes: DEFAULT_QUOTA_BYTES,
            sync_interval_ms: 1000,
            api_key: None,
        }
    }
}

impl AppConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(50))
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(key) = read(API_KEY_ENV) {
            self.api_key = Some(key);
        }
        if let Some(base_url) = read(API_BASE_URL_ENV) {
            self.api_base_url = base_url;
        }
        if let Some(raw) = read(PACING_ENV) {
            match raw.parse::<u64>() {
                Ok(pacing_ms) => self.pacing_ms = pacing_ms,
                Err(_) => log::warn!("Ignoring {}={:?}: not a number of milliseconds", PACING_ENV, raw),
            }
        }
        self
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn load_config(path: &Path) -> AppConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return AppConfig::default(),
    };

    serde_json::from_str::<AppConfig>(&content).unwrap_or_else(|error| {
        log::warn!(
            "Ignoring unreadable config {}: {}",
            path.display(),
            error
        );
        AppConfig::default()
    })
}

pub fn persist_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    let payload = serde_json::to_string_pretty(config)
        .map_err(|error| format!("Failed to serialize config: {}", error))?;

    std::fs::write(path, payload).map_err(|error| {
        format!(
            "Failed to save config to {}: {}",
            path.display(),
            error
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_or_corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        assert_eq!(load_config(&path), AppConfig::default());

        std::fs::write(&path, "not json").expect("write");
        assert_eq!(load_config(&path), AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{ "pacing_ms": 0, "request_timeout_secs": 90 }"#).expect("write");

        let config = load_config(&path);
        assert_eq!(config.pacing(), Duration::ZERO);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn persist_round_trips_and_never_writes_the_api_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let config = AppConfig {
            api_key: Some("secret".to_string()),
            model: "custom-model".to_string(),
            ..AppConfig::default()
        };

        persist_config(&path, &config).expect("persist");
        let written = std::fs::read_to_string(&path).expect("read");
        assert!(!written.contains("secret"));

        let loaded = load_config(&path);
        assert_eq!(loaded.model, "custom-model");
        assert_eq!(loaded.api_key, None);
    }

    #[test]
    fn overrides_apply_and_bad_pacing_is_ignored() {
        let env: HashMap<&str, &str> = [
            (API_KEY_ENV, " key-123 "),
            (API_BASE_URL_ENV, "http://localhost:9000/v1"),
            (PACING_ENV, "soon"),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::default()
            .with_overrides(|name| env.get(name).map(|value| value.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("key-123"));
        assert_eq!(config.api_base_url, "http://localhost:9000/v1");
        assert_eq!(config.pacing(), DEFAULT_PACING);

        let config = AppConfig::default().with_overrides(|name| {
            (name == PACING_ENV).then(|| "0".to_string())
        });
        assert_eq!(config.pacing(), Duration::ZERO);
    }

    #[test]
    fn zero_timeout_means_no_timeout() {
        let config = AppConfig {
            request_timeout_secs: Some(0),
            ..AppConfig::default()
        };
        assert_eq!(config.request_timeout(), None);
    }
}
