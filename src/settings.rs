use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::payload::PayloadPrefixes;

pub const ENV_API_URL: &str = "TB_SCANNER_API_URL";
pub const ENV_FRAMES_DIR: &str = "TB_SCANNER_FRAMES_DIR";
pub const ENV_DEBUG: &str = "TB_SCANNER_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ScannerSettings {
    pub api_base_url: String,
    pub attendance_path: String,
    pub request_timeout_secs: u64,
    pub feedback_volume: f32,
    pub success_clip: Option<PathBuf>,
    pub failure_clip: Option<PathBuf>,
    pub frames_dir: PathBuf,
    pub poll_interval_ms: u64,
    pub max_restart_attempts: u32,
    pub toast_millis: u64,
    pub persist_entries: bool,
    pub payload_prefixes: PayloadPrefixes,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".into(),
            attendance_path: "/attendance/mark".into(),
            request_timeout_secs: 12,
            feedback_volume: 0.5,
            success_clip: None,
            failure_clip: None,
            frames_dir: PathBuf::from("frames"),
            poll_interval_ms: 150,
            max_restart_attempts: 3,
            toast_millis: 3000,
            persist_entries: true,
            payload_prefixes: PayloadPrefixes::default(),
        }
    }
}

impl ScannerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.clamp(1, 60))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.clamp(20, 2000))
    }

    pub fn volume(&self) -> f32 {
        self.feedback_volume.clamp(0.0, 1.0)
    }

    /// Environment wins over the settings file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(ENV_API_URL) {
            info!("API base URL overridden by {ENV_API_URL}");
            self.api_base_url = url;
        }
        if let Some(dir) = non_empty_env(ENV_FRAMES_DIR) {
            self.frames_dir = PathBuf::from(dir);
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn debug_enabled() -> bool {
    env::var(ENV_DEBUG)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ScannerSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings {}: {err}", path.display());
                ScannerSettings::default()
            })
        } else {
            ScannerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> ScannerSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: ScannerSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    /// Apply environment overrides in memory only; the file keeps what the
    /// operator saved.
    pub fn apply_env_overrides(&self) {
        self.write().apply_env_overrides();
    }

    fn read(&self) -> RwLockReadGuard<'_, ScannerSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, ScannerSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, data: &ScannerSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.get(), ScannerSettings::default());
    }

    #[test]
    fn test_update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.get();
        settings.api_base_url = "https://tb.example/api".into();
        settings.persist_entries = false;
        store.update(settings.clone()).unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.get(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"requestTimeoutSecs": 500, "feedbackVolume": 3.0}"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().get();
        assert_eq!(settings.request_timeout(), Duration::from_secs(60));
        assert_eq!(settings.volume(), 1.0);
        assert_eq!(settings.attendance_path, "/attendance/mark");
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ nope").unwrap();
        assert_eq!(
            SettingsStore::new(path).unwrap().get(),
            ScannerSettings::default()
        );
    }
}
