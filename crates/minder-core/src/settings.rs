use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::storage;
use crate::task::{Category, Priority};

pub const SETTINGS_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    System,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }

    pub fn from_keyword(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            "system" => Some(Theme::System),
            _ => None,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub lead_minutes: i64,
    pub sound: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            lead_minutes: 30,
            sound: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplaySettings {
    pub sidebar_width: u32,
    pub compact_mode: bool,
    pub show_completed: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            sidebar_width: 220,
            compact_mode: false,
            show_completed: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultValues {
    pub category: Category,
    pub priority: Priority,
    pub due_hours: i64,
}

impl Default for DefaultValues {
    fn default() -> Self {
        Self {
            category: Category::Others,
            priority: Priority::Medium,
            due_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub version: u32,
    pub theme: Theme,
    pub language: String,
    pub notifications: NotificationSettings,
    pub display: DisplaySettings,
    #[serde(rename = "defaultValues")]
    pub defaults: DefaultValues,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            theme: Theme::System,
            language: "zh-CN".to_string(),
            notifications: NotificationSettings::default(),
            display: DisplaySettings::default(),
            defaults: DefaultValues::default(),
        }
    }
}

impl Settings {
    fn upgrade(mut self) -> Self {
        // version 1 is the first released schema; older payloads only lack
        // fields, which the serde defaults fill in
        if self.version < SETTINGS_VERSION {
            debug!(from = self.version, to = SETTINGS_VERSION, "upgrading settings schema");
            self.version = SETTINGS_VERSION;
        }
        self
    }
}

/// Persisted user settings. Reads happen against an in-memory snapshot;
/// every mutation is written back to disk before it returns.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    current: RwLock<Settings>,
}

impl SettingsStore {
    #[tracing::instrument(skip(path))]
    pub fn load(path: PathBuf) -> anyhow::Result<Self> {
        let settings = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            match serde_json::from_str::<Settings>(&raw) {
                Ok(parsed) => parsed.upgrade(),
                Err(err) => {
                    error!(
                        file = %path.display(),
                        error = %err,
                        "unreadable settings file; falling back to defaults"
                    );
                    Settings::default()
                }
            }
        } else {
            info!(file = %path.display(), "no settings file yet; using defaults");
            Settings::default()
        };

        Ok(Self {
            path: Some(path),
            current: RwLock::new(settings),
        })
    }

    /// In-memory store that never touches disk.
    pub fn ephemeral(settings: Settings) -> Self {
        Self {
            path: None,
            current: RwLock::new(settings),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> Settings {
        self.current.read().clone()
    }

    #[tracing::instrument(skip(self, apply))]
    pub fn update<F>(&self, apply: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Settings),
    {
        let updated = {
            let mut guard = self.current.write();
            apply(&mut guard);
            guard.version = SETTINGS_VERSION;
            guard.clone()
        };
        self.persist(&updated)
    }

    #[tracing::instrument(skip(self))]
    pub fn set_key(&self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "theme" => {
                let theme = Theme::from_keyword(value)
                    .ok_or_else(|| anyhow!("unknown theme: {value}"))?;
                self.update(|s| s.theme = theme)
            }
            "language" => {
                let language = value.trim().to_string();
                self.update(move |s| s.language = language)
            }
            "notifications.enabled" => {
                let enabled = parse_bool(value)?;
                self.update(|s| s.notifications.enabled = enabled)
            }
            "notifications.lead-minutes" => {
                let minutes: i64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid minute count: {value}"))?;
                self.update(|s| s.notifications.lead_minutes = minutes)
            }
            "notifications.sound" => {
                let sound = parse_bool(value)?;
                self.update(|s| s.notifications.sound = sound)
            }
            "display.sidebar-width" => {
                let width: u32 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid width: {value}"))?;
                self.update(|s| s.display.sidebar_width = width)
            }
            "display.compact-mode" => {
                let compact = parse_bool(value)?;
                self.update(|s| s.display.compact_mode = compact)
            }
            "display.show-completed" => {
                let show = parse_bool(value)?;
                self.update(|s| s.display.show_completed = show)
            }
            "defaults.category" => {
                let category = Category::from_keyword(value)
                    .ok_or_else(|| anyhow!("unknown category: {value}"))?;
                self.update(|s| s.defaults.category = category)
            }
            "defaults.priority" => {
                let priority = Priority::from_keyword(value)
                    .ok_or_else(|| anyhow!("unknown priority: {value}"))?;
                self.update(|s| s.defaults.priority = priority)
            }
            "defaults.due-hours" => {
                let hours: i64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid hour count: {value}"))?;
                self.update(|s| s.defaults.due_hours = hours)
            }
            other => Err(anyhow!("unknown settings key: {other}")),
        }
    }

    fn persist(&self, settings: &Settings) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            debug!("ephemeral settings store; skipping persist");
            return Ok(());
        };

        let payload =
            serde_json::to_string_pretty(settings).context("failed to serialize settings")?;
        storage::write_atomic(path, payload.as_bytes())?;
        debug!(file = %path.display(), "settings saved");
        Ok(())
    }
}

pub fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "y" => Ok(true),
        "0" | "false" | "no" | "off" | "n" => Ok(false),
        other => Err(anyhow!("cannot interpret '{other}' as a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{SETTINGS_VERSION, Settings, SettingsStore, Theme, parse_bool};
    use crate::task::{Category, Priority};

    #[test]
    fn defaults_match_first_run_expectations() {
        let settings = Settings::default();
        assert_eq!(settings.version, SETTINGS_VERSION);
        assert_eq!(settings.theme, Theme::System);
        assert_eq!(settings.language, "zh-CN");
        assert!(settings.notifications.enabled);
        assert_eq!(settings.notifications.lead_minutes, 30);
        assert!(settings.notifications.sound);
        assert_eq!(settings.display.sidebar_width, 220);
        assert!(!settings.display.compact_mode);
        assert!(settings.display.show_completed);
        assert_eq!(settings.defaults.category, Category::Others);
        assert_eq!(settings.defaults.priority, Priority::Medium);
        assert_eq!(settings.defaults.due_hours, 24);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let temp = tempdir().expect("tempdir");
        let store =
            SettingsStore::load(temp.path().join("settings.json")).expect("load settings");
        assert_eq!(store.snapshot(), Settings::default());
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("settings.json");
        fs::write(
            &path,
            r#"{"theme":"dark","notifications":{"leadMinutes":10},"legacyKey":42}"#,
        )
        .expect("write settings");

        let store = SettingsStore::load(path).expect("load settings");
        let settings = store.snapshot();

        assert_eq!(settings.theme, Theme::Dark);
        assert_eq!(settings.notifications.lead_minutes, 10);
        // untouched keys keep their defaults, unknown keys are dropped
        assert!(settings.notifications.enabled);
        assert_eq!(settings.language, "zh-CN");
        assert_eq!(settings.version, SETTINGS_VERSION);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("settings.json");
        fs::write(&path, "{not json at all").expect("write settings");

        let store = SettingsStore::load(path).expect("load settings");
        assert_eq!(store.snapshot(), Settings::default());
    }

    #[test]
    fn update_persists_immediately() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("settings.json");

        let store = SettingsStore::load(path.clone()).expect("load settings");
        store
            .update(|s| s.notifications.lead_minutes = 5)
            .expect("update settings");

        let reloaded = SettingsStore::load(path).expect("reload settings");
        assert_eq!(reloaded.snapshot().notifications.lead_minutes, 5);
    }

    #[test]
    fn set_key_covers_every_exposed_key() {
        let store = SettingsStore::ephemeral(Settings::default());

        store.set_key("theme", "light").expect("set theme");
        store.set_key("language", "en-US").expect("set language");
        store
            .set_key("notifications.enabled", "off")
            .expect("set enabled");
        store
            .set_key("notifications.lead-minutes", "15")
            .expect("set lead");
        store
            .set_key("notifications.sound", "no")
            .expect("set sound");
        store
            .set_key("display.sidebar-width", "300")
            .expect("set width");
        store
            .set_key("display.compact-mode", "yes")
            .expect("set compact");
        store
            .set_key("display.show-completed", "0")
            .expect("set show");
        store
            .set_key("defaults.category", "work")
            .expect("set category");
        store
            .set_key("defaults.priority", "high")
            .expect("set priority");
        store
            .set_key("defaults.due-hours", "48")
            .expect("set hours");

        let settings = store.snapshot();
        assert_eq!(settings.theme, Theme::Light);
        assert_eq!(settings.language, "en-US");
        assert!(!settings.notifications.enabled);
        assert_eq!(settings.notifications.lead_minutes, 15);
        assert!(!settings.notifications.sound);
        assert_eq!(settings.display.sidebar_width, 300);
        assert!(settings.display.compact_mode);
        assert!(!settings.display.show_completed);
        assert_eq!(settings.defaults.category, Category::Work);
        assert_eq!(settings.defaults.priority, Priority::High);
        assert_eq!(settings.defaults.due_hours, 48);
    }

    #[test]
    fn set_key_rejects_unknown_keys_and_bad_values() {
        let store = SettingsStore::ephemeral(Settings::default());
        assert!(store.set_key("notifications.volume", "11").is_err());
        assert!(store.set_key("theme", "solarized").is_err());
        assert!(store.set_key("notifications.enabled", "sometimes").is_err());
        // failed writes leave the snapshot untouched
        assert_eq!(store.snapshot(), Settings::default());
    }

    #[test]
    fn older_version_upgrades_on_load() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("settings.json");
        fs::write(&path, r#"{"version":0,"theme":"dark"}"#).expect("write settings");

        let store = SettingsStore::load(path).expect("load settings");
        let settings = store.snapshot();
        assert_eq!(settings.version, SETTINGS_VERSION);
        assert_eq!(settings.theme, Theme::Dark);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for raw in ["1", "true", "YES", "on", "y"] {
            assert!(parse_bool(raw).expect("truthy"));
        }
        for raw in ["0", "false", "No", "OFF", "n"] {
            assert!(!parse_bool(raw).expect("falsy"));
        }
        assert!(parse_bool("maybe").is_err());
    }
}
