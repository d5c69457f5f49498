//! TOML-based application configuration.
//!
//! Holds the local preferences that are not part of the per-user session
//! settings:
//! - Which session store backs persistence (local SQLite or hosted REST)
//! - Notification and overlay toggles
//! - XP award amount and source label
//! - Inactivity detection toggle
//!
//! Stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::overlay::DEFAULT_FPS;
use crate::xp::{DEFAULT_WORK_SESSION_XP, DEFAULT_XP_SOURCE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Local,
    Remote,
}

/// Connection settings for the hosted store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteStoreConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub remote: RemoteStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpConfig {
    #[serde(default = "default_xp")]
    pub per_work_session: i64,
    #[serde(default = "default_xp_source")]
    pub source_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InactivityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub xp: XpConfig,
    #[serde(default)]
    pub inactivity: InactivityConfig,
}

fn default_true() -> bool {
    true
}
fn default_fps() -> u32 {
    DEFAULT_FPS
}
fn default_xp() -> i64 {
    DEFAULT_WORK_SESSION_XP
}
fn default_xp_source() -> String {
    DEFAULT_XP_SOURCE.to_string()
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fps: DEFAULT_FPS,
        }
    }
}

impl Default for XpConfig {
    fn default() -> Self {
        Self {
            per_work_session: default_xp(),
            source_label: default_xp_source(),
        }
    }
}

impl Default for InactivityConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => value
                        .parse::<bool>()
                        .map(serde_json::Value::Bool)
                        .map_err(|e| invalid(e.to_string()))?,
                    serde_json::Value::Number(_) => value
                        .parse::<i64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("not a leaf key".to_string()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
        match value {
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    let key = if prefix.is_empty() {
                        k.clone()
                    } else {
                        format!("{prefix}.{k}")
                    };
                    Self::flatten(&key, v, out);
                }
            }
            other => out.push((prefix.to_string(), Self::display_value(other))),
        }
    }

    fn display_value(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        if val.is_object() {
            return None;
        }
        Some(Self::display_value(val))
    }

    /// Set a leaf value by dot-separated key. Does not persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not parse
    /// as the key's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// All leaf keys with their current values, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            Self::flatten("", &json, &mut out);
        }
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = AppConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.store.backend, StoreBackend::Local);
        assert_eq!(parsed.overlay.fps, 30);
        assert_eq!(parsed.xp.per_work_session, 50);
        assert_eq!(parsed.xp.source_label, "pomodoro_completed");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [store]
            backend = "remote"

            [store.remote]
            url = "https://db.example.test"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.store.backend, StoreBackend::Remote);
        assert_eq!(parsed.store.remote.url.as_deref(), Some("https://db.example.test"));
        assert!(parsed.notifications.enabled);
        assert!(parsed.inactivity.enabled);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.get("overlay.enabled").as_deref(), Some("true"));
        assert_eq!(cfg.get("xp.per_work_session").as_deref(), Some("50"));
        assert_eq!(cfg.get("store.backend").as_deref(), Some("local"));
        assert_eq!(cfg.get("store.remote.url").as_deref(), Some(""));
        assert!(cfg.get("overlay.missing_key").is_none());
        assert!(cfg.get("overlay").is_none());
    }

    #[test]
    fn set_updates_typed_values() {
        let mut cfg = AppConfig::default();
        cfg.set("overlay.fps", "15").unwrap();
        cfg.set("notifications.enabled", "false").unwrap();
        cfg.set("store.backend", "remote").unwrap();
        cfg.set("store.remote.user_id", "user-1").unwrap();
        assert_eq!(cfg.overlay.fps, 15);
        assert!(!cfg.notifications.enabled);
        assert_eq!(cfg.store.backend, StoreBackend::Remote);
        assert_eq!(cfg.store.remote.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = AppConfig::default();
        assert!(matches!(
            cfg.set("overlay.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(cfg.set("", "1"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_rejects_invalid_values() {
        let mut cfg = AppConfig::default();
        assert!(matches!(
            cfg.set("overlay.enabled", "maybe"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("store.backend", "cloud"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("store", "x"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(cfg.store.backend, StoreBackend::Local);
    }

    #[test]
    fn entries_lists_leaf_keys() {
        let cfg = AppConfig::default();
        let entries = cfg.entries();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"store.remote.api_key"));
        assert!(keys.contains(&"inactivity.enabled"));
        assert!(!keys.contains(&"store"));
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = AppConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.overlay.fps, 30);

        let mut changed = cfg.clone();
        changed.set("xp.per_work_session", "75").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap().xp.per_work_session, 75);
    }

    #[test]
    fn load_from_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
