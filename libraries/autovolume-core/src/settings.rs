//! Engine settings and their persistence
//!
//! The persisted shape is `{ "enabled": bool, "sensitivity": number }`.
//! Whatever a store hands back is parsed leniently: missing or malformed
//! fields fall back to the defaults instead of failing.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;

/// Default for [`EngineSettings::enabled`]
pub const DEFAULT_ENABLED: bool = true;

/// Default for [`EngineSettings::sensitivity`], also the fallback for invalid input
pub const DEFAULT_SENSITIVITY: f32 = 1.0;

/// Process-wide levelling settings
///
/// Copied by value into every session tick so a change is only ever observed
/// between ticks, never half-way through one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Whether levelling is applied at all
    pub enabled: bool,
    /// Multiplier on the baseline above which attenuation starts (> 0)
    pub sensitivity: f32,
}

impl EngineSettings {
    /// Build settings, replacing an invalid sensitivity with the default
    pub fn new(enabled: bool, sensitivity: f32) -> Self {
        Self {
            enabled,
            sensitivity: sanitize_sensitivity(sensitivity),
        }
    }

    /// Parse a persisted settings object leniently
    pub fn from_json_value(value: &Value) -> Self {
        let enabled = match value.get("enabled") {
            Some(Value::Bool(enabled)) => *enabled,
            _ => DEFAULT_ENABLED,
        };

        let sensitivity = value
            .get("sensitivity")
            .and_then(parse_number)
            .map_or(DEFAULT_SENSITIVITY, |s| sanitize_sensitivity(s as f32));

        Self {
            enabled,
            sensitivity,
        }
    }

    /// Parse persisted settings text; unreadable JSON yields the defaults
    pub fn from_json_str(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_json_value(&value),
            Err(e) => {
                warn!("Ignoring unreadable settings ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Persisted form
    pub fn to_json_value(&self) -> Value {
        serde_json::json!({
            "enabled": self.enabled,
            "sensitivity": self.sensitivity,
        })
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_ENABLED,
            sensitivity: DEFAULT_SENSITIVITY,
        }
    }
}

/// Positive, finite sensitivity or the default
pub fn sanitize_sensitivity(sensitivity: f32) -> f32 {
    if sensitivity.is_finite() && sensitivity > 0.0 {
        sensitivity
    } else {
        DEFAULT_SENSITIVITY
    }
}

/// Accept JSON numbers and numeric strings
fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Where settings live between runs
///
/// Implementations own the storage format; the engine only loads at startup,
/// saves after each change and clears on reset.
pub trait SettingsStore: Send {
    /// Load settings, falling back to defaults for anything missing
    fn load(&self) -> Result<EngineSettings>;

    /// Persist settings
    fn save(&mut self, settings: &EngineSettings) -> Result<()>;

    /// Remove everything persisted
    fn clear(&mut self) -> Result<()>;
}

/// In-memory store, mainly for tests and hosts without persistence
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    stored: Option<Value>,
}

impl MemorySettingsStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a raw value (which may be malformed)
    pub fn with_value(value: Value) -> Self {
        Self {
            stored: Some(value),
        }
    }

    /// Raw stored value, if any
    pub fn stored(&self) -> Option<&Value> {
        self.stored.as_ref()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<EngineSettings> {
        Ok(self
            .stored
            .as_ref()
            .map(EngineSettings::from_json_value)
            .unwrap_or_default())
    }

    fn save(&mut self, settings: &EngineSettings) -> Result<()> {
        self.stored = Some(settings.to_json_value());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.stored = None;
        Ok(())
    }
}

/// Settings kept in a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
}

impl JsonFileSettingsStore {
    /// Store backed by `path` (the file need not exist yet)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn load(&self) -> Result<EngineSettings> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(EngineSettings::from_json_str(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", self.path.display());
                Ok(EngineSettings::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, settings: &EngineSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(&settings.to_json_value())?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.sensitivity, 1.0);
    }

    #[test]
    fn test_sanitize_sensitivity() {
        assert_eq!(sanitize_sensitivity(1.7), 1.7);
        assert_eq!(sanitize_sensitivity(0.0), 1.0);
        assert_eq!(sanitize_sensitivity(-2.0), 1.0);
        assert_eq!(sanitize_sensitivity(f32::NAN), 1.0);
        assert_eq!(sanitize_sensitivity(f32::INFINITY), 1.0);
    }

    #[test]
    fn test_lenient_parse() {
        let settings = EngineSettings::from_json_value(&json!({
            "enabled": false,
            "sensitivity": "1.4",
        }));
        assert!(!settings.enabled);
        assert!((settings.sensitivity - 1.4).abs() < 1e-6);

        let settings = EngineSettings::from_json_value(&json!({
            "enabled": "yes",
            "sensitivity": "loud",
        }));
        assert_eq!(settings, EngineSettings::default());

        let settings = EngineSettings::from_json_value(&json!({ "sensitivity": -3 }));
        assert_eq!(settings, EngineSettings::default());

        assert_eq!(
            EngineSettings::from_json_value(&json!(null)),
            EngineSettings::default()
        );
    }

    #[test]
    fn test_unreadable_text_falls_back() {
        assert_eq!(
            EngineSettings::from_json_str("{not json"),
            EngineSettings::default()
        );
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemorySettingsStore::new();
        assert_eq!(store.load().unwrap(), EngineSettings::default());

        let settings = EngineSettings::new(false, 1.8);
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);

        store.clear().unwrap();
        assert!(store.stored().is_none());
        assert_eq!(store.load().unwrap(), EngineSettings::default());
    }

    #[test]
    fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileSettingsStore::new(dir.path().join("nested/settings.json"));

        assert_eq!(store.load().unwrap(), EngineSettings::default());

        let settings = EngineSettings::new(false, 0.8);
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);

        store.clear().unwrap();
        assert!(!store.path().exists());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_json_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "garbage").unwrap();

        let store = JsonFileSettingsStore::new(&path);
        assert_eq!(store.load().unwrap(), EngineSettings::default());
    }
}
