use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Models offered by the model picker
pub const MODEL_CHOICES: &[(&str, &str)] = &[
    ("gemini-3-pro-preview", "Gemini 3 Pro (High Quality)"),
    ("gemini-3-flash-preview", "Gemini 3 Flash (Fast)"),
    ("gemini-1.5-flash", "Gemini 1.5 Flash"),
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tavily_api_key: Option<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: default_model(),
            tavily_api_key: None,
        }
    }
}

impl Settings {
    /// The Tavily key, treating an empty string as "not configured"
    pub fn tavily_key(&self) -> Option<&str> {
        self.tavily_api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// Durable home of the settings record.
///
/// `save` always rewrites the whole record; there is no partial merge.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/devagent/settings.json`
    pub fn default_location() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(Self::new(config_dir.join("devagent").join("settings.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved settings. Never fails: a missing, unreadable or
    /// malformed file yields the defaults.
    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            return Settings::default();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not read settings, using defaults");
                return Settings::default();
            }
        };

        match serde_json::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                if settings.model.trim().is_empty() {
                    settings.model = default_model();
                }
                settings
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "settings file is not valid JSON, using defaults");
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, content)?;
        tracing::debug!(path = %self.path.display(), model = %settings.model, "settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("devagent").join("settings.json"));
        (dir, store)
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let (_dir, store) = temp_store();
        let settings = store.load();
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.tavily_api_key, None);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let (_dir, store) = temp_store();
        let settings = Settings {
            model: "gemini-3-pro-preview".to_string(),
            tavily_api_key: Some("tvly-abc123".to_string()),
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);

        let without_key = Settings {
            model: "gemini-3-flash-preview".to_string(),
            tavily_api_key: None,
        };
        store.save(&without_key).unwrap();
        assert_eq!(store.load(), without_key);
    }

    #[test]
    fn test_garbage_file_gives_default() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn test_empty_model_falls_back() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), r#"{"model": "", "tavilyApiKey": "k"}"#).unwrap();
        let settings = store.load();
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.tavily_api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_wire_format_uses_camel_case() {
        let settings = Settings {
            model: "m".to_string(),
            tavily_api_key: Some("k".to_string()),
        };
        let json: serde_json::Value = serde_json::to_value(&settings).unwrap();
        assert_eq!(json, serde_json::json!({ "model": "m", "tavilyApiKey": "k" }));

        let json = serde_json::to_value(Settings::default()).unwrap();
        assert!(json.get("tavilyApiKey").is_none());
    }

    #[test]
    fn test_blank_tavily_key_is_not_configured() {
        let settings = Settings {
            model: DEFAULT_MODEL.to_string(),
            tavily_api_key: Some("   ".to_string()),
        };
        assert_eq!(settings.tavily_key(), None);
    }
}
