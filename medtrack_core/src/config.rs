//! Configuration file support for medtrack.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/medtrack/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables consulted for the suggestion service API key
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub adherence: AdherenceConfig,

    #[serde(default)]
    pub suggestion: SuggestionConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Dashboard windows
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdherenceConfig {
    /// Trailing window for the adherence percentage
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Number of days in the bar chart
    #[serde(default = "default_chart_days")]
    pub chart_days: u32,
}

impl Default for AdherenceConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            chart_days: default_chart_days(),
        }
    }
}

/// External suggestion service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuggestionConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Falls back to the environment when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SuggestionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// API key from the config file, else from the environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .find_map(|var| std::env::var(var).ok().filter(|k| !k.trim().is_empty()))
            })
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|_| PathBuf::from("."))
    });
    base.join("medtrack")
}

fn default_window_days() -> u32 {
    crate::adherence::DEFAULT_WINDOW_DAYS
}

fn default_chart_days() -> u32 {
    crate::adherence::DEFAULT_CHART_DAYS
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com".into()
}

fn default_model() -> String {
    "gemini-2.0-flash".into()
}

fn default_timeout_secs() -> u64 {
    crate::suggestion::DEFAULT_TIMEOUT.as_secs()
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject settings that would make the dashboard or suggestions unusable
    pub fn validate(&self) -> Result<()> {
        if self.adherence.window_days == 0 {
            return Err(Error::Config("adherence.window_days must be at least 1".into()));
        }
        if self.adherence.chart_days == 0 {
            return Err(Error::Config("adherence.chart_days must be at least 1".into()));
        }
        if self.suggestion.timeout_secs == 0 {
            return Err(Error::Config("suggestion.timeout_secs must be at least 1".into()));
        }
        if self.suggestion.model.trim().is_empty() {
            return Err(Error::Config("suggestion.model must not be empty".into()));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from("."))
        });
        base.join("medtrack").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.adherence.window_days, 30);
        assert_eq!(config.adherence.chart_days, 7);
        assert_eq!(config.suggestion.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.suggestion.model = "gemini-1.5-pro".into();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.suggestion.model, "gemini-1.5-pro");
        assert_eq!(parsed.adherence.window_days, config.adherence.window_days);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[adherence]
window_days = 14
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.adherence.window_days, 14);
        assert_eq!(config.adherence.chart_days, 7); // default
        assert_eq!(config.suggestion.model, "gemini-2.0-flash"); // default
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[adherence]\nwindow_days = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_save_and_load_from_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.suggestion.timeout_secs = 45;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.suggestion.timeout_secs, 45);
    }

    #[test]
    fn test_configured_api_key_wins() {
        let config = SuggestionConfig {
            api_key: Some("from-file".into()),
            ..SuggestionConfig::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("from-file"));
    }
}
