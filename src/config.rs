use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::DEFAULT_API_URL;
use crate::provider::Provider;

pub const ENV_API_URL: &str = "HELIX_API_URL";
pub const ENV_PROVIDER: &str = "HELIX_PROVIDER";
pub const ENV_MODEL: &str = "HELIX_MODEL";

/// User settings, stored as JSON under the platform config directory.
///
/// Precedence is file, then environment, then command-line flags (applied by
/// the binary).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub provider: Option<String>,
    pub model_name: Option<String>,
    pub api_url: Option<String>,
    /// Push workspace edits to the backend's update-sequence endpoint
    #[serde(default)]
    pub persist_edits: bool,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::default().as_str().to_string()),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_provider(provider: Provider) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.provider = Some(provider.as_str().to_string());
        config.save()
    }

    /// Overlay `HELIX_*` environment variables
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = Some(url);
        }
        if let Some(provider) = lookup(ENV_PROVIDER) {
            self.provider = Some(provider);
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.model_name = Some(model);
        }
        self
    }

    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(DEFAULT_API_URL)
    }

    /// Configured provider; unknown names fall back to the default
    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or_default()
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("helix"))
    }

    pub fn default_log_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("helix.log"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.provider(), Provider::OpenAI);
        assert_eq!(config.api_url(), DEFAULT_API_URL);
        assert!(!config.persist_edits);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            provider: Some("gemini".to_string()),
            model_name: Some("gemini-1.5-pro".to_string()),
            api_url: Some("http://backend:5000/api".to_string()),
            persist_edits: true,
        };

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.provider(), Provider::Gemini);
    }

    #[test]
    fn test_env_overrides_file() {
        let config = Config::new().with_overrides(|key| match key {
            ENV_API_URL => Some("http://10.0.0.2:5000/api".to_string()),
            ENV_PROVIDER => Some("Gemini".to_string()),
            _ => None,
        });
        assert_eq!(config.api_url(), "http://10.0.0.2:5000/api");
        assert_eq!(config.provider(), Provider::Gemini);
        assert_eq!(config.model_name, None);
    }

    #[test]
    fn test_unknown_provider_falls_back() {
        let config = Config {
            provider: Some("claude".to_string()),
            ..Config::default()
        };
        assert_eq!(config.provider(), Provider::OpenAI);
    }

    #[test]
    fn test_persist_edits_defaults_off_in_old_files() {
        let config: Config = serde_json::from_str(r#"{"provider":"openai"}"#).unwrap();
        assert!(!config.persist_edits);
        assert_eq!(config.model_name, None);
    }
}
