use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::ai::vision::DEFAULT_ANALYSIS_ENDPOINT;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const ANALYSIS_URL_ENV: &str = "CIVIC_ASSIST_ANALYSIS_URL";

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_idle_timeout_secs: Option<u64>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the user config directory, then apply environment
    /// overrides. A missing file is not an error.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        config.apply_env(
            std::env::var(API_KEY_ENV).ok(),
            std::env::var(ANALYSIS_URL_ENV).ok(),
        );
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("Invalid config file {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    fn apply_env(&mut self, api_key: Option<String>, analysis_url: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.gemini_api_key = Some(key);
        }
        if let Some(url) = analysis_url.filter(|u| !u.trim().is_empty()) {
            self.analysis_endpoint = Some(url);
        }
    }

    /// The configured credential. Blank keys count as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn analysis_endpoint(&self) -> &str {
        self.analysis_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ANALYSIS_ENDPOINT)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(
            self.stream_idle_timeout_secs
                .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
        )
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("civic-assist").join("config.json"))
    }
}
