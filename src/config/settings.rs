// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Banter
//!
//! Handles loading and saving settings from ~/.banter/settings.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Environment variable consulted for the API key when settings omit it
pub const API_KEY_ENV: &str = "BANTER_API_KEY";

/// Main settings structure, stored in ~/.banter/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Upstream API endpoint configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Default generation settings for new sessions
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Session storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Upstream endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Chat completions endpoint URL
    pub base_url: String,

    /// API key; falls back to $BANTER_API_KEY when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Seconds to wait for the next stream read before giving up.
    /// 0 disables the idle timeout.
    #[serde(default = "default_idle_timeout")]
    pub stream_idle_timeout_secs: u64,
}

/// Default generation settings for new sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default chat model
    pub model: String,

    /// Model used when reasoning mode is requested
    pub reasoning_model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens per response
    pub max_tokens: u32,

    /// System prompt prepended to every conversation
    pub system_message: String,
}

/// Session storage settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory holding session records (defaults to ~/.banter/sessions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions_dir: Option<PathBuf>,
}

fn default_idle_timeout() -> u64 {
    120
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com/chat/completions".to_string(),
            api_key: None,
            stream_idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            reasoning_model: "deepseek-reasoner".to_string(),
            temperature: 1.0,
            max_tokens: 4096,
            system_message: "You are a helpful assistant.".to_string(),
        }
    }
}

impl Settings {
    /// Get the banter home directory (~/.banter or $BANTER_HOME).
    pub fn banter_home() -> PathBuf {
        if let Ok(home) = std::env::var("BANTER_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".banter")
    }

    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::banter_home().join("settings.json")
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path. A missing file yields defaults;
    /// unknown or missing sections in a stale file are tolerated.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the API key from settings or the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }

    /// Directory holding session records.
    pub fn sessions_dir(&self) -> PathBuf {
        self.storage
            .sessions_dir
            .clone()
            .unwrap_or_else(|| Self::banter_home().join("sessions"))
    }
}
