use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use anyhow::{Result, anyhow};

use crate::ai::generator::DEFAULT_MODEL_CHAIN;
use crate::chat::RagFlagPolicy;

/// Database file looked up in the working directory when nothing else is
/// configured, the name existing deployments ship with.
const DEFAULT_DB_FILE: &str = "NVI.sqlite.db";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub db_path: Option<PathBuf>,
    /// Candidate models tried in order; first success wins.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default)]
    pub rag_flag: RagFlagPolicy,
}

fn default_models() -> Vec<String> {
    DEFAULT_MODEL_CHAIN.iter().map(|m| m.to_string()).collect()
}

impl Config {
    pub fn new() -> Self {
        Self {
            gemini_api_key: None,
            db_path: None,
            models: default_models(),
            rag_flag: RagFlagPolicy::default(),
        }
    }

    /// Loads the config file if present, then applies environment overrides
    /// (`GEMINI_API_KEY`, `SALOMAO_DB`).
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        let mut config = if config_path.exists() {
            let config_content = fs::read_to_string(&config_path)?;
            serde_json::from_str(&config_content)?
        } else {
            Self::new()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                self.gemini_api_key = Some(key);
            }
        }
        if let Ok(path) = std::env::var("SALOMAO_DB") {
            if !path.is_empty() {
                self.db_path = Some(PathBuf::from(path));
            }
        }
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("salomao").join("config.json"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
