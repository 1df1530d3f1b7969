//! Server configuration.

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_model_url")]
    pub model_url: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./chat-app/build")
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("datachat")
        .join("chat.db")
}

fn default_upload_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("datachat")
        .join("uploads")
}

fn default_model_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model_name() -> String {
    "llama3".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            db_path: default_db_path(),
            upload_dir: default_upload_dir(),
            model_url: default_model_url(),
            model_name: default_model_name(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = std::path::PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        Ok(Config::default())
    }
}
