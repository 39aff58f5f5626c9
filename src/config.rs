// ABOUTME: Server configuration loaded from an optional TOML file with built-in defaults
// ABOUTME: Command-line flags override the file for the most common deployment knobs

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub allowed_origin: String,
    pub secure_cookies: bool,
    pub session_max_age_secs: i64,
    pub invite_ttl_days: i64,
    pub max_upload_bytes: usize,
    pub audit_page_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            database_url: "sqlite:syncscript.db?mode=rwc".to_string(),
            upload_dir: PathBuf::from("uploads"),
            allowed_origin: "http://localhost:3000".to_string(),
            secure_cookies: false,
            session_max_age_secs: 24 * 60 * 60,
            invite_ttl_days: 7,
            max_upload_bytes: 10 * 1024 * 1024,
            audit_page_size: 100,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
