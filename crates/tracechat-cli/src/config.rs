//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracechat_wire::DecodePolicy;

/// Backend used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8000/v1/chatbot";

/// User whose conversations are listed when nothing else is configured
pub const DEFAULT_USER: &str = "default";

/// Configuration for tracechat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the chat backend
    pub api_url: Option<String>,
    /// User id the conversations belong to
    pub user: Option<String>,
    /// What to do with frames that cannot be decoded (abort, skip)
    pub decode_policy: Option<DecodePolicy>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tracechat")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TRACECHAT_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            api_url: Some(DEFAULT_API_URL.to_string()),
            user: Some(DEFAULT_USER.to_string()),
            decode_policy: Some(DecodePolicy::Abort),
        };

        default_config.save()?;
        Ok(path)
    }

    /// Backend URL: flag, then `TRACECHAT_API_URL`, then file, then default
    pub fn api_url(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| std::env::var("TRACECHAT_API_URL").ok())
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// User id: flag, then `TRACECHAT_USER`, then file, then default
    pub fn user(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| std::env::var("TRACECHAT_USER").ok())
            .or_else(|| self.user.clone())
            .unwrap_or_else(|| DEFAULT_USER.to_string())
    }

    /// Frame decode policy; the flag forces skipping
    pub fn decode_policy(&self, skip_flag: bool) -> DecodePolicy {
        if skip_flag {
            DecodePolicy::Skip
        } else {
            self.decode_policy.unwrap_or_default()
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# tracechat configuration file
# Place at ~/.config/tracechat/config.toml (Linux/Mac) or %APPDATA%\tracechat\config.toml (Windows)

# Base URL of the chat backend (TRACECHAT_API_URL overrides)
api_url = "http://localhost:8000/v1/chatbot"

# User whose conversations are shown (TRACECHAT_USER overrides)
user = "default"

# What to do with a stream frame that cannot be decoded:
#   abort - fail the response (default)
#   skip  - log it and keep reading
decode_policy = "abort"
"#
}
