use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Where to find the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_path: Option<String>,
}

/// Client configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerEndpoint,
    /// Path of the local catalog database.
    pub storage_path: String,
    /// Directory mirroring the uploaded files.
    pub sync_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerEndpoint {
                address: "localhost".to_string(),
                port: 10081,
                use_tls: false,
                ca_path: None,
            },
            storage_path: "gophkeeper.db".to_string(),
            sync_dir: "gophkeeper-sync".to_string(),
        }
    }
}

impl Config {
    /// Load a config file; a missing file falls back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read(path)?;
        serde_json::from_slice(&data)
            .map_err(|e| ClientError::Io(format!("bad config file {path}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load("definitely-not-a-real-config.json").unwrap();
        assert_eq!(config.server.address, "localhost");
        assert_eq!(config.server.port, 10081);
        assert!(!config.server.use_tls);
    }

    #[test]
    fn test_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.storage_path, config.storage_path);
    }
}
