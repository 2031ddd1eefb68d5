// Local configuration for the client library.
//
// Global config: `~/.roomline/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root directory for Roomline client state: `~/.roomline/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".roomline"))
}

/// Path to the config file: `~/.roomline/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Path to the offline cache database: `~/.roomline/offline.db`.
pub fn offline_cache_db_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("offline.db"))
}

/// Client configuration at `~/.roomline/config.toml`.
///
/// The auth token is NOT stored here — it lives in the platform
/// keychain and reaches the session through the login flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Chat server WebSocket URL (e.g. `wss://chat.roomline.dev/v1/ws`).
    pub server_url: Option<String>,
    /// Device label shown in the marketplace's session list.
    pub device_name: Option<String>,
}

impl ClientConfig {
    /// Load from `~/.roomline/config.toml`. Returns defaults if the
    /// file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `~/.roomline/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_empty() {
        let cfg = ClientConfig::default();
        assert!(cfg.server_url.is_none());
        assert!(cfg.device_name.is_none());
    }

    #[test]
    fn config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let cfg = ClientConfig {
            server_url: Some("wss://chat.roomline.dev/v1/ws".into()),
            device_name: Some("pixel-9".into()),
        };
        cfg.save_to(&path).unwrap();
        let loaded = ClientConfig::load_from(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn rejects_plaintext_auth_token() {
        let toml_str = r#"
auth_token = "secret"
"#;
        let error = toml::from_str::<ClientConfig>(toml_str).expect_err("parse should fail");
        assert!(error.to_string().contains("unknown field `auth_token`"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let cfg: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(ClientConfig::load_from(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep").join("nested").join("config.toml");
        ClientConfig::default().save_to(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn state_paths_are_under_the_global_dir() {
        if let Some(dir) = global_dir() {
            assert!(dir.ends_with(".roomline"));
            assert!(offline_cache_db_path().unwrap().starts_with(dir));
        }
    }
}
