//! Daemon configuration: defaults, then config file, then environment.
//!
//! File: `--config <path>`, else ~/.config/dsyncd/dsyncd.toml, else
//! /etc/dsyncd/dsyncd.toml. Env overrides: DSYNCD_HOST, DSYNCD_PORT.

use crate::error::{Result, SyncError};
use crate::request::DEFAULT_PORT;
use crate::transfer::options::TransferOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Listen address (default 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,

    /// Control connection port (default 4200)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Datagram port per transfer, 0 picks a free one
    #[serde(default)]
    pub udp_port: u16,

    #[serde(default)]
    pub transfer: TransferOptions,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            udp_port: 0,
            transfer: TransferOptions::default(),
        }
    }
}

impl DaemonConfig {
    /// Load config: an explicit path must exist and parse; otherwise the
    /// first config file found is used, or the defaults if there is none.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match config_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    tracing::info!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        config.transfer.validate()?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("DSYNCD_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("DSYNCD_PORT") {
            self.port = port
                .parse()
                .map_err(|_| SyncError::Config(format!("DSYNCD_PORT is not a port: {}", port)))?;
        }
        Ok(())
    }

    /// `host:port` to listen on
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(home) = dirs::home_dir() {
        out.push(home.join(".config/dsyncd/dsyncd.toml"));
    }
    out.push(PathBuf::from("/etc/dsyncd/dsyncd.toml"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:4200");
        assert_eq!(config.transfer, TransferOptions::default());
    }

    #[test]
    fn test_partial_file() {
        let config = DaemonConfig::from_toml(
            r#"
port = 4300

[transfer]
status_interval_ms = 20
"#,
        )
        .unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4300);
        assert_eq!(config.transfer.status_interval_ms, 20);
        assert_eq!(config.transfer.fragment_size, 500);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(DaemonConfig::from_toml("listen = \"x\"\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("DSYNCD_HOST", "127.0.0.1"), ("DSYNCD_PORT", "5000")]
            .into_iter()
            .collect();
        let mut config = DaemonConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:5000");

        let mut config = DaemonConfig::default();
        assert!(config
            .apply_env(|k| (k == "DSYNCD_PORT").then(|| "http".to_string()))
            .is_err());
    }

    #[test]
    fn test_explicit_missing_file_errors() {
        let err = DaemonConfig::load(Some(Path::new("/nonexistent/dsyncd.toml"))).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dsyncd.toml");
        std::fs::write(&path, "host = \"::1\"\nudp_port = 4201\n").unwrap();

        let config = DaemonConfig::from_file(&path).unwrap();
        assert_eq!(config.host, "::1");
        assert_eq!(config.udp_port, 4201);
        assert_eq!(config.listen_addr(), "[::1]:4200");
    }

    #[test]
    fn test_oversized_fragment_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dsyncd.toml");
        std::fs::write(&path, "[transfer]\nfragment_size = 70000\n").unwrap();

        let err = DaemonConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(err.to_string().contains("fragment_size"));
    }
}
