use std::{
    fs, io,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

/// Service configuration, loaded from a JSON file. Every field has a
/// default so a partial document (or an empty `{}`) is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Bind address for the snapshot broadcast listener.
    pub snapshot_bind: SocketAddr,
    /// Poll interval for the territory-claim pipeline; 0 disables the loop.
    pub colony_fetch_rate_secs: u64,
    /// Poll interval for the entity/tribe refresh; 0 disables the loop.
    pub entity_fetch_rate_secs: u64,
    /// How many owners receive a rank (and a rank color) per cycle.
    pub top_owner_count: usize,
    /// Pub/sub channel for the post-publish reload notification.
    pub notify_channel: String,
    /// Suppress the reload notification entirely.
    pub disable_notifications: bool,
    /// Optional JSON fixture backing the in-memory store in local runs.
    pub fixture_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            snapshot_bind: "127.0.0.1:8880".parse().expect("default bind address"),
            colony_fetch_rate_secs: 1800,
            entity_fetch_rate_secs: 300,
            top_owner_count: 5,
            notify_channel: "GeneralNotifications:GlobalCommands".to_string(),
            disable_notifications: true,
            fixture_path: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&contents)?;
        Ok(config)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse service config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read service config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ServiceConfig::from_json_str("{}").unwrap();
        assert_eq!(config.colony_fetch_rate_secs, 1800);
        assert_eq!(config.entity_fetch_rate_secs, 300);
        assert_eq!(config.top_owner_count, 5);
        assert!(config.fixture_path.is_none());
    }

    #[test]
    fn partial_document_overrides_defaults() {
        let config = ServiceConfig::from_json_str(
            r#"{ "colony_fetch_rate_secs": 60, "top_owner_count": 10 }"#,
        )
        .unwrap();
        assert_eq!(config.colony_fetch_rate_secs, 60);
        assert_eq!(config.top_owner_count, 10);
        assert_eq!(config.entity_fetch_rate_secs, 300);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ServiceConfig::from_file(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
    }
}
