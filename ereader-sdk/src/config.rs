//! Controller configuration
//!
//! Usually loaded from the embedding application's settings as JSON. Every
//! field is optional and falls back to its default.

use std::path::PathBuf;
use std::time::Duration;

use ereader_device::ManagerConfig;
use ereader_match::MetadataManagement;
use serde::{Deserialize, Serialize};

use crate::error::SdkResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Whether device metadata is rewritten from the library on connect
    pub metadata_management: MetadataManagement,

    /// Folder mounted as a device when the controller starts
    pub auto_connect_folder: Option<PathBuf>,

    /// Device worker idle time between iterations
    /// Default: 2000
    pub poll_interval_ms: u64,

    /// Delay before the single connect retry
    /// Default: 5000
    pub retry_delay_ms: u64,

    /// Log every connect failure, not only new ones
    pub verbose: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let manager = ManagerConfig::default();
        Self {
            metadata_management: MetadataManagement::default(),
            auto_connect_folder: None,
            poll_interval_ms: manager.poll_interval.as_millis() as u64,
            retry_delay_ms: manager.retry_delay.as_millis() as u64,
            verbose: manager.verbose,
        }
    }
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> SdkResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_metadata_management(mut self, mode: MetadataManagement) -> Self {
        self.metadata_management = mode;
        self
    }

    pub fn with_auto_connect_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.auto_connect_folder = Some(folder.into());
        self
    }

    /// Device worker settings
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::new()
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms))
            .with_verbose(self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_manager_defaults() {
        let config = ControllerConfig::default();
        let manager = config.manager_config();
        assert_eq!(manager.poll_interval, Duration::from_secs(2));
        assert_eq!(manager.retry_delay, Duration::from_secs(5));
        assert!(!manager.verbose);
        assert_eq!(config.metadata_management, MetadataManagement::Manual);
    }

    #[test]
    fn test_from_json_partial() {
        let config = ControllerConfig::from_json(
            r#"{"metadata_management": "on_connect", "auto_connect_folder": "/media/reader", "poll_interval_ms": 250}"#,
        )
        .unwrap();

        assert_eq!(config.metadata_management, MetadataManagement::OnConnect);
        assert_eq!(config.auto_connect_folder, Some(PathBuf::from("/media/reader")));
        assert_eq!(config.manager_config().poll_interval, Duration::from_millis(250));
        assert_eq!(config.retry_delay_ms, 5000);
    }

    #[test]
    fn test_from_json_rejects_unknown_mode() {
        assert!(ControllerConfig::from_json(r#"{"metadata_management": "always"}"#).is_err());
    }

    #[test]
    fn test_zero_interval_fails_validation() {
        let config = ControllerConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.manager_config().validate().is_err());
    }
}
