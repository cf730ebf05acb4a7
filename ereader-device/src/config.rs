//! Configuration for the device worker
//!
//! Controls how often the worker probes for devices and how long it waits
//! before the single connect retry.

use std::time::Duration;

use crate::error::{ManagerError, ManagerResult};

/// Configuration for the DeviceManager worker loop
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Idle time between loop iterations once the job queue is empty
    /// Default: 2 seconds
    pub poll_interval: Duration,

    /// Delay before retrying a failed connect
    /// Default: 5 seconds
    pub retry_delay: Duration,

    /// Report every connect failure instead of only new ones
    /// Default: false
    pub verbose: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            retry_delay: Duration::from_secs(5),
            verbose: false,
        }
    }
}

impl ManagerConfig {
    /// Create a new ManagerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Short intervals, for tests and simulated devices
    pub fn fast() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ManagerResult<()> {
        if self.poll_interval == Duration::ZERO {
            return Err(ManagerError::InvalidConfig(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.retry_delay == Duration::ZERO {
            return Err(ManagerError::InvalidConfig(
                "Retry delay must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
