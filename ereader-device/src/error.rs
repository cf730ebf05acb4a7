use std::fmt;

use thiserror::Error;

/// Severity of a message a driver wants shown to the user as-is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackLevel {
    Error,
    Warning,
    Info,
}

/// Storage area that ran out of space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    MainMemory,
    Card,
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageArea::MainMemory => write!(f, "in main memory"),
            StorageArea::Card => write!(f, "on the storage card"),
        }
    }
}

/// Errors raised by drivers and by job execution
///
/// These never escape the device worker: they end up as the failure of the
/// job that raised them.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Pre-formatted message the driver wants presented with its severity
    #[error("{message}")]
    UserFeedback {
        level: FeedbackLevel,
        message: String,
        details: Option<String>,
    },

    /// No free space left in a storage area
    #[error("There is insufficient free space {area}")]
    FreeSpace { area: StorageArea },

    /// The device went away or no session is open
    #[error("Device no longer connected.")]
    NotConnected,

    /// The driver does not implement an optional capability
    #[error("Operation not supported by this device: {operation}")]
    Unsupported { operation: &'static str },

    /// Local or device file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Driver-specific protocol failure
    #[error("{0}")]
    Protocol(String),

    /// The job function panicked
    #[error("Job panicked: {0}")]
    Panicked(String),

    /// The device worker shut down before the job ran
    #[error("Device worker has stopped")]
    WorkerStopped,
}

impl DeviceError {
    pub fn protocol(message: impl Into<String>) -> Self {
        DeviceError::Protocol(message.into())
    }

    pub fn user_feedback(level: FeedbackLevel, message: impl Into<String>, details: Option<String>) -> Self {
        DeviceError::UserFeedback {
            level,
            message: message.into(),
            details,
        }
    }
}

/// Result type for driver operations and job functions
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors returned by the Controller-facing `DeviceManager` API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// Eject refused while device jobs are queued or running
    #[error("Cannot eject while device jobs are pending")]
    DeviceBusy,

    /// No device session is open
    #[error("No device is connected")]
    NotConnected,

    /// The connected driver can neither eject nor unmount
    #[error("Connected device cannot be ejected")]
    Unsupported,

    /// The worker thread is gone
    #[error("Device worker has stopped")]
    WorkerStopped,

    /// Rejected configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for `DeviceManager` operations
pub type ManagerResult<T> = std::result::Result<T, ManagerError>;
