use std::path::PathBuf;

use ereader_device::ManagerError;
use thiserror::Error;

use crate::logging::LoggingError;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Device manager error: {0}")]
    Manager(#[from] ManagerError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("No folder driver configured")]
    NoFolderDriver,

    #[error("Outbox worker has stopped")]
    OutboxStopped,

    #[error("Failed to start outbox worker: {0}")]
    OutboxSpawn(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
