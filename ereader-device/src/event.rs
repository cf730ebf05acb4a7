//! Notifications from the device worker to the controlling thread

use std::sync::Arc;

use crate::job::Job;
use crate::model::{ConnectionInfo, DeviceKind};

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A device session was opened
    Connected(ConnectionInfo),
    /// The session closed, by eject or because the device went away
    Disconnected(DeviceKind),
    /// Message to show while a slow driver opens
    OpenFeedback(String),
    /// A job finished; its done callback has not been invoked yet
    JobDone(Arc<Job>),
}

impl DeviceEvent {
    pub fn is_connection_change(&self) -> bool {
        matches!(self, DeviceEvent::Connected(_) | DeviceEvent::Disconnected(_))
    }
}
