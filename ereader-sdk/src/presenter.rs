//! Rendering collaborator of the controller
//!
//! The controller never draws anything itself. It reports state changes to a
//! [`Presenter`], which the embedding application implements for its UI.

use ereader_device::{Booklists, ConnectionInfo, DeviceInformation, DeviceKind, StorageStatus};

use crate::feedback::Feedback;

/// Receives UI-facing notifications, all on the controller's thread
///
/// Every method defaults to doing nothing.
pub trait Presenter {
    fn device_connected(&mut self, _info: &ConnectionInfo) {}

    fn device_disconnected(&mut self, _kind: &DeviceKind) {}

    fn device_info(&mut self, _info: &DeviceInformation) {}

    /// The booklists were replaced or edited, or on-device flags changed
    fn booklists_changed(&mut self, _booklists: &Booklists) {}

    fn storage_changed(&mut self, _status: &StorageStatus) {}

    /// Short transient message for a status bar
    fn status_message(&mut self, _message: &str) {}

    fn show_feedback(&mut self, _feedback: &Feedback) {}
}

/// Presenter that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresenter;

impl Presenter for NullPresenter {}
