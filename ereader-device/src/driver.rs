//! Device driver abstraction
//!
//! A driver speaks the wire protocol of one family of devices. The worker
//! owns every driver and is the only thread that ever calls into one.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{DeviceError, Result};
use crate::job::ProgressReporter;
use crate::model::{
    Annotation, BookId, Booklists, Card, CardPrefix, DetectedDevice, DeviceBook, DriverProfile,
    FreeSpace, LibraryRecord, UploadedBook,
};

/// Operations the worker performs against a connected device
///
/// Optional capabilities (`annotations`, `unmount`) have default
/// implementations that fail with [`DeviceError::Unsupported`]. Drivers
/// declare which ones they really support in [`DriverProfile::capabilities`].
pub trait DeviceDriver: Send {
    /// Stable name, used to remember ejected devices
    fn name(&self) -> &str;

    fn profile(&self) -> DriverProfile;

    /// Prepare for a connect attempt against the detected device
    fn reset(&mut self, detected: Option<DetectedDevice>, progress: ProgressReporter);

    /// Open the device session
    fn open(&mut self) -> Result<()>;

    /// Release whatever is left after the device vanished without an eject
    fn post_yank_cleanup(&mut self) -> Result<()>;

    fn eject(&mut self) -> Result<()>;

    /// Let go of a mounted source such as a folder
    fn unmount(&mut self) -> Result<()> {
        Err(DeviceError::Unsupported { operation: "unmount" })
    }

    /// Bind progress reports to the job about to run
    fn set_progress_reporter(&mut self, progress: ProgressReporter);

    fn device_information(&mut self) -> Result<Vec<String>>;

    fn card_prefix(&mut self) -> Result<CardPrefix>;

    fn free_space(&mut self) -> Result<FreeSpace>;

    /// Book inventory of main memory (`None`) or a card
    fn books(&mut self, on_card: Option<Card>) -> Result<Vec<DeviceBook>>;

    /// Read annotations for the books at the given device paths
    fn annotations(&mut self, path_map: &HashMap<BookId, String>) -> Result<HashMap<BookId, Vec<Annotation>>> {
        let _ = path_map;
        Err(DeviceError::Unsupported { operation: "annotations" })
    }

    /// Write the booklists back to the device database
    fn sync_booklists(&mut self, booklists: &Booklists) -> Result<()>;

    /// Copy files onto the device, returning where each one landed
    fn upload_books(
        &mut self,
        files: &[PathBuf],
        names: &[String],
        on_card: Option<Card>,
        metadata: &[LibraryRecord],
    ) -> Result<Vec<UploadedBook>>;

    fn delete_books(&mut self, paths: &[String]) -> Result<()>;

    /// Stream a file from the device into `sink`
    fn get_file(&mut self, path: &str, sink: &mut dyn Write) -> Result<()>;
}

/// Builds a driver for a mount request (folder, iTunes, ...)
///
/// Runs on the worker thread. The path is the mount source, if any.
pub type DriverFactory = Arc<dyn Fn(Option<&Path>) -> Result<Box<dyn DeviceDriver>> + Send + Sync>;
