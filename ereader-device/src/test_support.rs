use std::io::Write;
use std::path::PathBuf;

use crate::driver::DeviceDriver;
use crate::error::Result;
use crate::job::ProgressReporter;
use crate::model::{Booklists, Card, CardPrefix, DetectedDevice, DeviceBook, DriverProfile, FreeSpace, LibraryRecord, UploadedBook};

/// Driver with an empty device behind it
#[derive(Default)]
pub(crate) struct NullDriver;

impl DeviceDriver for NullDriver {
    fn name(&self) -> &str {
        "null"
    }

    fn profile(&self) -> DriverProfile {
        DriverProfile::new("Null Device")
    }

    fn reset(&mut self, _detected: Option<DetectedDevice>, _progress: ProgressReporter) {}

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn post_yank_cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    fn eject(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_progress_reporter(&mut self, _progress: ProgressReporter) {}

    fn device_information(&mut self) -> Result<Vec<String>> {
        Ok(vec![])
    }

    fn card_prefix(&mut self) -> Result<CardPrefix> {
        Ok(CardPrefix::default())
    }

    fn free_space(&mut self) -> Result<FreeSpace> {
        Ok(FreeSpace::default())
    }

    fn books(&mut self, _on_card: Option<Card>) -> Result<Vec<DeviceBook>> {
        Ok(vec![])
    }

    fn sync_booklists(&mut self, _booklists: &Booklists) -> Result<()> {
        Ok(())
    }

    fn upload_books(
        &mut self,
        _files: &[PathBuf],
        _names: &[String],
        _on_card: Option<Card>,
        _metadata: &[LibraryRecord],
    ) -> Result<Vec<UploadedBook>> {
        Ok(vec![])
    }

    fn delete_books(&mut self, _paths: &[String]) -> Result<()> {
        Ok(())
    }

    fn get_file(&mut self, _path: &str, _sink: &mut dyn Write) -> Result<()> {
        Ok(())
    }
}
