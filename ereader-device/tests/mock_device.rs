//! Mock driver and scanner for exercising the device worker.
//!
//! A `MockDevice` is the shared state of one simulated e-reader. Tests flip
//! its `attached` flag to simulate plugging and unplugging, and inspect the
//! call counters afterwards.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ereader_device::{
    Annotation, BookId, Booklists, Card, CardPrefix, DetectedDevice, DeviceBook, DeviceDriver, DeviceError, DeviceEvent, DeviceEvents,
    DriverProfile, FreeSpace, Job, LibraryRecord, Location, ProgressReporter, Result, Scanner, StorageArea,
    UploadedBook,
};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct DeviceState {
    pub attached: bool,
    /// Number of upcoming `open` calls that fail
    pub fail_open: u32,
    pub open_calls: u32,
    pub eject_calls: u32,
    pub unmount_calls: u32,
    pub cleanup_calls: u32,
    pub books: Booklists,
    pub files: HashMap<String, Vec<u8>>,
    pub synced: Vec<Booklists>,
    pub deleted: Vec<String>,
    pub card_prefix: CardPrefix,
    pub free_space: FreeSpace,
    /// Fail uploads as if this area were full
    pub full: Option<StorageArea>,
}

pub type MockDevice = Arc<Mutex<DeviceState>>;

pub fn attached_device() -> MockDevice {
    Arc::new(Mutex::new(DeviceState {
        attached: true,
        free_space: FreeSpace {
            main: 1_000_000,
            card_a: 0,
            card_b: 0,
        },
        ..Default::default()
    }))
}

pub struct MockDriver {
    name: String,
    profile: DriverProfile,
    device: MockDevice,
    progress: ProgressReporter,
}

impl MockDriver {
    pub fn new(name: &str, device: &MockDevice) -> Self {
        Self {
            name: name.to_string(),
            profile: DriverProfile::new(format!("Mock {}", name)),
            device: Arc::clone(device),
            progress: ProgressReporter::noop(),
        }
    }

    pub fn with_profile(mut self, update: impl FnOnce(&mut DriverProfile)) -> Self {
        update(&mut self.profile);
        self
    }

    pub fn hard_eject(self) -> Self {
        self.with_profile(|p| p.capabilities.hard_eject = true)
    }

    pub fn unmountable(self) -> Self {
        self.with_profile(|p| p.capabilities.supports_unmount = true)
    }
}

impl DeviceDriver for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> DriverProfile {
        self.profile.clone()
    }

    fn reset(&mut self, _detected: Option<DetectedDevice>, progress: ProgressReporter) {
        self.progress = progress;
    }

    fn open(&mut self) -> Result<()> {
        let mut device = self.device.lock();
        device.open_calls += 1;
        if device.fail_open > 0 {
            device.fail_open -= 1;
            return Err(DeviceError::protocol("device busy"));
        }
        Ok(())
    }

    fn post_yank_cleanup(&mut self) -> Result<()> {
        self.device.lock().cleanup_calls += 1;
        Ok(())
    }

    fn eject(&mut self) -> Result<()> {
        self.device.lock().eject_calls += 1;
        Ok(())
    }

    fn unmount(&mut self) -> Result<()> {
        self.device.lock().unmount_calls += 1;
        Ok(())
    }

    fn set_progress_reporter(&mut self, progress: ProgressReporter) {
        self.progress = progress;
    }

    fn device_information(&mut self) -> Result<Vec<String>> {
        Ok(vec![format!("{}\u{0}", self.profile.display_name), "1.0".to_string()])
    }

    fn card_prefix(&mut self) -> Result<CardPrefix> {
        Ok(self.device.lock().card_prefix.clone())
    }

    fn free_space(&mut self) -> Result<FreeSpace> {
        Ok(self.device.lock().free_space)
    }

    fn books(&mut self, on_card: Option<Card>) -> Result<Vec<DeviceBook>> {
        let device = self.device.lock();
        if !device.attached {
            return Err(DeviceError::NotConnected);
        }
        Ok(device.books.get(Location::from(on_card)).to_vec())
    }

    fn annotations(&mut self, path_map: &HashMap<BookId, String>) -> Result<HashMap<BookId, Vec<Annotation>>> {
        Ok(path_map
            .keys()
            .map(|id| {
                let note = Annotation {
                    kind: "highlight".to_string(),
                    location: "1".to_string(),
                    content: "a passage".to_string(),
                };
                (*id, vec![note])
            })
            .collect())
    }

    fn sync_booklists(&mut self, booklists: &Booklists) -> Result<()> {
        self.device.lock().synced.push(booklists.clone());
        Ok(())
    }

    fn upload_books(
        &mut self,
        files: &[PathBuf],
        names: &[String],
        on_card: Option<Card>,
        _metadata: &[LibraryRecord],
    ) -> Result<Vec<UploadedBook>> {
        if let Some(area) = self.device.lock().full {
            return Err(DeviceError::FreeSpace { area });
        }

        let location = Location::from(on_card);
        let mut uploaded = Vec::with_capacity(files.len());
        for (i, name) in names.iter().enumerate() {
            self.progress
                .report((i + 1) as f32 * 100.0 / names.len() as f32, format!("Uploading {}", name));
            let path = format!("/{:?}/{}", location, name).to_lowercase();
            self.device.lock().files.insert(path.clone(), name.as_bytes().to_vec());
            uploaded.push(UploadedBook { path, location });
        }
        Ok(uploaded)
    }

    fn delete_books(&mut self, paths: &[String]) -> Result<()> {
        let mut device = self.device.lock();
        for path in paths {
            device.files.remove(path);
            device.deleted.push(path.clone());
        }
        Ok(())
    }

    fn get_file(&mut self, path: &str, sink: &mut dyn Write) -> Result<()> {
        let contents = self
            .device
            .lock()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| DeviceError::protocol(format!("no such file: {}", path)))?;
        sink.write_all(&contents)?;
        Ok(())
    }
}

/// Scanner that reports the `attached` flag of registered mock devices
#[derive(Clone, Default)]
pub struct MockScanner {
    devices: Arc<Mutex<HashMap<String, MockDevice>>>,
    scans: Arc<Mutex<u64>>,
}

impl MockScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, driver_name: &str, device: &MockDevice) -> Self {
        self.devices
            .lock()
            .insert(driver_name.to_string(), Arc::clone(device));
        self
    }

    pub fn scans(&self) -> u64 {
        *self.scans.lock()
    }

    /// Block until the worker has scanned `count` more times
    pub fn wait_for_scans(&self, count: u64) -> bool {
        let target = self.scans() + count;
        wait_until(|| self.scans() >= target)
    }
}

impl Scanner for MockScanner {
    fn scan(&mut self) {
        *self.scans.lock() += 1;
    }

    fn is_connected(&self, driver: &dyn DeviceDriver, _only_presence: bool) -> Option<DetectedDevice> {
        let devices = self.devices.lock();
        let device = devices.get(driver.name())?;
        if device.lock().attached {
            Some(DetectedDevice {
                vendor_id: 0x1949,
                product_id: 0x0004,
                ..Default::default()
            })
        } else {
            None
        }
    }
}

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Wait for the first event matching `predicate`, discarding others
pub fn wait_for_event(events: &DeviceEvents, mut predicate: impl FnMut(&DeviceEvent) -> bool) -> Option<DeviceEvent> {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if let Some(event) = events.recv_timeout(Duration::from_millis(50)) {
            if predicate(&event) {
                return Some(event);
            }
        }
    }
    None
}

/// Collect `count` finished jobs in completion order
pub fn wait_for_jobs(events: &DeviceEvents, count: usize) -> Vec<Arc<Job>> {
    let mut done = Vec::with_capacity(count);
    while done.len() < count {
        match wait_for_event(events, |e| matches!(e, DeviceEvent::JobDone(_))) {
            Some(DeviceEvent::JobDone(job)) => done.push(job),
            _ => break,
        }
    }
    done
}
