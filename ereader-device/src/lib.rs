//! # E-reader Device Manager
//!
//! A sync-first manager for a single attached e-reader. All device I/O is
//! serialized through one background worker so a physical device is never
//! accessed from two threads at once.
//!
//! ## Overview
//!
//! The worker detects attach and detach through a [`Scanner`], opens a
//! session on the first [`DeviceDriver`] that accepts the device, and runs
//! queued [`Job`]s strictly in submission order. Completions and connection
//! changes come back to the controlling thread as [`DeviceEvent`]s.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ereader_device::prelude::*;
//!
//! let manager = DeviceManager::builder()
//!     .scanner(my_scanner)
//!     .driver(my_driver)
//!     .config(ManagerConfig::default())
//!     .build()?;
//!
//! for event in manager.events() {
//!     match event {
//!         DeviceEvent::Connected(info) => {
//!             manager.get_device_information(None)?;
//!         }
//!         DeviceEvent::JobDone(job) => {
//!             if let Some(done) = job.take_done_callback() {
//!                 done(&job);
//!             }
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! 1. **Detection**: each loop iteration scans for devices unless an explicit
//!    mount request is pending; a failed connect is retried once after a delay
//! 2. **Job queue**: one FIFO, one running job, drained to empty every iteration
//! 3. **Removal**: when the device vanishes every queued job fails with
//!    [`DeviceError::NotConnected`]
//! 4. **Eject**: gated by [`JobTracker::has_device_jobs`] and carried out by
//!    the worker

pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod iter;
pub mod job;
pub mod manager;
pub mod model;
pub mod scanner;
pub mod tracker;
mod worker;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use config::ManagerConfig;
pub use driver::{DeviceDriver, DriverFactory};
pub use error::{DeviceError, FeedbackLevel, ManagerError, ManagerResult, Result, StorageArea};
pub use event::DeviceEvent;
pub use iter::DeviceEvents;
pub use job::{DoneCallback, Job, JobFn, JobId, JobOutput, JobState, ProgressReporter, ProgressUpdate};
pub use manager::{DeviceManager, DeviceManagerBuilder};
pub use model::*;
pub use scanner::{NullScanner, Scanner};
pub use tracker::{JobChange, JobChanges, JobRegistry, JobTracker};

/// Prelude module for convenient imports
///
/// ```rust
/// use ereader_device::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Booklists, DeviceBook, DeviceDriver, DeviceError, DeviceEvent, DeviceEvents, DeviceKind, DeviceManager,
        Job, JobOutput, JobState, JobTracker, LibraryRecord, Location, ManagerConfig, ManagerError, Scanner,
    };
}
