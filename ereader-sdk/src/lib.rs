//! # E-reader SDK
//!
//! Sync-first controller tying the device worker, the reconciliation engine
//! and the embedding application's UI together:
//!
//! ```text
//! ereader-sdk (DeviceController, Presenter, Outbox)
//!     ↓
//! ereader-match (Reconciler, Library)
//!     ↓
//! ereader-device (DeviceManager worker, DeviceDriver, Job)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ereader_sdk::prelude::*;
//!
//! ereader_sdk::logging::init_logging_from_env()?;
//!
//! let mut controller = DeviceController::builder(
//!     DeviceManager::builder().scanner(scanner).driver(driver),
//!     library,
//!     my_presenter,
//! )
//! .config(ControllerConfig::from_json(&settings)?)
//! .build()?;
//!
//! // On the UI thread, once per tick:
//! controller.process_events();
//! let on_device = controller.book_on_device(BookId::new(42));
//! ```
//!
//! Connecting a device reads its information and booklists automatically;
//! uploads, deletions and metadata syncs keep the booklists and the
//! on-device answers current.

pub mod config;
pub mod controller;
pub mod error;
pub mod feedback;
pub mod logging;
pub mod outbox;
pub mod presenter;

pub use config::ControllerConfig;
pub use controller::{ControllerBuilder, DeviceController};
pub use error::{SdkError, SdkResult};
pub use feedback::Feedback;
pub use outbox::{BatchId, Delivery, DeliveryReport, OutboxConfig, OutgoingMessage, Outbox, Transport, TransportError};
pub use presenter::{NullPresenter, Presenter};

pub use ereader_device::{BookId, Booklists, DeviceKind, DeviceManager};
pub use ereader_match::{Library, MatchType, MemoryLibrary, MetadataManagement, OnDevice};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        BookId, ControllerConfig, DeviceController, DeviceManager, Feedback, Library, MemoryLibrary,
        MetadataManagement, OnDevice, Presenter, SdkError,
    };
}
