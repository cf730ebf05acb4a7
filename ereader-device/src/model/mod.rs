//! Data model shared by the device worker, drivers and the reconciliation engine

mod book;
mod book_id;
mod device;

pub use book::{Annotation, Booklists, Card, DeviceBook, LibraryRecord, Location, UploadedBook};
pub use book_id::BookId;
pub use device::{
    CardPrefix, ConnectionInfo, DetectedDevice, DeviceInformation, DeviceKind, DriverCapabilities,
    DriverProfile, FreeSpace, StorageStatus,
};
