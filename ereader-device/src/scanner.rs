//! Device presence scanning

use crate::driver::DeviceDriver;
use crate::model::DetectedDevice;

/// Enumerates attached hardware
///
/// `scan` refreshes the snapshot; `is_connected` answers from it.
pub trait Scanner: Send {
    fn scan(&mut self);

    /// Whether the device handled by `driver` is attached
    ///
    /// With `only_presence` the scanner may skip any expensive probing and
    /// only report continued presence of an already open device.
    fn is_connected(&self, driver: &dyn DeviceDriver, only_presence: bool) -> Option<DetectedDevice>;
}

/// Scanner that never finds anything
///
/// For setups that only ever mount folders or other non-USB sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScanner;

impl Scanner for NullScanner {
    fn scan(&mut self) {}

    fn is_connected(&self, _driver: &dyn DeviceDriver, _only_presence: bool) -> Option<DetectedDevice> {
        None
    }
}
