//! Library book identity type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the host library assigns to a book
///
/// Device records carry it as `application_id` once they have been matched
/// against the library; some drivers also report a raw database id of the
/// same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookId(u64);

impl BookId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BookId {
    fn from(id: u64) -> Self {
        BookId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(BookId::new(42).to_string(), "42");
    }

    #[test]
    fn test_from_u64() {
        let id: BookId = 7.into();
        assert_eq!(id.get(), 7);
    }
}
