//! # E-reader Library Reconciliation
//!
//! Decides which device books are known to the host library and where each
//! library book sits on the device.
//!
//! ## Matching
//!
//! Device books are matched to library records in tiers, strongest first:
//! uuid, application id, raw database id, then normalized title plus authors.
//! The reverse lookup reports the strongest [`MatchType`] found over all three
//! storage locations together with the on-device paths and a copy count.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ereader_match::{MemoryLibrary, MetadataManagement, Reconciler};
//!
//! let mut reconciler = Reconciler::new();
//! let summary = reconciler.set_books_in_library(&library, &mut booklists, true, MetadataManagement::Manual);
//! let on_device = reconciler.book_on_device(&library, &booklists, id);
//! ```
//!
//! Both caches are rebuilt lazily; call [`Reconciler::reset`] whenever the
//! booklists change.

mod device_index;
pub mod library;
mod library_index;
pub mod normalize;
pub mod reconciler;

pub use library::{Library, MemoryLibrary};
pub use normalize::{authors_to_string, clean_string, Normalizer};
pub use reconciler::{MatchType, MetadataManagement, OnDevice, Reconciler, Reconciliation};
