//! Reconciliation between device booklists and the host library
//!
//! Two caches back the engine: a library-side index used to mark device
//! books as known, and a device-side index used to locate library books on
//! the device. Both are dropped together by [`Reconciler::reset`], which the
//! controller calls after every change to device content.

use std::collections::BTreeSet;

use ereader_device::{BookId, Booklists, Location};
use serde::{Deserialize, Serialize};

use crate::device_index::DeviceIndex;
use crate::library::Library;
use crate::library_index::{LibraryIndex, MatchTier};
use crate::normalize::{clean_string, Normalizer};

/// Whether display metadata on the device follows the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataManagement {
    /// Leave device metadata alone
    #[default]
    Manual,
    /// Rewrite device metadata from the library on every match
    OnConnect,
}

/// How a library book was found on the device, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Metadata,
    DbId,
    Uuid,
}

/// Where a library book is on the device
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OnDevice {
    pub main: bool,
    pub card_a: bool,
    pub card_b: bool,
    /// Device records across all locations resolving to this id
    pub copies: usize,
    /// Strongest match over all locations
    pub match_type: Option<MatchType>,
    pub paths: BTreeSet<String>,
}

impl OnDevice {
    pub fn get(&self, location: Location) -> bool {
        match location {
            Location::Main => self.main,
            Location::CardA => self.card_a,
            Location::CardB => self.card_b,
        }
    }

    pub fn is_on_device(&self) -> bool {
        self.main || self.card_a || self.card_b
    }

    pub(crate) fn mark(&mut self, location: Location, match_type: MatchType) {
        match location {
            Location::Main => self.main = true,
            Location::CardA => self.card_a = true,
            Location::CardB => self.card_b = true,
        }
        self.match_type = self.match_type.max(Some(match_type));
    }
}

/// Summary of one `set_books_in_library` pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reconciliation {
    pub matched: usize,
    pub unknown: usize,
    /// Device metadata was rewritten and should be synced back
    pub metadata_updated: bool,
}

/// Reconciliation engine
///
/// Not shared between threads: the controller owns it and calls it after job
/// results have been delivered.
pub struct Reconciler {
    normalize: Normalizer,
    library_index: Option<LibraryIndex>,
    /// Device index and the generation it was built for
    device_index: Option<(u64, DeviceIndex)>,
    generation: u64,
    session: Option<u64>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::with_normalizer(clean_string)
    }

    pub fn with_normalizer(normalize: Normalizer) -> Self {
        Self {
            normalize,
            library_index: None,
            device_index: None,
            generation: 0,
            session: None,
        }
    }

    /// Cache generation, bumped by every reset
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop both caches
    pub fn reset(&mut self) {
        self.library_index = None;
        self.device_index = None;
        self.generation += 1;
        tracing::debug!("Reconciliation caches reset (generation {})", self.generation);
    }

    /// Reset when the device session changed since the last call
    pub fn observe_session(&mut self, session_generation: u64) {
        if self.session != Some(session_generation) {
            self.session = Some(session_generation);
            self.reset();
        }
    }

    /// Mark every device book as known or unknown to the library
    ///
    /// Must run before [`Reconciler::book_on_device`]: the application ids it
    /// sets are what the device index counts.
    pub fn set_books_in_library<L: Library + ?Sized>(
        &mut self,
        library: &L,
        booklists: &mut Booklists,
        reset: bool,
        mode: MetadataManagement,
    ) -> Reconciliation {
        let normalize = self.normalize;
        if reset || self.library_index.is_none() {
            self.library_index = Some(LibraryIndex::build(library, normalize));
        }
        let Some(index) = self.library_index.as_ref() else {
            return Reconciliation::default();
        };

        let update_metadata = mode == MetadataManagement::OnConnect;
        let mut summary = Reconciliation::default();

        for book in booklists.books_mut() {
            match index.match_book(book, normalize) {
                Some((tier, record)) => {
                    if tier != MatchTier::ApplicationId {
                        book.application_id = Some(record.id);
                    }
                    book.in_library = Some(true);
                    if update_metadata {
                        book.smart_update(record);
                        summary.metadata_updated = true;
                    }
                    summary.matched += 1;
                }
                None => {
                    book.in_library = None;
                    summary.unknown += 1;
                }
            }

            let needs_sort = book.author_sort.as_deref().map_or(true, str::is_empty);
            if needs_sort && !book.authors.is_empty() {
                book.author_sort = Some(library.author_sort_from_authors(&book.authors));
            }
        }

        // Application ids may have changed under the device index.
        self.device_index = None;

        tracing::debug!(
            "Reconciled device books: {} matched, {} unknown",
            summary.matched,
            summary.unknown
        );
        summary
    }

    /// Locate a library book on the device
    ///
    /// Returns the default (nowhere) for ids the library does not know.
    pub fn book_on_device<L: Library + ?Sized>(&mut self, library: &L, booklists: &Booklists, id: BookId) -> OnDevice {
        let Some(record) = library.get_by_id(id) else {
            return OnDevice::default();
        };

        let normalize = self.normalize;
        let stale = self
            .device_index
            .as_ref()
            .map_or(true, |(generation, _)| *generation != self.generation);
        if stale {
            let index = DeviceIndex::build(booklists, library, self.library_index.as_ref(), normalize);
            self.device_index = Some((self.generation, index));
        }

        match &self.device_index {
            Some((_, index)) => index.query(&record, normalize),
            None => OnDevice::default(),
        }
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}
