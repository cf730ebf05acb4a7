//! Library-side match index
//!
//! Built from one full scan of the library so matching every device book is
//! linear instead of quadratic.

use std::collections::{HashMap, HashSet};

use ereader_device::{BookId, DeviceBook, LibraryRecord};

use crate::library::Library;
use crate::normalize::{authors_to_string, Normalizer};

/// Which rule matched a device book to a library record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchTier {
    Uuid,
    ApplicationId,
    DbId,
    Authors,
    AuthorSort,
}

#[derive(Debug, Default)]
struct TitleBucket {
    authors: HashMap<String, BookId>,
    author_sort: HashMap<String, BookId>,
    ids: HashSet<BookId>,
}

#[derive(Debug, Default)]
pub(crate) struct LibraryIndex {
    records: HashMap<BookId, LibraryRecord>,
    by_uuid: HashMap<String, BookId>,
    by_title: HashMap<String, TitleBucket>,
}

impl LibraryIndex {
    pub fn build<L: Library + ?Sized>(library: &L, normalize: Normalizer) -> Self {
        let mut index = Self::default();

        for id in library.all_ids() {
            let Some(record) = library.get_by_id(id) else {
                continue;
            };

            let bucket = index.by_title.entry(normalize(&record.title)).or_default();
            if !record.authors.is_empty() {
                bucket
                    .authors
                    .insert(normalize(&authors_to_string(&record.authors)), record.id);
            }
            if let Some(sort) = record.author_sort.as_deref().filter(|s| !s.is_empty()) {
                bucket.author_sort.insert(normalize(sort), record.id);
            }
            bucket.ids.insert(record.id);

            index.by_uuid.insert(record.uuid.clone(), record.id);
            index.records.insert(record.id, record);
        }

        tracing::debug!(
            "Indexed {} library records under {} titles",
            index.records.len(),
            index.by_title.len()
        );
        index
    }

    pub fn contains_uuid(&self, uuid: &str) -> bool {
        self.by_uuid.contains_key(uuid)
    }

    /// Find the library record for a device book; first tier wins
    pub fn match_book(&self, book: &DeviceBook, normalize: Normalizer) -> Option<(MatchTier, &LibraryRecord)> {
        if let Some(id) = book.uuid.as_deref().and_then(|uuid| self.by_uuid.get(uuid)) {
            return self.record(MatchTier::Uuid, *id);
        }

        let bucket = self.by_title.get(&normalize(&book.title))?;

        if let Some(id) = book.application_id.filter(|id| bucket.ids.contains(id)) {
            return self.record(MatchTier::ApplicationId, id);
        }
        if let Some(id) = book.db_id.filter(|id| bucket.ids.contains(id)) {
            return self.record(MatchTier::DbId, id);
        }

        // Either field can carry the author string on some devices.
        let key = if !book.authors.is_empty() {
            Some(normalize(&authors_to_string(&book.authors)))
        } else {
            book.author_sort.as_deref().filter(|s| !s.is_empty()).map(normalize)
        }?;

        if let Some(id) = bucket.authors.get(&key) {
            return self.record(MatchTier::Authors, *id);
        }
        if let Some(id) = bucket.author_sort.get(&key) {
            return self.record(MatchTier::AuthorSort, *id);
        }
        None
    }

    fn record(&self, tier: MatchTier, id: BookId) -> Option<(MatchTier, &LibraryRecord)> {
        self.records.get(&id).map(|record| (tier, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::MemoryLibrary;
    use crate::normalize::clean_string;

    fn library() -> MemoryLibrary {
        [
            LibraryRecord::new(BookId::new(5), "Dune", vec!["Frank Herbert".into()], "U1")
                .with_author_sort("Herbert, Frank"),
            LibraryRecord::new(BookId::new(6), "Emma", vec!["Jane Austen".into()], "U2"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_author_sort_key_used_when_authors_missing() {
        let index = LibraryIndex::build(&library(), clean_string);
        let mut book = DeviceBook::new("DUNE", vec![], "/dune.epub");
        book.author_sort = Some("Herbert, Frank".into());

        let (tier, record) = index.match_book(&book, clean_string).unwrap();
        assert_eq!(tier, MatchTier::AuthorSort);
        assert_eq!(record.id, BookId::new(5));
    }

    #[test]
    fn test_application_id_must_share_title() {
        let index = LibraryIndex::build(&library(), clean_string);
        let book = DeviceBook::new("Emma", vec![], "/emma.epub").with_application_id(BookId::new(5));
        assert!(index.match_book(&book, clean_string).is_none());
    }
}
