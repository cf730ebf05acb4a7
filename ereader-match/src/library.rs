//! Live query surface of the host library

use std::collections::{BTreeMap, HashMap};

use ereader_device::{BookId, LibraryRecord};

/// Host library as seen by the reconciliation engine
///
/// Queried live; the engine never caches single-record lookups.
pub trait Library {
    fn all_ids(&self) -> Vec<BookId>;

    fn get_by_id(&self, id: BookId) -> Option<LibraryRecord>;

    fn get_by_uuid(&self, uuid: &str) -> Option<LibraryRecord>;

    /// Derive a sort name for a list of authors
    fn author_sort_from_authors(&self, authors: &[String]) -> String;
}

/// In-memory library
#[derive(Debug, Default, Clone)]
pub struct MemoryLibrary {
    records: BTreeMap<BookId, LibraryRecord>,
    by_uuid: HashMap<String, BookId>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record
    pub fn insert(&mut self, record: LibraryRecord) {
        if let Some(old) = self.records.get(&record.id) {
            self.by_uuid.remove(&old.uuid);
        }
        self.by_uuid.insert(record.uuid.clone(), record.id);
        self.records.insert(record.id, record);
    }

    pub fn remove(&mut self, id: BookId) -> Option<LibraryRecord> {
        let record = self.records.remove(&id)?;
        self.by_uuid.remove(&record.uuid);
        Some(record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<LibraryRecord> for MemoryLibrary {
    fn from_iter<I: IntoIterator<Item = LibraryRecord>>(iter: I) -> Self {
        let mut library = Self::new();
        for record in iter {
            library.insert(record);
        }
        library
    }
}

impl Library for MemoryLibrary {
    fn all_ids(&self) -> Vec<BookId> {
        self.records.keys().copied().collect()
    }

    fn get_by_id(&self, id: BookId) -> Option<LibraryRecord> {
        self.records.get(&id).cloned()
    }

    fn get_by_uuid(&self, uuid: &str) -> Option<LibraryRecord> {
        self.by_uuid.get(uuid).and_then(|id| self.get_by_id(*id))
    }

    fn author_sort_from_authors(&self, authors: &[String]) -> String {
        authors
            .iter()
            .filter(|a| !a.trim().is_empty())
            .map(|a| sort_name(a))
            .collect::<Vec<_>>()
            .join(" & ")
    }
}

const SUFFIXES: [&str; 6] = ["jr", "jr.", "sr", "sr.", "ii", "iii"];

/// "First Middle Last" becomes "Last, First Middle"
fn sort_name(author: &str) -> String {
    let author = author.trim();
    if author.contains(',') {
        return author.to_string();
    }

    let mut tokens: Vec<&str> = author.split_whitespace().collect();
    let has_suffix = tokens.len() > 2
        && tokens
            .last()
            .is_some_and(|t| SUFFIXES.contains(&t.to_lowercase().as_str()));
    let suffix = if has_suffix { tokens.pop() } else { None };

    let Some(last) = tokens.pop() else {
        return author.to_string();
    };
    if tokens.is_empty() {
        return last.to_string();
    }

    let mut sorted = format!("{}, {}", last, tokens.join(" "));
    if let Some(suffix) = suffix {
        sorted.push(' ');
        sorted.push_str(suffix);
    }
    sorted
}
