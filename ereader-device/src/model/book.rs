//! Book records on the device and in the host library

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::BookId;

/// Storage area on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    Main,
    CardA,
    CardB,
}

impl Location {
    /// All locations in booklist order
    pub const ALL: [Location; 3] = [Location::Main, Location::CardA, Location::CardB];

    /// Position of this location in booklist order
    pub fn index(self) -> usize {
        match self {
            Location::Main => 0,
            Location::CardA => 1,
            Location::CardB => 2,
        }
    }

    /// The card slot for this location, `None` for main memory
    pub fn card(self) -> Option<Card> {
        match self {
            Location::Main => None,
            Location::CardA => Some(Card::A),
            Location::CardB => Some(Card::B),
        }
    }
}

impl From<Option<Card>> for Location {
    fn from(card: Option<Card>) -> Self {
        match card {
            None => Location::Main,
            Some(Card::A) => Location::CardA,
            Some(Card::B) => Location::CardB,
        }
    }
}

/// Storage card slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Card {
    A,
    B,
}

/// A book in the host library
///
/// Owned by the library and queried live. Also used as the metadata sent
/// along with uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRecord {
    pub id: BookId,
    pub title: String,
    pub authors: Vec<String>,
    pub author_sort: Option<String>,
    pub uuid: String,
    pub cover_path: Option<PathBuf>,
}

impl LibraryRecord {
    pub fn new(id: BookId, title: impl Into<String>, authors: Vec<String>, uuid: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            authors,
            author_sort: None,
            uuid: uuid.into(),
            cover_path: None,
        }
    }

    pub fn with_author_sort(mut self, author_sort: impl Into<String>) -> Self {
        self.author_sort = Some(author_sort.into());
        self
    }
}

/// A book as reported by the device driver
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceBook {
    pub title: String,
    pub authors: Vec<String>,
    pub author_sort: Option<String>,
    pub uuid: Option<String>,
    /// Library id attached once the record has been matched
    pub application_id: Option<BookId>,
    /// Raw database id some drivers store on the device
    pub db_id: Option<BookId>,
    pub path: String,
    /// `Some(true)` when matched against the library, `None` when unknown
    pub in_library: Option<bool>,
}

impl DeviceBook {
    pub fn new(title: impl Into<String>, authors: Vec<String>, path: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            authors,
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_application_id(mut self, id: BookId) -> Self {
        self.application_id = Some(id);
        self
    }

    pub fn with_db_id(mut self, id: BookId) -> Self {
        self.db_id = Some(id);
        self
    }

    /// The library id this record resolves to: application id, else raw id
    pub fn resolved_id(&self) -> Option<BookId> {
        self.application_id.or(self.db_id)
    }

    /// Replace the display metadata with the library's copy
    pub fn smart_update(&mut self, record: &LibraryRecord) {
        self.title = record.title.clone();
        self.authors = record.authors.clone();
        if record.author_sort.is_some() {
            self.author_sort = record.author_sort.clone();
        }
        self.uuid = Some(record.uuid.clone());
    }

    fn from_upload(uploaded: &UploadedBook, record: &LibraryRecord) -> Self {
        Self {
            title: record.title.clone(),
            authors: record.authors.clone(),
            author_sort: record.author_sort.clone(),
            uuid: Some(record.uuid.clone()),
            application_id: Some(record.id),
            db_id: None,
            path: uploaded.path.clone(),
            in_library: Some(true),
        }
    }
}

/// Where the driver placed an uploaded book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedBook {
    pub path: String,
    pub location: Location,
}

/// A highlight, bookmark or note read back from the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub kind: String,
    pub location: String,
    pub content: String,
}

/// Inventory of the three device storage areas
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Booklists {
    pub main: Vec<DeviceBook>,
    pub card_a: Vec<DeviceBook>,
    pub card_b: Vec<DeviceBook>,
}

impl Booklists {
    pub fn new(main: Vec<DeviceBook>, card_a: Vec<DeviceBook>, card_b: Vec<DeviceBook>) -> Self {
        Self { main, card_a, card_b }
    }

    pub fn get(&self, location: Location) -> &[DeviceBook] {
        match location {
            Location::Main => &self.main,
            Location::CardA => &self.card_a,
            Location::CardB => &self.card_b,
        }
    }

    pub fn get_mut(&mut self, location: Location) -> &mut Vec<DeviceBook> {
        match location {
            Location::Main => &mut self.main,
            Location::CardA => &mut self.card_a,
            Location::CardB => &mut self.card_b,
        }
    }

    /// Iterate over `(location, books)` in main/cardA/cardB order
    pub fn iter(&self) -> impl Iterator<Item = (Location, &[DeviceBook])> {
        Location::ALL.into_iter().map(move |loc| (loc, self.get(loc)))
    }

    /// Every book on every location, mutably
    pub fn books_mut(&mut self) -> impl Iterator<Item = &mut DeviceBook> {
        self.main
            .iter_mut()
            .chain(self.card_a.iter_mut())
            .chain(self.card_b.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.main.len() + self.card_a.len() + self.card_b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record freshly uploaded books in the lists they landed in
    ///
    /// `uploaded` and `metadata` are paired by position; extra entries on
    /// either side are ignored.
    pub fn add_uploaded(&mut self, uploaded: &[UploadedBook], metadata: &[LibraryRecord]) {
        for (location, record) in uploaded.iter().zip(metadata) {
            let list = self.get_mut(location.location);
            list.retain(|b| b.path != location.path);
            list.push(DeviceBook::from_upload(location, record));
        }
    }

    /// Drop records whose path was deleted from the device
    ///
    /// Returns the number of records removed.
    pub fn remove_paths(&mut self, paths: &[String]) -> usize {
        let before = self.len();
        for loc in Location::ALL {
            self.get_mut(loc).retain(|b| !paths.contains(&b.path));
        }
        before - self.len()
    }
}
