//! Device-side match index, answering "where is this library book"

use std::collections::{BTreeSet, HashMap, HashSet};

use ereader_device::{BookId, Booklists, LibraryRecord, Location};

use crate::library::Library;
use crate::library_index::LibraryIndex;
use crate::normalize::{authors_to_string, Normalizer};
use crate::reconciler::{MatchType, OnDevice};

#[derive(Debug, Default)]
struct TitleBucket {
    authors: HashSet<String>,
    ids: HashSet<BookId>,
    uuids: HashSet<String>,
    paths: BTreeSet<String>,
    /// Some book under this title is already accounted for by a library uuid
    uuid_in_library: bool,
}

#[derive(Debug, Default)]
struct LocationIndex {
    by_title: HashMap<String, TitleBucket>,
    uuids: HashSet<String>,
}

#[derive(Debug, Default)]
pub(crate) struct DeviceIndex {
    locations: [LocationIndex; 3],
    uuid_paths: HashMap<String, String>,
    id_counts: HashMap<BookId, usize>,
}

impl DeviceIndex {
    pub fn build<L: Library + ?Sized>(
        booklists: &Booklists,
        library: &L,
        library_index: Option<&LibraryIndex>,
        normalize: Normalizer,
    ) -> Self {
        let mut index = Self::default();

        for (location, books) in booklists.iter() {
            let loc = &mut index.locations[location.index()];
            for book in books {
                let bucket = loc.by_title.entry(normalize(&book.title)).or_default();
                bucket
                    .authors
                    .insert(normalize(&authors_to_string(&book.authors)));

                let id = book.resolved_id();
                if let Some(id) = id {
                    bucket.ids.insert(id);
                    *index.id_counts.entry(id).or_insert(0) += 1;
                }

                // Only the device's own uuid counts; id-resolved books match as DbId.
                if let Some(uuid) = book.uuid.clone() {
                    let in_library = match library_index {
                        Some(li) => li.contains_uuid(&uuid),
                        None => library.get_by_uuid(&uuid).is_some(),
                    };
                    if in_library {
                        bucket.uuid_in_library = true;
                    }
                    bucket.uuids.insert(uuid.clone());
                    loc.uuids.insert(uuid.clone());
                    index.uuid_paths.insert(uuid, book.path.clone());
                }

                bucket.paths.insert(book.path.clone());
            }
        }

        index
    }

    pub fn query(&self, record: &LibraryRecord, normalize: Normalizer) -> OnDevice {
        let mut on_device = OnDevice::default();
        let title = normalize(&record.title);
        let authors = (!record.authors.is_empty()).then(|| normalize(&authors_to_string(&record.authors)));
        let author_sort = record
            .author_sort
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(normalize);

        for location in Location::ALL {
            let loc = &self.locations[location.index()];

            if loc.uuids.contains(&record.uuid) {
                on_device.mark(location, MatchType::Uuid);
                if let Some(path) = self.uuid_paths.get(&record.uuid) {
                    on_device.paths.insert(path.clone());
                }
                continue;
            }

            let Some(bucket) = loc.by_title.get(&title) else {
                continue;
            };
            if bucket.uuid_in_library {
                continue;
            }

            if bucket.ids.contains(&record.id) {
                on_device.mark(location, MatchType::DbId);
                on_device.paths.extend(bucket.paths.iter().cloned());
                continue;
            }

            let author_hit = [&authors, &author_sort]
                .into_iter()
                .flatten()
                .any(|key| bucket.authors.contains(key));
            if author_hit {
                tracing::debug!("Book {} found on device by metadata only", record.id);
                on_device.mark(location, MatchType::Metadata);
                on_device.paths.extend(bucket.paths.iter().cloned());
            }
        }

        on_device.copies = self.id_counts.get(&record.id).copied().unwrap_or(0);
        on_device
    }
}
