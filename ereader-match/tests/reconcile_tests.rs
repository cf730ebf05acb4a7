//! Property tests for library reconciliation

use proptest::prelude::*;

use ereader_device::{BookId, Booklists, DeviceBook, LibraryRecord, Location};
use ereader_match::{Library, MemoryLibrary, MetadataManagement, Reconciler};

// ============================================================================
// Strategies
// ============================================================================

const TITLES: [&str; 4] = ["Dune", "Emma", "dune!", "The Hobbit"];
const AUTHORS: [&str; 3] = ["Frank Herbert", "Jane Austen", "J. R. R. Tolkien"];

fn library_strategy() -> impl Strategy<Value = MemoryLibrary> {
    prop::collection::vec((0..TITLES.len(), 0..AUTHORS.len()), 0..8).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (title, author))| {
                let id = i as u64 + 1;
                LibraryRecord::new(BookId::new(id), TITLES[title], vec![AUTHORS[author].to_string()], format!("U{id}"))
            })
            .collect()
    })
}

fn device_book_strategy() -> impl Strategy<Value = (usize, DeviceBook)> {
    (
        0..3usize,
        0..TITLES.len(),
        prop::option::of(0..AUTHORS.len()),
        prop::option::of(1..12u64),
        prop::option::of(1..12u64),
        prop::option::of(1..12u64),
    )
        .prop_map(|(location, title, author, uuid, app_id, db_id)| {
            let authors = author.map(|a| vec![AUTHORS[a].to_string()]).unwrap_or_default();
            let mut book = DeviceBook::new(TITLES[title], authors, String::new());
            book.uuid = uuid.map(|u| format!("U{u}"));
            book.application_id = app_id.map(BookId::new);
            book.db_id = db_id.map(BookId::new);
            (location, book)
        })
}

fn booklists_strategy() -> impl Strategy<Value = Booklists> {
    prop::collection::vec(device_book_strategy(), 0..12).prop_map(|books| {
        let mut lists = Booklists::default();
        for (i, (location, mut book)) in books.into_iter().enumerate() {
            book.path = format!("/books/{i}.epub");
            lists.get_mut(Location::ALL[location]).push(book);
        }
        lists
    })
}

fn all_books(lists: &Booklists) -> impl Iterator<Item = &DeviceBook> {
    lists.iter().flat_map(|(_, books)| books.iter())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every device book carrying a library uuid ends up pointing at that record
    #[test]
    fn prop_uuid_match_wins(library in library_strategy(), mut lists in booklists_strategy()) {
        let mut reconciler = Reconciler::new();
        reconciler.set_books_in_library(&library, &mut lists, true, MetadataManagement::Manual);

        for book in all_books(&lists) {
            if let Some(record) = book.uuid.as_deref().and_then(|u| library.get_by_uuid(u)) {
                prop_assert_eq!(book.application_id, Some(record.id));
                prop_assert_eq!(book.in_library, Some(true));
            }
        }
    }

    /// A second pass over already reconciled lists changes nothing
    #[test]
    fn prop_set_books_in_library_is_idempotent(library in library_strategy(), mut lists in booklists_strategy()) {
        let mut reconciler = Reconciler::new();
        let first = reconciler.set_books_in_library(&library, &mut lists, true, MetadataManagement::Manual);
        let snapshot = lists.clone();
        let second = reconciler.set_books_in_library(&library, &mut lists, false, MetadataManagement::Manual);

        prop_assert_eq!(&lists, &snapshot);
        prop_assert_eq!(first, second);
    }

    /// Copy counts equal the number of device records resolving to the id
    #[test]
    fn prop_copies_count_resolved_ids(library in library_strategy(), mut lists in booklists_strategy()) {
        let mut reconciler = Reconciler::new();
        reconciler.set_books_in_library(&library, &mut lists, true, MetadataManagement::Manual);

        for id in library.all_ids() {
            let expected = all_books(&lists).filter(|b| b.resolved_id() == Some(id)).count();
            let found = reconciler.book_on_device(&library, &lists, id);
            prop_assert_eq!(found.copies, expected);
            prop_assert_eq!(found.is_on_device(), found.match_type.is_some());
            prop_assert_eq!(found.is_on_device(), !found.paths.is_empty());
        }
    }

    /// Ids unknown to the library are never found
    #[test]
    fn prop_unknown_id_is_nowhere(library in library_strategy(), lists in booklists_strategy()) {
        let mut reconciler = Reconciler::new();
        let found = reconciler.book_on_device(&library, &lists, BookId::new(1000));
        prop_assert!(!found.is_on_device());
        prop_assert_eq!(found.copies, 0);
    }
}

// ============================================================================
// Cache behaviour
// ============================================================================

#[test]
fn test_removed_book_disappears_after_reset() {
    let library: MemoryLibrary = [LibraryRecord::new(BookId::new(1), "Dune", vec!["Frank Herbert".into()], "U1")]
        .into_iter()
        .collect();
    let mut lists = Booklists::new(vec![DeviceBook::new("Dune", vec![], "/dune.epub").with_uuid("U1")], vec![], vec![]);
    let mut reconciler = Reconciler::new();
    reconciler.set_books_in_library(&library, &mut lists, true, MetadataManagement::Manual);

    assert!(reconciler.book_on_device(&library, &lists, BookId::new(1)).main);

    lists.remove_paths(&["/dune.epub".to_string()]);
    reconciler.reset();
    assert!(!reconciler.book_on_device(&library, &lists, BookId::new(1)).is_on_device());
}

#[test]
fn test_reconcile_rebuilds_device_index() {
    let library: MemoryLibrary = [LibraryRecord::new(BookId::new(1), "Emma", vec!["Jane Austen".into()], "U1")]
        .into_iter()
        .collect();
    let mut lists = Booklists::new(
        vec![DeviceBook::new("Emma", vec!["Jane Austen".into()], "/emma.epub").with_uuid("X")],
        vec![],
        vec![],
    );
    let mut reconciler = Reconciler::new();

    // Before reconciliation the device record carries no id.
    assert_eq!(reconciler.book_on_device(&library, &lists, BookId::new(1)).copies, 0);

    reconciler.set_books_in_library(&library, &mut lists, true, MetadataManagement::Manual);
    assert_eq!(lists.main[0].application_id, Some(BookId::new(1)));
    assert_eq!(reconciler.book_on_device(&library, &lists, BookId::new(1)).copies, 1);
}
