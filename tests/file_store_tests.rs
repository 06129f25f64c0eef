//! File store tests: metadata through the repository, bytes through the
//! store.

mod common;

use common::repositories;
use polystore::{File, FileStore, Filter, LocalFileStore};

#[test]
fn test_metadata_and_content_travel_separately() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFileStore::new(dir.path().join("content")).unwrap();

    for mut case in repositories() {
        let mut file = File::new("journal/2026-08-27.md");
        file.set_content(b"wrote the persistence tests".to_vec());
        store.save(&file).unwrap();

        // The repository persists the metadata only.
        let stored = case.repo.add(file).unwrap();
        case.repo.commit().unwrap();

        let mut fetched: File = case.repo.get(stored.id_.clone()).unwrap();
        assert!(!fetched.has_content(), "backend {}", case.name);

        store.load(&mut fetched).unwrap();
        assert_eq!(
            fetched.content(),
            Some(b"wrote the persistence tests".as_slice()),
            "backend {}",
            case.name
        );
    }
}

#[test]
fn test_file_entities_are_searchable_like_any_model() {
    for mut case in repositories() {
        case.repo.add(File::new("reports/summary.pdf")).unwrap();
        case.repo.add(File::new("notes/summary.md")).unwrap();
        case.repo.add(File::new("notes/ideas.md")).unwrap();
        case.repo.commit().unwrap();

        let notes: Vec<File> = case
            .repo
            .search(Filter::new().with("path", "^notes/"))
            .unwrap();
        assert_eq!(notes.len(), 2, "backend {}", case.name);
    }
}

#[test]
fn test_deleting_missing_content_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFileStore::new(dir.path()).unwrap();
    store.delete(&File::new("never-written.bin")).unwrap();
}
