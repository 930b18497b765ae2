use std::sync::Arc;

use serde::de::IgnoredAny;

use super::*;
use crate::catalog::{AuthorDetails, AuthorKey, AuthorRef, Description, WorkDetails};
use crate::testing::{StubCatalog, search_doc};

fn store() -> Arc<MetadataStore> {
    Arc::new(MetadataStore::open_in_memory().expect("in-memory store"))
}

#[test]
fn book_id_prefers_work_key_then_isbn_then_title() {
    let isbns = vec!["9780553293357".to_string()];
    assert_eq!(
        derive_book_id(Some("/works/OL1W"), &isbns, "Foundation"),
        ("/works/OL1W".to_string(), IdSource::WorkKey)
    );
    assert_eq!(
        derive_book_id(Some("  "), &isbns, "Foundation"),
        ("9780553293357".to_string(), IdSource::Isbn)
    );
    assert_eq!(
        derive_book_id(None, &[], "Foundation"),
        ("Foundation".to_string(), IdSource::Title)
    );
}

#[test]
fn isbn_normalization_strips_separators() {
    assert_eq!(normalize_isbn("0-8044-2957-x"), "080442957X");
    assert_eq!(normalize_isbn(" 978 0 553 29335 7 "), "9780553293357");
}

#[test]
fn isbn_ingest_enriches_from_work_details() {
    let mut catalog = StubCatalog::default();
    let mut doc = search_doc(Some("/works/OL46125W"), "Foundation", &["Isaac Asimov"], &["9780553293357"]);
    doc.cover_i = Some(12);
    catalog.by_isbn.insert("9780553293357".to_string(), doc);
    catalog.works.insert(
        "/works/OL46125W".to_string(),
        WorkDetails {
            title: Some("Foundation".to_string()),
            description: Some(Description::Structured {
                value: Some("Psychohistory predicts the fall.".to_string()),
            }),
            subjects: vec!["science fiction".to_string(), "galactic empire".to_string()],
            ..Default::default()
        },
    );

    let store = store();
    let ingester = MetadataIngester::new(Arc::clone(&store), catalog);
    let book_id = ingester
        .ingest_by_isbn("978-0-553-29335-7")
        .expect("ingest should succeed")
        .expect("isbn should match");
    assert_eq!(book_id, "/works/OL46125W");

    let book = store.get_book(&book_id).expect("query").expect("stored");
    assert_eq!(book.authors, vec!["Isaac Asimov".to_string()]);
    assert_eq!(book.description.as_deref(), Some("Psychohistory predicts the fall."));
    assert_eq!(book.subjects.len(), 2);
    assert_eq!(book.cover_id, Some(12));
    assert_eq!(book.isbns, vec!["9780553293357".to_string()]);
}

#[test]
fn missing_isbn_match_is_absent() {
    let ingester = MetadataIngester::new(store(), StubCatalog::default());
    assert_eq!(ingester.ingest_by_isbn("0-123").expect("lookup ok"), None);
}

#[test]
fn catalog_failure_propagates_as_error() {
    let catalog = StubCatalog {
        fail_search: true,
        ..Default::default()
    };
    let ingester = MetadataIngester::new(store(), catalog);
    let err = ingester
        .ingest_by_title("Foundation", None)
        .expect_err("search failure should surface");
    assert!(matches!(err, IngestError::Catalog(_)));
}

#[test]
fn title_ingest_without_keys_uses_title_identity() {
    let mut catalog = StubCatalog::default();
    catalog.by_title.insert(
        "Piranesi".to_string(),
        search_doc(None, "Piranesi", &["Susanna Clarke"], &[]),
    );

    let store = store();
    let ingester = MetadataIngester::new(Arc::clone(&store), catalog);
    let first = ingester
        .ingest_by_title("Piranesi", Some("Susanna Clarke"))
        .expect("ingest")
        .expect("match");
    let second = ingester
        .ingest_by_title("Piranesi", Some("Susanna Clarke"))
        .expect("ingest")
        .expect("match");

    assert_eq!(first, "Piranesi");
    assert_eq!(first, second);
    assert_eq!(store.counts().expect("counts").books, 1);
}

#[test]
fn subjects_are_capped() {
    let mut catalog = StubCatalog::default();
    let mut doc = search_doc(None, "Encyclopedia", &["Many"], &["1111111111"]);
    doc.subject = (0..80).map(|index| format!("subject {index}")).collect();
    catalog.by_isbn.insert("1111111111".to_string(), doc);

    let store = store();
    let ingester = MetadataIngester::new(Arc::clone(&store), catalog);
    let book_id = ingester
        .ingest_by_isbn("1111111111")
        .expect("ingest")
        .expect("match");

    let book = store.get_book(&book_id).expect("query").expect("stored");
    assert_eq!(book.subjects.len(), MAX_SUBJECTS);
}

#[test]
fn work_key_ingest_follows_author_references_once() {
    let mut catalog = StubCatalog::default();
    catalog.works.insert(
        "/works/OL27448W".to_string(),
        WorkDetails {
            title: Some("The Left Hand of Darkness".to_string()),
            description: Some(Description::Text("Gethen, a world of winter.".to_string())),
            subjects: vec!["gender".to_string()],
            authors: vec![
                AuthorRef::Nested {
                    author: AuthorKey {
                        key: "/authors/OL31353A".to_string(),
                    },
                },
                AuthorRef::Direct(AuthorKey {
                    key: "/authors/OL0A".to_string(),
                }),
                AuthorRef::Direct(AuthorKey {
                    key: "/authors/MISSING".to_string(),
                }),
                AuthorRef::Other(IgnoredAny),
            ],
            covers: vec![55, 56],
        },
    );
    catalog.authors.insert(
        "/authors/OL31353A".to_string(),
        AuthorDetails {
            name: Some("Ursula K. Le Guin".to_string()),
        },
    );
    catalog
        .authors
        .insert("/authors/OL0A".to_string(), AuthorDetails { name: None });

    let store = store();
    let ingester = MetadataIngester::new(Arc::clone(&store), catalog);
    let book_id = ingester
        .ingest_by_work_key("OL27448W")
        .expect("ingest")
        .expect("key resolves");
    assert_eq!(book_id, "/works/OL27448W");

    let book = store.get_book(&book_id).expect("query").expect("stored");
    assert_eq!(
        book.authors,
        vec!["Ursula K. Le Guin".to_string(), "Unknown".to_string()]
    );
    assert_eq!(book.cover_id, Some(55));
    assert_eq!(book.work_key.as_deref(), Some("/works/OL27448W"));
}

#[test]
fn unresolved_work_key_is_absent() {
    let ingester = MetadataIngester::new(store(), StubCatalog::default());
    assert_eq!(ingester.ingest_by_work_key("OL404W").expect("lookup ok"), None);
}
