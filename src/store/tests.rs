use super::*;

fn draft(id: &str, title: &str, description: Option<&str>, subjects: &[&str]) -> BookDraft {
    BookDraft {
        id: id.to_string(),
        title: title.to_string(),
        authors: vec!["Ursula K. Le Guin".to_string()],
        description: description.map(str::to_string),
        subjects: subjects.iter().map(|value| value.to_string()).collect(),
        isbns: vec!["9780441478125".to_string()],
        cover_id: Some(7),
        work_key: Some(id.to_string()),
    }
}

fn store() -> MetadataStore {
    MetadataStore::open_in_memory().expect("in-memory store should open")
}

#[test]
fn upsert_book_round_trips_lists_and_hash() {
    let store = store();
    let stored = store
        .upsert_book(&draft("/works/OL1W", "The Dispossessed", Some("Anarres"), &["utopia"]))
        .expect("upsert should succeed");

    let loaded = store
        .get_book("/works/OL1W")
        .expect("query should succeed")
        .expect("book should exist");
    assert_eq!(loaded, stored);
    assert_eq!(loaded.subjects, vec!["utopia".to_string()]);
    assert_eq!(
        loaded.content_hash,
        content_fingerprint(Some("Anarres"), &["utopia".to_string()])
    );
}

#[test]
fn upsert_book_twice_keeps_single_row() {
    let store = store();
    let book = draft("/works/OL1W", "The Dispossessed", Some("Anarres"), &["utopia"]);
    store.upsert_book(&book).expect("first upsert");
    store.upsert_book(&book).expect("second upsert");

    assert_eq!(store.counts().expect("counts").books, 1);
}

#[test]
fn list_books_sorts_by_title() {
    let store = store();
    store
        .upsert_book(&draft("b", "Lathe of Heaven", None, &[]))
        .expect("upsert");
    store
        .upsert_book(&draft("a", "Tehanu", None, &[]))
        .expect("upsert");
    store
        .upsert_book(&draft("c", "A Wizard of Earthsea", None, &[]))
        .expect("upsert");

    let titles = store
        .list_books()
        .expect("list")
        .into_iter()
        .map(|book| book.title)
        .collect::<Vec<String>>();
    assert_eq!(titles, vec!["A Wizard of Earthsea", "Lathe of Heaven", "Tehanu"]);
}

#[test]
fn get_book_returns_none_for_unknown_id() {
    assert!(store().get_book("missing").expect("query").is_none());
}

#[test]
fn embedding_for_unknown_book_is_refused() {
    let err = store()
        .upsert_embedding("ghost", &[1.0, 0.0], "nomic", "hash")
        .expect_err("orphan embeddings are not allowed");
    assert!(matches!(err, StoreError::BookNotFound(id) if id == "ghost"));
}

#[test]
fn embedding_round_trips_exactly() {
    let store = store();
    let book = store
        .upsert_book(&draft("a", "Tehanu", Some("Gont"), &[]))
        .expect("upsert");
    let vector = (0..1024)
        .map(|index| (index as f32).cos() / 3.0)
        .collect::<Vec<f32>>();

    store
        .upsert_embedding("a", &vector, "nomic", &book.content_hash)
        .expect("embedding upsert");

    assert_eq!(store.get_embedding("a").expect("query"), Some(vector.clone()));
    assert_eq!(
        store.list_embeddings().expect("list"),
        vec![("a".to_string(), vector)]
    );
}

#[test]
fn stale_detection_follows_model_and_content() {
    let store = store();
    let book = store
        .upsert_book(&draft("a", "Tehanu", Some("Gont"), &["dragons"]))
        .expect("upsert");

    let stale_ids = |model: &str| {
        store
            .find_stale_books(model)
            .expect("stale query")
            .into_iter()
            .map(|book| book.id)
            .collect::<Vec<String>>()
    };

    assert_eq!(stale_ids("nomic"), vec!["a"]);

    store
        .upsert_embedding("a", &[0.5, 0.5], "nomic", &book.content_hash)
        .expect("embedding upsert");
    assert!(stale_ids("nomic").is_empty());
    assert_eq!(stale_ids("mxbai"), vec!["a"]);

    store
        .upsert_book(&draft("a", "Tehanu", Some("Gont, years later"), &["dragons"]))
        .expect("re-upsert with new description");
    assert_eq!(stale_ids("nomic"), vec!["a"]);
}

#[test]
fn subject_reordering_does_not_make_book_stale() {
    let store = store();
    let book = store
        .upsert_book(&draft("a", "Tehanu", None, &["dragons", "magic"]))
        .expect("upsert");
    store
        .upsert_embedding("a", &[1.0], "nomic", &book.content_hash)
        .expect("embedding upsert");

    store
        .upsert_book(&draft("a", "Tehanu", None, &["magic", "dragons"]))
        .expect("re-upsert");
    assert!(store.find_stale_books("nomic").expect("stale query").is_empty());
}

#[test]
fn fresh_embeddings_exclude_outdated_rows() {
    let store = store();
    let first = store
        .upsert_book(&draft("a", "Tehanu", Some("one"), &[]))
        .expect("upsert");
    let second = store
        .upsert_book(&draft("b", "Tales", Some("two"), &[]))
        .expect("upsert");
    store
        .upsert_embedding("a", &[1.0, 0.0], "nomic", &first.content_hash)
        .expect("embedding");
    store
        .upsert_embedding("b", &[0.0, 1.0], "other-model", &second.content_hash)
        .expect("embedding");

    let fresh = store.list_fresh_embeddings("nomic").expect("fresh");
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].book_id, "a");
    assert_eq!(fresh[0].content_hash, first.content_hash);
}

#[test]
fn delete_book_removes_embedding_and_reports_existence() {
    let store = store();
    let book = store
        .upsert_book(&draft("a", "Tehanu", None, &[]))
        .expect("upsert");
    store
        .upsert_embedding("a", &[1.0], "nomic", &book.content_hash)
        .expect("embedding");

    assert!(store.delete_book("a").expect("delete"));
    assert!(store.get_book("a").expect("query").is_none());
    assert!(store.get_embedding("a").expect("query").is_none());
    assert!(!store.delete_book("a").expect("second delete"));
}

#[test]
fn freshness_marker_is_single_row() {
    let store = store();
    assert_eq!(store.freshness_marker().expect("marker"), None);

    store.set_freshness_marker("first").expect("set");
    store.set_freshness_marker("second").expect("set");
    assert_eq!(
        store.freshness_marker().expect("marker"),
        Some("second".to_string())
    );
}

#[test]
fn corrupt_blob_is_reported_for_that_book() {
    let store = store();
    store
        .upsert_book(&draft("a", "Tehanu", None, &[]))
        .expect("upsert");
    {
        let connection = store.lock().expect("lock");
        connection
            .execute(
                "INSERT INTO embeddings(book_id, embedding, embedding_dim, model_id, content_hash, generated_at)
                 VALUES('a', x'000102', 1, 'nomic', 'h', 'now')",
                [],
            )
            .expect("raw insert");
    }

    let err = store.get_embedding("a").expect_err("blob is three bytes");
    assert!(matches!(err, StoreError::CorruptEmbedding { book_id } if book_id == "a"));
}

#[test]
fn feedback_is_appended_in_order() {
    let store = store();
    store
        .append_feedback("a", Rating::Up, &["x".to_string()], None)
        .expect("feedback");
    store
        .append_feedback("a", Rating::Down, &[], Some("cozy mysteries"))
        .expect("feedback");

    let records = store.list_feedback().expect("list");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].rating, Rating::Up);
    assert_eq!(records[0].source_book_ids, vec!["x".to_string()]);
    assert_eq!(records[1].rating, Rating::Down);
    assert_eq!(records[1].source_prompt.as_deref(), Some("cozy mysteries"));
    assert_eq!(store.counts().expect("counts").feedback, 2);
}

#[test]
fn open_creates_parent_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("nested").join("books.sqlite");
    let store = MetadataStore::open(&db_path).expect("open on disk");
    store
        .upsert_book(&draft("a", "Tehanu", None, &[]))
        .expect("upsert");
    drop(store);

    let reopened = MetadataStore::open(&db_path).expect("reopen");
    assert!(reopened.get_book("a").expect("query").is_some());
}

#[test]
fn open_rejects_unknown_schema_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("books.sqlite");
    drop(MetadataStore::open(&db_path).expect("first open"));

    let connection = Connection::open(&db_path).expect("raw connection");
    let recorded: String = connection
        .query_row("SELECT value FROM metadata WHERE key = 'schema_version'", [], |row| row.get(0))
        .expect("schema version row");
    assert_eq!(recorded, STORE_SCHEMA_VERSION);
    connection
        .execute("UPDATE metadata SET value = '0.1.0' WHERE key = 'schema_version'", [])
        .expect("downgrade version");
    drop(connection);

    match MetadataStore::open(&db_path) {
        Err(StoreError::SchemaVersion { found }) => assert_eq!(found, "0.1.0"),
        other => panic!("expected schema version error, got {:?}", other.map(|_| ())),
    }
}
