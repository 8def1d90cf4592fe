use reasoningbank_state::{
    BlobStore, Dtype, Item, MemStore, Polarity, StoreError, PREVIEW_CHARS,
};
use tempfile::tempdir;

fn seeded_store() -> MemStore {
    let mut store = MemStore::new();
    store.add(
        Item::new(
            "Use TYPE for class queries",
            "Query instances through rdf:type",
            "SELECT ?x WHERE { ?x a <http://www.w3.org/ns/prov#Activity> }",
            Polarity::Success,
        )
        .with_tags(["prov", "class"]),
    );
    store.add(Item::new(
        "Avoid SELECT star",
        "Project only the variables you need",
        "SELECT * on a large graph floods the context window.",
        Polarity::Failure,
    ));
    store.add(Item::new(
        "Check the ontology namespace first",
        "Confirm prefixes before writing queries",
        "Look at the namespace list in the sense card before guessing IRIs.",
        Polarity::Seed,
    ));
    store
}

// ---- Handle opacity ----

#[test]
fn handle_never_carries_more_than_preview() {
    let store = BlobStore::new();
    let contents = vec![
        String::new(),
        "short".to_string(),
        "y".repeat(81),
        "z".repeat(10_000),
    ];
    for content in contents {
        let r = store.put(content.clone(), Dtype::Text);
        assert!(r.preview.chars().count() <= PREVIEW_CHARS);
        assert_eq!(r.size, content.chars().count());
        assert_eq!(store.get(&r.key).unwrap(), content);
    }
}

#[test]
fn unknown_handle_is_an_error() {
    let store = BlobStore::new();
    let err = store.get("graph_42").unwrap_err();
    assert!(matches!(err, StoreError::HandleNotFound { ref key } if key == "graph_42"));
}

// ---- Two-phase retrieval ----

#[test]
fn search_returns_previews_only() {
    let store = seeded_store();
    let hits = store.search("class queries", 5, Some(Polarity::Success));
    assert_eq!(hits.len(), 1);

    let json = serde_json::to_value(&hits[0]).unwrap();
    assert!(json.get("content").is_none());
    assert_eq!(json["src"], "success");
}

#[test]
fn failure_filter_never_leaks_other_polarities() {
    let store = seeded_store();
    for query in ["select", "class", "namespace", ""] {
        let hits = store.search(query, 10, Some(Polarity::Failure));
        assert!(hits
            .iter()
            .all(|h| h.source_polarity == Polarity::Failure));
    }
}

#[test]
fn get_over_cap_returns_nothing() {
    let store = seeded_store();
    let ids: Vec<String> = store.items().iter().map(|i| i.id.clone()).collect();
    assert_eq!(ids.len(), 3);
    assert!(matches!(
        store.get(&ids, 2),
        Err(StoreError::TooManyRequested { requested: 3, max: 2 })
    ));
    let items = store.get(&ids[..2], 2).unwrap();
    assert_eq!(items.len(), 2);
    assert!(!items[0].content.is_empty());
}

// ---- Persistence ----

#[test]
fn save_load_roundtrip_preserves_items() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("memory.json");

    let store = seeded_store();
    store.save(&path).unwrap();

    let restored = MemStore::load(&path).unwrap();
    assert_eq!(restored, store);
    for item in store.items() {
        assert!(restored.contains(&item.id));
    }
}

#[test]
fn snapshot_is_a_json_array_of_items() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("memory.json");
    seeded_store().save(&path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let arr = raw.as_array().unwrap();
    assert_eq!(arr.len(), 3);
    for key in ["id", "title", "desc", "content", "src", "tags"] {
        assert!(arr[0].get(key).is_some(), "missing field {key}");
    }
}

#[test]
fn seed_file_bootstraps_with_dedup() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seeds.json");
    seeded_store().save(&path).unwrap();

    let mut store = MemStore::new();
    let first = store.extend_from_path(&path, true).unwrap();
    assert_eq!(first.len(), 3);
    let second = store.extend_from_path(&path, true).unwrap();
    assert!(second.is_empty());
    assert_eq!(store.len(), 3);
}

#[test]
fn load_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let err = MemStore::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
}
