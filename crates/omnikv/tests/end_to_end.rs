//! End-to-end scenarios over the public facade.

use omnikv::{
    Arena, Database, Edge, ErrorKind, Fields, GraphOptions, Key, Options, PlacesArg, Role,
    Strided, TEST_PATH_ENV_VAR,
};

#[test]
fn single_write_read() {
    let db = Database::open_in_memory().expect("open");
    let main = db.main();
    main.set(Key::new(42), b"hey").expect("write");

    let value = main.get(Key::new(42)).expect("read").expect("present");
    assert_eq!(value.len(), 3);
    assert_eq!(value, b"hey");

    assert_eq!(main.get(Key::new(43)).expect("read"), None);
    assert_eq!(main.len_of(Key::new(43)).expect("measure"), None);
}

#[test]
fn batched_write_then_scan() {
    let db = Database::open_in_memory().expect("open");
    let main = db.main();
    main.set_many(&[
        (Key::new(1), b"a".as_slice()),
        (Key::new(2), b"bb".as_slice()),
        (Key::new(3), b"ccc".as_slice()),
    ])
    .expect("batched write");

    let keys = main.keys(Key::new(0), 10).expect("scan");
    assert_eq!(keys, vec![Key::new(1), Key::new(2), Key::new(3)]);

    let sizes = main.measure_many(&keys).expect("measure");
    let lengths: Vec<u32> = sizes.iter().map(|len| len.get()).collect();
    assert_eq!(lengths, vec![1, 2, 3]);
}

#[test]
fn transaction_conflict_and_retry() {
    let db = Database::open_in_memory().expect("open");
    let collection = db.main().id();

    let mut t1 = db.transact().expect("begin t1");
    let mut t2 = db.transact().expect("begin t2");

    t1.set(collection, Key::new(7), b"x").expect("t1 write");
    let s1 = t1.sequenced_commit().expect("t1 commit");

    // T2's snapshot predates T1's commit.
    assert_eq!(t2.get(collection, Key::new(7)).expect("t2 read"), None);
    t2.set(collection, Key::new(7), b"y").expect("t2 write");
    let err = t2.sequenced_commit().expect_err("t2 conflicts");
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Retry after reset observes T1's write and lands after it.
    t2.reset().expect("reset");
    assert_eq!(
        t2.get(collection, Key::new(7)).expect("t2 reread"),
        Some(b"x".to_vec())
    );
    t2.set(collection, Key::new(7), b"y").expect("t2 rewrite");
    let s2 = t2.sequenced_commit().expect("t2 retry commit");
    assert!(s2 > s1);
    assert_eq!(db.main().get(Key::new(7)).expect("read"), Some(b"y".to_vec()));
}

#[test]
fn graph_symmetry_scenario() {
    let db = Database::open_in_memory().expect("open");
    let graph = db
        .graph("net", GraphOptions {
            directed: true,
            multi: false,
            loops: false,
        })
        .expect("open graph");

    graph
        .upsert_edge(Edge::new(Key::new(1), Key::new(2), Key::new(100)))
        .expect("add edge");

    let adj1 = graph.adjacency(Key::new(1)).expect("adjacency of 1");
    assert!(adj1
        .iter()
        .any(|e| e.neighbor == Key::new(2) && e.edge == Key::new(100) && e.role == Role::SOURCE));

    let adj2 = graph.adjacency(Key::new(2)).expect("adjacency of 2");
    assert!(adj2
        .iter()
        .any(|e| e.neighbor == Key::new(1) && e.edge == Key::new(100) && e.role == Role::TARGET));

    graph
        .remove_edge(Edge::new(Key::new(1), Key::new(2), Key::new(100)))
        .expect("remove edge");
    assert!(graph.adjacency(Key::new(1)).expect("adjacency").is_empty());
    assert!(graph.adjacency(Key::new(2)).expect("adjacency").is_empty());
}

#[test]
fn empty_value_is_distinguishable_from_missing() {
    let db = Database::open_in_memory().expect("open");
    let main = db.main();
    main.set(Key::new(1), b"").expect("write empty");

    assert_eq!(main.get(Key::new(1)).expect("read"), Some(Vec::new()));
    assert_eq!(main.len_of(Key::new(1)).expect("measure"), Some(0));
    assert_eq!(main.get(Key::new(2)).expect("read"), None);
    assert_eq!(main.len_of(Key::new(2)).expect("measure"), None);
}

#[test]
fn zero_count_batches_succeed() {
    let db = Database::open_in_memory().expect("open");
    let main = db.main();
    assert!(main.get_many(&[]).expect("empty read").is_empty());
    main.set_many(&[]).expect("empty write");
    assert!(main.items().expect("items").is_empty());
}

#[test]
fn broadcast_collection_over_large_batch() {
    let db = Database::open_in_memory().expect("open");
    let collection = db.collection("bulk").expect("open collection");
    let values: Vec<(Key, Vec<u8>)> = (0..1000)
        .map(|i| (Key::new(i), i.to_le_bytes().to_vec()))
        .collect();
    let borrowed: Vec<(Key, &[u8])> = values.iter().map(|(k, v)| (*k, v.as_slice())).collect();
    collection.set_many(&borrowed).expect("write");

    // One broadcast collection element serves all 1000 places.
    let keys: Vec<Key> = (0..1000).map(Key::new).collect();
    let id = collection.id();
    let places = PlacesArg {
        collections: Strided::Single(&id),
        keys: Strided::Slice(&keys),
        fields: Fields::None,
        count: 1000,
    };
    let mut arena = Arena::new();
    let view = db
        .engine()
        .read(None, &places, Options::NONE, &mut arena)
        .expect("read");
    assert_eq!(view.len(), 1000);
    for (i, (_, expected)) in values.iter().enumerate() {
        assert_eq!(view.value(i), Some(expected.as_slice()));
    }
}

#[test]
fn unbounded_scans_are_rejected() {
    let db = Database::open_in_memory().expect("open");
    let id = db.main().id();
    let scans = omnikv::ScansArg {
        collections: Strided::Single(&id),
        min_keys: Strided::None,
        limits: Strided::None,
        count: 1,
    };
    let mut arena = Arena::new();
    let err = db
        .engine()
        .scan(None, &scans, Options::NONE, &mut arena)
        .expect_err("unbounded scan");
    assert_eq!(err.kind(), ErrorKind::ArgsWrong);
}

#[test]
fn persistent_engines_recover_committed_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = format!(
        r#"{{"version": "1.0", "directory": "{}", "engine": "lsm"}}"#,
        dir.path().display()
    );
    {
        let db = Database::open(&config).expect("open");
        db.main().set(Key::new(5), b"durable").expect("write");
    }
    {
        let db = Database::open(&config).expect("reopen");
        assert_eq!(
            db.main().get(Key::new(5)).expect("read"),
            Some(b"durable".to_vec())
        );
    }
}

#[test]
fn env_var_overrides_the_configured_directory() {
    let real = tempfile::tempdir().expect("tempdir");
    let decoy = tempfile::tempdir().expect("decoy dir");
    std::env::set_var(TEST_PATH_ENV_VAR, real.path());
    let config = format!(
        r#"{{"version": "1.0", "directory": "{}", "engine": "lsm"}}"#,
        decoy.path().display()
    );
    let opened = Database::open(&config);
    std::env::remove_var(TEST_PATH_ENV_VAR);

    let db = opened.expect("open");
    db.main().set(Key::new(1), b"v").expect("write");
    // The decoy directory stays untouched; fjall wrote into the override.
    let decoy_entries = std::fs::read_dir(decoy.path()).expect("read decoy").count();
    assert_eq!(decoy_entries, 0);
}

#[test]
fn weak_snapshot_batches_commit_without_validation() {
    let db = Database::open_in_memory().expect("open");
    let collection = db.main().id();

    let mut weak = db
        .transact_with(Options::TRANSACTION_DONT_WATCH)
        .expect("begin weak");
    let _ = weak.get(collection, Key::new(1)).expect("unwatched read");

    db.main().set(Key::new(1), b"racer").expect("interleaved write");

    weak.set(collection, Key::new(1), b"weak").expect("weak write");
    weak.sequenced_commit().expect("no conflict for weak batches");
    assert_eq!(db.main().get(Key::new(1)).expect("read"), Some(b"weak".to_vec()));
}
