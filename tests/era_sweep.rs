use idstore::IdentityStore;
use tempfile::tempdir;

fn check_get_external(store: &IdentityStore, internal_id: &str, expected: Option<&str>) {
    let actual = store.get_external(internal_id).expect("get_external");
    assert_eq!(actual.as_deref(), expected, "external for '{internal_id}'");
}

#[test]
fn bump_era_advances_the_store_era() {
    let dir = tempdir().expect("temp");
    let store = IdentityStore::open(dir.path().join("identity.db")).expect("open");

    assert_eq!(store.read_era().expect("read era"), 0);
    store.bump_era().expect("bump");
    assert_eq!(store.read_era().expect("read era"), 1);
    store.bump_era().expect("bump");
    assert_eq!(store.read_era().expect("read era"), 2);
}

#[test]
fn reads_refresh_the_era_of_the_touched_mapping() {
    let dir = tempdir().expect("temp");
    let store = IdentityStore::open(dir.path().join("identity.db")).expect("open");

    store.associate("a:i1", "e1").expect("associate");
    store.associate("a:i2", "e2").expect("associate");

    let mappings = store.search("a:").expect("search");
    assert_eq!(mappings.len(), 2);
    assert_eq!(mappings[0].era, 0);
    assert_eq!(mappings[1].era, 0);

    store.bump_era().expect("bump");
    check_get_external(&store, "a:i1", Some("e1"));

    let mappings = store.search("a:").expect("search");
    assert_eq!(mappings.len(), 2);
    assert_eq!(mappings[0].internal_id, "a:i1");
    assert_eq!(mappings[0].era, 1);
    assert_eq!(mappings[1].internal_id, "a:i2");
    assert_eq!(mappings[1].era, 0);
}

#[test]
fn reassociating_the_same_pair_refreshes_the_era() {
    let dir = tempdir().expect("temp");
    let store = IdentityStore::open(dir.path().join("identity.db")).expect("open");

    store.associate("a:i1", "e1").expect("associate");
    store.bump_era().expect("bump");
    store.associate("a:i1", "e1").expect("re-associate");

    let mappings = store.search("a:").expect("search");
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].era, 1);
    assert!(store.garbage("").expect("garbage").is_empty());
}

#[test]
fn tuple_eras_never_exceed_the_store_era() {
    let dir = tempdir().expect("temp");
    let store = IdentityStore::open(dir.path().join("identity.db")).expect("open");

    store.associate("a:i1", "e1").expect("associate");
    store.bump_era().expect("bump");
    store.associate("a:i2", "e2").expect("associate");
    check_get_external(&store, "a:i1", Some("e1"));

    let era = store.read_era().expect("read era");
    for tuple in store.search("").expect("search") {
        assert!(tuple.era <= era, "tuple {tuple:?} ahead of store era {era}");
    }
}

#[test]
fn sweep_moves_stale_tuples_to_garbage() {
    let dir = tempdir().expect("temp");
    let store = IdentityStore::open(dir.path().join("identity.db")).expect("open");

    store.associate("a:i1", "e1").expect("associate");
    store.associate("a:i2", "e2").expect("associate");
    store.associate("a:i3", "e3").expect("associate");

    store.bump_era().expect("bump");

    check_get_external(&store, "a:i1", Some("e1"));
    check_get_external(&store, "a:i2", Some("e2"));
    store.remove_internal("a:i2").expect("remove");

    store.sweep("a:").expect("sweep");

    let garbage = store.garbage("").expect("garbage");
    assert_eq!(garbage.len(), 2);

    // Touched after the bump, then explicitly removed.
    assert_eq!(garbage[0].external_id, "e2");
    assert_eq!(garbage[0].era, 1);

    // Never touched after the bump.
    assert_eq!(garbage[1].external_id, "e3");
    assert_eq!(garbage[1].era, 0);
}

#[test]
fn sweep_marks_without_deleting_live_indices() {
    let dir = tempdir().expect("temp");
    let store = IdentityStore::open(dir.path().join("identity.db")).expect("open");

    store.associate("a:i1", "e1").expect("associate");
    store.bump_era().expect("bump");
    store.sweep("a:").expect("sweep");

    assert_eq!(store.garbage("").expect("garbage").len(), 1);
    // The forward and reverse entries survive the sweep.
    assert_eq!(store.search("a:").expect("search").len(), 1);
    assert_eq!(
        store.get_internal("e1").expect("get_internal").as_deref(),
        Some("a:i1")
    );
}

#[test]
fn associating_a_swept_pair_resurrects_it_from_garbage() {
    let dir = tempdir().expect("temp");
    let store = IdentityStore::open(dir.path().join("identity.db")).expect("open");

    store.associate("a:i1", "e1").expect("associate");
    store.bump_era().expect("bump");
    store.sweep("a:").expect("sweep");
    assert_eq!(store.garbage("").expect("garbage").len(), 1);

    store.associate("a:i1", "e1").expect("re-associate");

    assert!(store.garbage("").expect("garbage").is_empty());
    let mappings = store.search("a:").expect("search");
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].era, 1);
}

#[test]
fn sweep_follows_reference_edges() {
    let dir = tempdir().expect("temp");
    let store = IdentityStore::open(dir.path().join("identity.db")).expect("open");

    store.associate("a:i1", "e1").expect("associate");
    store.associate("a:i2", "e2").expect("associate");
    store.add_reference("a:i3", "b:").expect("add reference");
    store.associate("b:i1", "e3").expect("associate");
    store.associate("b:i2", "e4").expect("associate");

    store.bump_era().expect("bump");

    check_get_external(&store, "a:i1", Some("e1"));
    check_get_external(&store, "b:i1", Some("e3"));

    store.sweep("a:").expect("sweep");

    let garbage = store.garbage("a:").expect("garbage");
    assert_eq!(garbage.len(), 2);
    assert_eq!(garbage[0].internal_id, "a:i2");
    assert_eq!(garbage[0].external_id, "e2");
    assert_eq!(garbage[1].internal_id, "b:i2");
    assert_eq!(garbage[1].external_id, "e4");
}

#[test]
fn purge_reclaims_swept_mappings() {
    let dir = tempdir().expect("temp");
    let store = IdentityStore::open(dir.path().join("identity.db")).expect("open");

    store.associate("a:i1", "e1").expect("associate");
    store.associate("a:i2", "e2").expect("associate");
    store.associate("a:i3", "e3").expect("associate");

    store.bump_era().expect("bump");

    check_get_external(&store, "a:i1", Some("e1"));
    check_get_external(&store, "a:i2", Some("e2"));
    store.remove_internal("a:i2").expect("remove");

    store.sweep("a:").expect("sweep");

    store.purge_external("e1").expect("purge external");
    store.purge_internal("a:i2").expect("purge internal");

    check_get_external(&store, "a:i1", None);
    check_get_external(&store, "a:i2", None);

    let garbage = store.garbage("").expect("garbage");
    assert_eq!(garbage.len(), 1);
    assert_eq!(garbage[0].external_id, "e3");
}

#[test]
fn duplicate_reference_adds_only_refresh_the_edge() {
    let dir = tempdir().expect("temp");
    let store = IdentityStore::open(dir.path().join("identity.db")).expect("open");

    store.associate("a:i1", "e1").expect("associate");
    store.associate("b:i1", "e2").expect("associate");
    store.add_reference("a:i2", "b:").expect("add reference");

    store.bump_era().expect("bump");

    // Re-adding stamps the edge with the current era, which hides it from
    // this era's garbage collection.
    store.add_reference("a:i2", "b:").expect("re-add reference");
    store.sweep("a:").expect("sweep");

    let garbage = store.garbage("").expect("garbage");
    assert_eq!(garbage.len(), 1);
    assert_eq!(garbage[0].internal_id, "a:i1");
}

#[test]
fn purge_references_detaches_downstream_namespaces() {
    let dir = tempdir().expect("temp");
    let store = IdentityStore::open(dir.path().join("identity.db")).expect("open");

    store.associate("a:i1", "e1").expect("associate");
    store.associate("b:i1", "e2").expect("associate");
    store.add_reference("a:i2", "b:").expect("add reference");

    store.bump_era().expect("bump");
    store.purge_references("a:").expect("purge references");
    store.sweep("a:").expect("sweep");

    // Without the edge the sweep no longer crosses into b:.
    let garbage = store.garbage("").expect("garbage");
    assert_eq!(garbage.len(), 1);
    assert_eq!(garbage[0].internal_id, "a:i1");

    // And b:'s own mapping is still live.
    check_get_external(&store, "b:i1", Some("e2"));
}
