use tempfile::tempdir;
use vram_widget::position::{JsonFileStore, KeyValueStore, Position, PositionStore};

#[test]
fn position_survives_new_store_instance() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("storage.json");

    let positions = PositionStore::new(JsonFileStore::new(&path), "vram-widget.position");
    assert_eq!(positions.load(), None);
    positions.save(Position::new(120.0, 64.0));

    let reopened = PositionStore::new(JsonFileStore::new(&path), "vram-widget.position");
    assert_eq!(reopened.load(), Some(Position::new(120.0, 64.0)));

    reopened.clear();
    assert_eq!(positions.load(), None);
}

#[test]
fn other_keys_are_preserved() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("storage.json"));
    store.set("theme", "dark").unwrap();
    let positions = PositionStore::new(store.clone(), "pos");
    positions.save(Position::new(1.0, 2.0));
    positions.clear();
    assert_eq!(store.get("theme").unwrap().as_deref(), Some("dark"));
}

#[test]
fn corrupt_file_reads_as_absent_and_is_replaced() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("storage.json");
    std::fs::write(&path, "garbage").unwrap();
    let store = JsonFileStore::new(&path);
    assert!(store.get("pos").is_err());

    let positions = PositionStore::new(store.clone(), "pos");
    assert_eq!(positions.load(), None);
    positions.save(Position::new(3.0, 4.0));
    assert_eq!(positions.load(), Some(Position::new(3.0, 4.0)));
}
