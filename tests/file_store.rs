use std::time::Duration;
use survey_desk::{
    config::Config,
    model::{Report, ReportStatus, ReportType},
    persistence::{FileStore, KeyValueStore, Persistence, METADATA_INDEX_KEY},
    photos::PhotoPool,
    placement::{DragEvent, Placement},
    store::ReportStore,
    templates::TemplateCatalog,
};
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> ReportStore<FileStore> {
    let backend = FileStore::open(&dir.path().join("data")).unwrap();
    ReportStore::new(
        Persistence::new(backend),
        Box::new(TemplateCatalog::builtin().unwrap()),
        Duration::from_millis(2000),
    )
    .unwrap()
}

fn write_image(dir: &TempDir, name: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"\xff\xd8\xff").unwrap();
    path
}

#[test]
fn file_store_round_trips_values() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.get("report-data-x").unwrap(), None);

    store.set("report-data-x", "{\"a\":1}").unwrap();
    store.set("report-data-x", "{\"a\":2}").unwrap();
    assert_eq!(store.get("report-data-x").unwrap().as_deref(), Some("{\"a\":2}"));

    store.remove("report-data-x").unwrap();
    store.remove("report-data-x").unwrap();
    assert_eq!(store.get("report-data-x").unwrap(), None);
}

#[test]
fn reports_survive_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut report = Report::new("r-1", ReportType::Level2, "2024-02-02");
    report.client_name = "C. Lient".into();
    {
        let mut p = Persistence::new(FileStore::open(dir.path()).unwrap());
        p.save(&report, 1_700_000_000_000).unwrap();
        p.set_status("r-1", ReportStatus::Complete).unwrap();
    }

    let p = Persistence::new(FileStore::open(dir.path()).unwrap());
    let loaded = p.load("r-1").unwrap().unwrap();
    assert_eq!(loaded.client_name, "C. Lient");
    assert_eq!(loaded.status, ReportStatus::Complete);
    let list = p.list().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].last_modified, 1_700_000_000_000);
    assert_eq!(list[0].property_address, "No Address");
}

#[test]
fn unreadable_index_lists_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = FileStore::open(dir.path()).unwrap();
    backend.set(METADATA_INDEX_KEY, "not json").unwrap();
    let p = Persistence::new(backend);
    assert!(p.list().unwrap().is_empty());
}

#[test]
fn import_accepts_only_images() {
    let dir = tempfile::tempdir().unwrap();
    let jpg = write_image(&dir, "front.JPG");
    let txt = dir.path().join("notes.txt");
    std::fs::write(&txt, b"hello").unwrap();

    let mut pool = PhotoPool::new();
    let added = pool.import_files(&Config::default(), &[&jpg, &txt]);
    assert_eq!(added.len(), 1);
    assert!(added[0].url.starts_with("file://"));
    assert!(added[0].url.ends_with("front.JPG"));
    assert_eq!(pool.len(), 1);

    let mut cfg = Config::default();
    cfg.photos.max_file_bytes = 1;
    assert!(pool.import_files(&cfg, &[&jpg]).is_empty());

    let id = added[0].id.clone();
    assert!(pool.remove(&id).is_some());
    assert!(pool.is_empty());
}

#[test]
fn missing_file_is_skipped_and_the_rest_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_image(&dir, "side.png");
    let missing = dir.path().join("gone.jpg");

    let mut store = open_store(&dir);
    let added = store
        .import_photos(&Config::default(), &[missing, good])
        .unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(store.pool().len(), 1);

    let stored = store.persistence().load_pool().unwrap();
    assert_eq!(stored, *store.pool());
}

#[test]
fn photo_library_survives_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let front = write_image(&dir, "front.jpg");
    let rear = write_image(&dir, "rear.jpg");

    let (front_id, rear_id) = {
        let mut store = open_store(&dir);
        let added = store
            .import_photos(&Config::default(), &[front, rear])
            .unwrap();
        (added[0].id.clone(), added[1].id.clone())
    };

    let mut store = open_store(&dir);
    assert_eq!(store.pool().len(), 2);
    assert!(store.pool().find(&front_id).is_some());

    let report_id = store.create_report(ReportType::Level3).id.clone();
    let placement = store
        .apply_drag(&DragEvent::new(front_id.as_str(), "G Grounds"))
        .unwrap();
    assert!(matches!(placement, Placement::Assign { .. }));
    store.remove_pool_photo(&rear_id).unwrap();
    store.remove_pool_photo(&front_id).unwrap();
    store.flush().unwrap();
    drop(store);

    let mut store = open_store(&dir);
    assert!(store.pool().is_empty());
    let report = store.load_report(&report_id).unwrap();
    assert_eq!(report.section("G Grounds").photos, vec![front_id.clone()]);
    assert!(report.photo(&front_id).unwrap().url.ends_with("front.jpg"));
}
