use std::time::{Duration, Instant};
use survey_desk::{
    autosave::{Debouncer, ManualClock, SaveStatus},
    model::ReportType,
    persistence::{report_key, MemoryStore, Persistence, METADATA_INDEX_KEY},
    store::{MetadataPatch, ReportStore, SectionPatch},
    templates::TemplateCatalog,
};

fn mk_store() -> (ReportStore<MemoryStore>, ManualClock) {
    let clock = ManualClock::new();
    let store = ReportStore::new(
        Persistence::new(MemoryStore::new()),
        Box::new(TemplateCatalog::builtin().unwrap()),
        Duration::from_millis(2000),
    )
    .unwrap()
    .with_clock(Box::new(clock.clone()));
    (store, clock)
}

fn writes(store: &ReportStore<MemoryStore>, id: &str) -> usize {
    store.persistence().backend().writes_for(&report_key(id))
}

#[test]
fn debouncer_rearms_on_schedule() {
    let mut d = Debouncer::new(Duration::from_millis(100));
    let start = Instant::now();
    d.schedule(start);
    d.schedule(start + Duration::from_millis(60));
    assert_eq!(d.deadline(), Some(start + Duration::from_millis(160)));
    assert!(!d.take_due(start + Duration::from_millis(120)));
    assert!(d.take_due(start + Duration::from_millis(160)));
    assert!(!d.take_due(start + Duration::from_millis(500)));
    assert!(!d.is_pending());
}

#[test]
fn burst_of_edits_writes_once() {
    let (mut store, clock) = mk_store();
    let id = store.create_report(ReportType::Level3).id.clone();

    for i in 0..10 {
        store
            .update_section(
                "B Overall opinion",
                SectionPatch {
                    content: Some(format!("draft {i}")),
                    ..Default::default()
                },
            )
            .unwrap();
        clock.advance(Duration::from_millis(500));
        assert!(!store.poll_autosave().unwrap());
    }
    assert_eq!(writes(&store, &id), 0);
    assert_eq!(store.save_status(), SaveStatus::Saving);

    clock.advance(Duration::from_millis(1500));
    assert!(store.poll_autosave().unwrap());
    assert_eq!(writes(&store, &id), 1);
    assert_eq!(store.save_status(), SaveStatus::Saved);

    let stored = store.persistence().load(&id).unwrap().unwrap();
    assert_eq!(stored.section("B Overall opinion").content, "draft 9");

    clock.advance(Duration::from_millis(10_000));
    assert!(!store.poll_autosave().unwrap());
    assert_eq!(writes(&store, &id), 1);
}

#[test]
fn loading_does_not_schedule_a_write() {
    let (mut store, clock) = mk_store();
    let id = store.create_report(ReportType::Level2).id.clone();
    store.flush().unwrap();
    assert_eq!(writes(&store, &id), 1);

    store.load_report(&id).unwrap();
    assert_eq!(store.save_status(), SaveStatus::Saved);
    clock.advance(Duration::from_millis(5000));
    assert!(!store.poll_autosave().unwrap());
    assert_eq!(writes(&store, &id), 1);
}

#[test]
fn flush_without_changes_is_a_no_op() {
    let (mut store, _clock) = mk_store();
    assert!(!store.flush().unwrap());
    let id = store.create_report(ReportType::Level3).id.clone();
    assert!(store.flush().unwrap());
    assert!(!store.flush().unwrap());
    assert_eq!(writes(&store, &id), 1);
    assert!(store.persistence().backend().contains(METADATA_INDEX_KEY));
}

#[test]
fn each_settled_edit_gets_its_own_write() {
    let (mut store, clock) = mk_store();
    let id = store.create_report(ReportType::Level3).id.clone();
    for name in ["A", "B", "C"] {
        store
            .update_metadata(MetadataPatch {
                client_name: Some(name.into()),
                ..Default::default()
            })
            .unwrap();
        clock.advance(Duration::from_millis(2000));
        assert!(store.poll_autosave().unwrap());
    }
    assert_eq!(writes(&store, &id), 3);
}
