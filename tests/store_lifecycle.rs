use std::time::Duration;
use survey_desk::{
    autosave::{ManualClock, SaveStatus},
    model::{ConditionRating, ReportStatus, ReportType, SubsectionRating},
    persistence::{report_key, KeyValueStore, MemoryStore, Persistence},
    store::{MetadataPatch, ReportStore, SectionPatch, StoreError},
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

fn store_over(kv: MemoryStore) -> ReportStore<MemoryStore> {
    ReportStore::new(
        Persistence::new(kv),
        Box::new(TemplateCatalog::builtin().unwrap()),
        Duration::from_millis(2000),
    )
    .unwrap()
}

fn address(value: &str) -> MetadataPatch {
    MetadataPatch {
        property_address: Some(value.into()),
        ..Default::default()
    }
}

#[test]
fn new_report_defaults() {
    let (mut store, _clock) = mk_store();
    let report = store.create_report(ReportType::Level3);
    assert!(!report.id.is_empty());
    assert_eq!(report.status, ReportStatus::Working);
    assert_eq!(report.report_type, ReportType::Level3);
    assert_eq!(report.inspection_date.len(), 10);
    assert_eq!(report.inspection_date.as_bytes()[4], b'-');
    assert_eq!(report.inspection_date.as_bytes()[7], b'-');
    assert_eq!(report.section_a.inspection_date, report.inspection_date);
    assert!(report.sections.is_empty());
    assert!(report.cover_photo.is_none());
    assert!(report.section_d.limitations_text.starts_with("A visual non-invasive"));
}

#[test]
fn saved_report_reloads_unchanged() {
    let (mut store, clock) = mk_store();
    let id = store.create_report(ReportType::Level3).id.clone();
    store.update_metadata(address("1 Test St")).unwrap();
    store
        .update_section(
            "D Outside the property",
            SectionPatch {
                content: Some("Walls are sound.".into()),
                rating: Some(Some(ConditionRating::Two)),
                photos: None,
            },
        )
        .unwrap();
    assert_eq!(store.save_status(), SaveStatus::Saving);

    clock.advance(Duration::from_millis(2000));
    assert!(store.poll_autosave().unwrap());
    assert_eq!(store.save_status(), SaveStatus::Saved);

    let before = store.active().unwrap().clone();
    let after = store.load_report(&id).unwrap();
    assert_eq!(*after, before);

    let list = store.list_reports().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, id);
    assert_eq!(list[0].property_address, "1 Test St");
    assert_eq!(list[0].client_name, "No Client");
    assert_eq!(list[0].report_type, ReportType::Level3);
    assert!(list[0].last_modified > 0);
}

#[test]
fn metadata_patches_merge_field_by_field() {
    let (mut store, _clock) = mk_store();
    store.create_report(ReportType::Level2);
    store.update_metadata(address("1 Old Rd")).unwrap();
    store
        .update_metadata(MetadataPatch {
            client_name: Some("J. Smith".into()),
            ..Default::default()
        })
        .unwrap();
    store.update_metadata(address("2 New Rd")).unwrap();

    let report = store.active().unwrap();
    assert_eq!(report.property_address, "2 New Rd");
    assert_eq!(report.client_name, "J. Smith");
    assert_eq!(report.status, ReportStatus::Working);
    assert!(!report.inspection_date.is_empty());
}

#[test]
fn section_patch_keeps_untouched_fields() {
    let (mut store, _clock) = mk_store();
    store.create_report(ReportType::Level3);
    let section = "E Inside the property";
    store
        .update_section(
            section,
            SectionPatch {
                content: Some("Ceilings level.".into()),
                rating: Some(Some(ConditionRating::Three)),
                photos: None,
            },
        )
        .unwrap();
    store
        .update_section(
            section,
            SectionPatch {
                content: Some("Ceilings level. Floors firm.".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let entry = store.active().unwrap().section(section);
    assert_eq!(entry.content, "Ceilings level. Floors firm.");
    assert_eq!(entry.rating, Some(ConditionRating::Three));

    store
        .update_section(
            section,
            SectionPatch {
                rating: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
    let entry = store.active().unwrap().section(section);
    assert_eq!(entry.rating, None);
    assert_eq!(entry.content, "Ceilings level. Floors firm.");
}

#[test]
fn deleting_removes_record_and_index_entry() {
    let (mut store, _clock) = mk_store();
    let id = store.create_report(ReportType::Level2).id.clone();
    store.flush().unwrap();
    assert_eq!(store.list_reports().unwrap().len(), 1);

    store.delete_report(&id).unwrap();
    assert!(store.active().is_none());
    assert!(store.list_reports().unwrap().is_empty());
    assert!(!store.persistence().backend().contains(&report_key(&id)));
    assert!(matches!(store.load_report(&id), Err(StoreError::NotFound(_))));

    // unknown ids are fine
    store.delete_report("does-not-exist").unwrap();
}

#[test]
fn edits_without_an_open_report_are_rejected() {
    let (mut store, _clock) = mk_store();
    let err = store.update_metadata(address("1 Test St")).unwrap_err();
    assert!(matches!(err, StoreError::NoActiveReport));
    let err = store.remove_cover_photo().unwrap_err();
    assert!(matches!(err, StoreError::NoActiveReport));
    assert!(store.list_reports().unwrap().is_empty());
}

#[test]
fn status_change_rewrites_record_and_index() {
    let (mut store, _clock) = mk_store();
    let id = store.create_report(ReportType::Level3).id.clone();
    store.flush().unwrap();

    store.set_status(&id, ReportStatus::Complete).unwrap();
    let list = store.list_reports().unwrap();
    assert_eq!(list[0].status, ReportStatus::Complete);
    let stored = store.persistence().load(&id).unwrap().unwrap();
    assert_eq!(stored.status, ReportStatus::Complete);
    assert_eq!(store.active().unwrap().status, ReportStatus::Complete);
}

#[test]
fn newest_save_is_listed_first() {
    let (mut store, _clock) = mk_store();
    let first = store.create_report(ReportType::Level3).id.clone();
    store.flush().unwrap();
    let second = store.create_report(ReportType::Level2).id.clone();
    store.flush().unwrap();

    let ids: Vec<String> = store.list_reports().unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![second.clone(), first.clone()]);

    store.load_report(&first).unwrap();
    store.update_metadata(address("3 Lane")).unwrap();
    store.flush().unwrap();
    let ids: Vec<String> = store.list_reports().unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![first, second]);
}

#[test]
fn switching_reports_writes_pending_changes_first() {
    let (mut store, _clock) = mk_store();
    let first = store.create_report(ReportType::Level3).id.clone();
    store.update_metadata(address("4 Pending Way")).unwrap();
    assert_eq!(store.save_status(), SaveStatus::Saving);

    store.create_report(ReportType::Level3);
    let stored = store.persistence().load(&first).unwrap().unwrap();
    assert_eq!(stored.property_address, "4 Pending Way");
}

#[test]
fn loaded_report_selects_matching_templates() {
    let (mut store, _clock) = mk_store();
    let id = store.create_report(ReportType::Level2).id.clone();
    store.flush().unwrap();
    store.create_report(ReportType::Level3);
    assert_eq!(store.templates().unwrap().report_type, ReportType::Level3);

    store.load_report(&id).unwrap();
    let templates = store.templates().unwrap();
    assert_eq!(templates.report_type, ReportType::Level2);
    assert!(templates.get("weatherConditions").is_empty());
    assert!(!templates.get("B Overall opinion").is_empty());
}

#[test]
fn unknown_status_reads_as_default_and_keeps_other_fields() {
    let mut kv = MemoryStore::new();
    kv.set(
        &report_key("old"),
        r#"{"id":"old","propertyAddress":"9 Legacy Rd","clientName":"A. Client",
            "status":"draft","type":"level2",
            "sections":{"D Outside the property":{"content":"Sound.","rating":2,"photos":[]}}}"#,
    )
    .unwrap();
    let mut store = store_over(kv);

    let report = store.load_report("old").unwrap();
    assert_eq!(report.status, ReportStatus::Working);
    assert_eq!(report.property_address, "9 Legacy Rd");
    assert_eq!(report.client_name, "A. Client");
    assert_eq!(report.report_type, ReportType::Level2);
    let entry = report.section("D Outside the property");
    assert_eq!(entry.content, "Sound.");
    assert_eq!(entry.rating, Some(ConditionRating::Two));
}

#[test]
fn embedded_section_photos_move_into_the_arena() {
    let mut kv = MemoryStore::new();
    kv.set(
        &report_key("emb"),
        r#"{"id":"emb","coverPhoto":{"id":"c","url":"blob:cover"},
            "sections":{"G Grounds":{"content":"","photos":[{"id":"p","url":"blob:u"}]}}}"#,
    )
    .unwrap();
    let mut store = store_over(kv);

    let report = store.load_report("emb").unwrap();
    assert_eq!(report.section("G Grounds").photos, vec!["p".to_string()]);
    assert_eq!(report.photo("p").unwrap().url, "blob:u");
    assert_eq!(report.cover_photo.as_deref(), Some("c"));
    assert_eq!(report.photo("c").unwrap().url, "blob:cover");
}

#[test]
fn bad_nested_field_defaults_alone() {
    let mut kv = MemoryStore::new();
    kv.set(
        &report_key("nested"),
        r#"{"id":"nested","sectionDData":{
            "limitationsText":"Kept.",
            "d1ChimneyStacks":{"rating":"9","condition":"Leaning"},
            "d4MainWalls":{"rating":"NI"}}}"#,
    )
    .unwrap();
    let mut store = store_over(kv);

    let report = store.load_report("nested").unwrap();
    let d = &report.section_d;
    assert_eq!(d.limitations_text, "Kept.");
    assert_eq!(d.d1_chimney_stacks.rating, None);
    assert_eq!(d.d1_chimney_stacks.condition, "Leaning");
    assert_eq!(d.d4_main_walls.rating, Some(SubsectionRating::NotInspected));
}

#[test]
fn unparseable_record_is_a_storage_error() {
    let mut kv = MemoryStore::new();
    kv.set(&report_key("junk"), "not json").unwrap();
    let mut store = store_over(kv);

    assert!(matches!(store.load_report("junk"), Err(StoreError::Storage(_))));
    assert!(store.active().is_none());
}
