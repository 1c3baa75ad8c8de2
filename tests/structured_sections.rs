use serde_json::json;
use std::time::Duration;
use survey_desk::{
    model::{ReportType, StructuredKey, SubsectionRating},
    persistence::{MemoryStore, Persistence},
    sections::{allows_photos, allows_ratings, section_kind, section_titles, visible_sections, SectionKind},
    store::{ReportStore, StoreError},
    templates::TemplateCatalog,
};

fn mk_store() -> ReportStore<MemoryStore> {
    let mut store = ReportStore::new(
        Persistence::new(MemoryStore::new()),
        Box::new(TemplateCatalog::builtin().unwrap()),
        Duration::from_millis(2000),
    )
    .unwrap();
    store.create_report(ReportType::Level3);
    store
}

#[test]
fn nested_subsection_merges_one_level_deep() {
    let mut store = mk_store();
    store
        .update_structured_section(
            StructuredKey::SectionD,
            &json!({ "d1ChimneyStacks": { "rating": "2", "condition": "Weathered pointing." } }),
        )
        .unwrap();
    store
        .update_structured_section(
            StructuredKey::SectionD,
            &json!({ "d1ChimneyStacks": { "action": "Repoint." } }),
        )
        .unwrap();

    let d = &store.active().unwrap().section_d;
    assert_eq!(d.d1_chimney_stacks.rating, Some(SubsectionRating::Two));
    assert_eq!(d.d1_chimney_stacks.condition, "Weathered pointing.");
    assert_eq!(d.d1_chimney_stacks.action, "Repoint.");
    assert!(d.limitations_text.starts_with("A visual non-invasive"));
}

#[test]
fn flat_fields_merge_and_unknown_keys_are_skipped() {
    let mut store = mk_store();
    store
        .update_structured_section(
            StructuredKey::SectionA,
            &json!({ "weatherConditions": "Dry.", "notAField": 1 }),
        )
        .unwrap();
    store
        .update_structured_section(StructuredKey::SectionC, &json!({ "gasService": true }))
        .unwrap();

    let report = store.active().unwrap();
    assert_eq!(report.section_a.weather_conditions, "Dry.");
    assert!(!report.section_a.inspection_date.is_empty());
    assert!(report.section_c.gas_service);
    assert!(!report.section_c.water_service);
}

#[test]
fn bad_patches_leave_the_record_alone() {
    let mut store = mk_store();
    let err = store
        .update_structured_section(StructuredKey::SectionL, &json!("text"))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidPatch { .. }));

    let err = store
        .update_structured_section(StructuredKey::SectionC, &json!({ "gasService": "yes" }))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidPatch { .. }));
    assert!(!store.active().unwrap().section_c.gas_service);
}

#[test]
fn structured_key_accepts_field_name_or_letter() {
    assert_eq!("sectionGData".parse::<StructuredKey>().unwrap(), StructuredKey::SectionG);
    assert_eq!("h".parse::<StructuredKey>().unwrap(), StructuredKey::SectionH);
    assert!("B".parse::<StructuredKey>().is_err());
}

#[test]
fn section_table_matches_report_type() {
    let l2 = section_titles(ReportType::Level2);
    let l3 = section_titles(ReportType::Level3);
    assert_eq!(l2.len(), 17);
    assert!(l2[13].contains("Level 2"));
    assert!(l3[13].contains("Level 3"));
    assert_eq!(l3[11], "K Surveyor\u{2019}s declaration");

    assert!(allows_photos(ReportType::Level3, "Front Cover"));
    assert!(allows_photos(ReportType::Level3, "G Grounds"));
    assert!(!allows_photos(ReportType::Level3, "B Overall opinion"));
    assert!(allows_ratings(ReportType::Level2, "D Outside the property"));
    assert!(!allows_ratings(ReportType::Level2, "Front Cover"));

    assert_eq!(section_kind("Front Cover"), SectionKind::Cover);
    assert_eq!(
        section_kind("F Services"),
        SectionKind::RatedSubsections(StructuredKey::SectionF)
    );
    assert_eq!(section_kind("RICS disclaimer"), SectionKind::Freeform);
}

#[test]
fn valuation_only_listed_when_included() {
    let mut store = mk_store();
    let report = store.active().unwrap();
    assert!(!visible_sections(report).contains(&"Valuation"));

    store
        .update_metadata(survey_desk::store::MetadataPatch {
            include_valuation: Some(true),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(visible_sections(store.active().unwrap()).last(), Some(&"Valuation"));
}
