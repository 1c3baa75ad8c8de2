use crate::model::{Report, ReportType, StructuredKey};

pub const COVER_SECTION: &str = "Front Cover";
pub const VALUATION_SECTION: &str = "Valuation";

const SECTIONS_LEVEL3: [&str; 17] = [
    COVER_SECTION,
    "A About the inspection",
    "B Overall opinion",
    "C About the property",
    "D Outside the property",
    "E Inside the property",
    "F Services",
    "G Grounds",
    "H Issues for your legal advisers",
    "I Risks",
    "J Energy matters",
    "K Surveyor\u{2019}s declaration",
    "L What to do now",
    "M Description of the RICS Home Survey \u{2013} Level 3 service and terms of engagement",
    "N Typical house diagram",
    "RICS disclaimer",
    VALUATION_SECTION,
];

const SECTION_M_LEVEL2: &str =
    "M Description of the RICS Home Survey \u{2013} Level 2 service and terms of engagement";
const SECTION_M_INDEX: usize = 13;

const PHOTO_SECTIONS: [usize; 5] = [0, 4, 5, 6, 7];
const RATED_SECTIONS: [usize; 4] = [4, 5, 6, 7];

/// How a section is authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Report metadata plus the single cover photo.
    Cover,
    /// Generic content / rating / photos entry.
    Freeform,
    /// Table of rated subsections held in a bespoke record.
    RatedSubsections(StructuredKey),
    /// Named fields held in a bespoke record.
    StructuredFields(StructuredKey),
}

impl SectionKind {
    pub fn structured_key(self) -> Option<StructuredKey> {
        match self {
            SectionKind::RatedSubsections(k) | SectionKind::StructuredFields(k) => Some(k),
            SectionKind::Cover | SectionKind::Freeform => None,
        }
    }
}

pub fn section_titles(report_type: ReportType) -> [&'static str; 17] {
    let mut titles = SECTIONS_LEVEL3;
    if report_type == ReportType::Level2 {
        titles[SECTION_M_INDEX] = SECTION_M_LEVEL2;
    }
    titles
}

pub fn section_index(report_type: ReportType, section_id: &str) -> Option<usize> {
    section_titles(report_type)
        .iter()
        .position(|t| *t == section_id)
}

pub fn is_known_section(report_type: ReportType, section_id: &str) -> bool {
    section_index(report_type, section_id).is_some()
}

pub fn allows_photos(report_type: ReportType, section_id: &str) -> bool {
    section_index(report_type, section_id).is_some_and(|i| PHOTO_SECTIONS.contains(&i))
}

pub fn allows_ratings(report_type: ReportType, section_id: &str) -> bool {
    section_index(report_type, section_id).is_some_and(|i| RATED_SECTIONS.contains(&i))
}

/// Section list in order, without Valuation unless the report includes it.
pub fn visible_sections(report: &Report) -> Vec<&'static str> {
    section_titles(report.report_type)
        .into_iter()
        .filter(|s| *s != VALUATION_SECTION || report.include_valuation)
        .collect()
}

/// Static kind table keyed on the section's letter prefix.
pub fn section_kind(section_id: &str) -> SectionKind {
    if section_id == COVER_SECTION {
        return SectionKind::Cover;
    }
    let letter = match section_id.split_once(' ') {
        Some((prefix, _)) if prefix.len() == 1 => prefix.chars().next(),
        _ => None,
    };
    match letter {
        Some('A') => SectionKind::StructuredFields(StructuredKey::SectionA),
        Some('C') => SectionKind::StructuredFields(StructuredKey::SectionC),
        Some('D') => SectionKind::RatedSubsections(StructuredKey::SectionD),
        Some('E') => SectionKind::RatedSubsections(StructuredKey::SectionE),
        Some('F') => SectionKind::RatedSubsections(StructuredKey::SectionF),
        Some('G') => SectionKind::RatedSubsections(StructuredKey::SectionG),
        Some('H') => SectionKind::StructuredFields(StructuredKey::SectionH),
        Some('I') => SectionKind::StructuredFields(StructuredKey::SectionI),
        Some('J') => SectionKind::StructuredFields(StructuredKey::SectionJ),
        Some('L') => SectionKind::StructuredFields(StructuredKey::SectionL),
        _ => SectionKind::Freeform,
    }
}
