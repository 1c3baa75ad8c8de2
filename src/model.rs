use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

pub type PhotoId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    pub url: String,
}

impl Photo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: crate::util::new_id(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Working,
    Complete,
    Archived,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Working => "working",
            ReportStatus::Complete => "complete",
            ReportStatus::Archived => "archived",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "working" => Ok(ReportStatus::Working),
            "complete" => Ok(ReportStatus::Complete),
            "archived" => Ok(ReportStatus::Archived),
            other => Err(format!("unknown report status: {other}")),
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Survey level. Picks the section list and the auto-text template set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Level2,
    #[default]
    Level3,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Level2 => "level2",
            ReportType::Level3 => "level3",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReportType::Level2 => "Level 2",
            ReportType::Level3 => "Level 3",
        }
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "level2" | "2" => Ok(ReportType::Level2),
            "level3" | "3" => Ok(ReportType::Level3),
            other => Err(format!("unknown report type: {other}")),
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Section-level condition rating, stored as the bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ConditionRating {
    One = 1,
    Two = 2,
    Three = 3,
}

impl TryFrom<u8> for ConditionRating {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ConditionRating::One),
            2 => Ok(ConditionRating::Two),
            3 => Ok(ConditionRating::Three),
            other => Err(format!("condition rating out of range: {other}")),
        }
    }
}

impl From<ConditionRating> for u8 {
    fn from(value: ConditionRating) -> Self {
        value as u8
    }
}

impl FromStr for ConditionRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid condition rating: {s}"))?;
        ConditionRating::try_from(n)
    }
}

/// Rating used inside the rated subsection tables; `NI` is "not inspected".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubsectionRating {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "NI")]
    NotInspected,
}

impl SubsectionRating {
    pub fn as_str(self) -> &'static str {
        match self {
            SubsectionRating::One => "1",
            SubsectionRating::Two => "2",
            SubsectionRating::Three => "3",
            SubsectionRating::NotInspected => "NI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionEntry {
    #[serde(deserialize_with = "lenient")]
    pub content: String,
    #[serde(deserialize_with = "lenient")]
    pub rating: Option<ConditionRating>,
    /// Ordered references into [`Report::photos`].
    #[serde(deserialize_with = "photo_refs")]
    pub photos: Vec<PhotoId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RatedSubsection {
    pub rating: Option<SubsectionRating>,
    pub type_construction: String,
    pub condition: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSubsection {
    pub text: String,
}

// A. About the inspection

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionAData {
    pub surveyor_name: String,
    pub surveyor_rics_number: String,
    pub company_name: String,
    pub inspection_date: String,
    pub report_reference: String,
    pub related_party_disclosure: String,
    pub property_address: String,
    pub weather_conditions: String,
    pub property_status: String,
}

// C. About the property

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Accommodation {
    pub ground_living_rooms: String,
    pub ground_bedrooms: String,
    pub ground_bath_shower: String,
    pub ground_toilet: String,
    pub ground_kitchen: String,
    pub ground_utility: String,
    pub ground_conservatory: String,
    pub ground_other: String,
    pub ground_other_name: String,
    pub first_living_rooms: String,
    pub first_bedrooms: String,
    pub first_bath_shower: String,
    pub first_toilet: String,
    pub first_kitchen: String,
    pub first_utility: String,
    pub first_conservatory: String,
    pub first_other: String,
    pub first_other_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionCData {
    pub property_type: String,
    pub year_built: String,
    pub year_extended: String,
    pub year_converted: String,
    pub flats_info: String,
    pub construction: String,
    pub accommodation: Accommodation,
    pub means_of_escape: String,
    pub epc_rating: String,
    pub epc_potential: String,
    pub energy_improvements: String,
    pub energy_issues: String,
    pub gas_service: bool,
    pub electric_service: bool,
    pub water_service: bool,
    pub drainage_service: bool,
    pub heating_gas: bool,
    pub heating_electric: bool,
    pub heating_solid_fuel: bool,
    pub heating_oil: bool,
    pub heating_none: bool,
    pub other_services: String,
    pub other_energy_matters: String,
}

// D. Outside the property

const OUTSIDE_LIMITATIONS: &str = "A visual non-invasive inspection of the outside of the main building was carried out from various points within the boundaries of the property and from public areas such as footpaths and open spaces, without entering neighbouring private property unless permission had been expressly granted.

High level features were inspected either by using binoculars, a ladder, or with the aid of a drone equipped with a high definition camera.

Where external walls are covered with finishes such as render or paint, the wall surface beneath cannot be directly viewed and it is assumed that no unusual defects exist within these concealed areas.

No tests have been carried out to either trace or establish the structure or condition of any underground drainage.";

const GROUNDS_LIMITATIONS: &str = "The condition of the boundary walls and fences, outbuildings and areas in common (shared) use was inspected from within the grounds and any public areas, but not from neighbouring private property. The report provides a summary of the general condition of any garden walls, fences and permanent outbuildings.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionDData {
    pub limitations_text: String,
    pub d1_chimney_stacks: RatedSubsection,
    pub d2_roof_coverings: RatedSubsection,
    pub d3_rainwater_pipes_gutters: RatedSubsection,
    pub d4_main_walls: RatedSubsection,
    pub d5_windows: RatedSubsection,
    pub d6_outside_doors: RatedSubsection,
    pub d7_conservatory_porches: RatedSubsection,
    pub d8_other_joinery: RatedSubsection,
    pub d9_other: RatedSubsection,
}

impl Default for SectionDData {
    fn default() -> Self {
        Self {
            limitations_text: OUTSIDE_LIMITATIONS.into(),
            d1_chimney_stacks: Default::default(),
            d2_roof_coverings: Default::default(),
            d3_rainwater_pipes_gutters: Default::default(),
            d4_main_walls: Default::default(),
            d5_windows: Default::default(),
            d6_outside_doors: Default::default(),
            d7_conservatory_porches: Default::default(),
            d8_other_joinery: Default::default(),
            d9_other: Default::default(),
        }
    }
}

impl SectionDData {
    pub fn subsections(&self) -> Vec<(&'static str, &RatedSubsection)> {
        vec![
            ("D1 Chimney stacks", &self.d1_chimney_stacks),
            ("D2 Roof coverings", &self.d2_roof_coverings),
            ("D3 Rainwater pipes and gutters", &self.d3_rainwater_pipes_gutters),
            ("D4 Main walls", &self.d4_main_walls),
            ("D5 Windows", &self.d5_windows),
            ("D6 Outside doors", &self.d6_outside_doors),
            ("D7 Conservatory and porches", &self.d7_conservatory_porches),
            ("D8 Other joinery and finishes", &self.d8_other_joinery),
            ("D9 Other", &self.d9_other),
        ]
    }
}

// E. Inside the property

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionEData {
    pub limitations_text: String,
    pub e1_roof_structure: RatedSubsection,
    pub e2_ceilings: RatedSubsection,
    pub e3_walls_partitions: RatedSubsection,
    pub e4_floors: RatedSubsection,
    pub e5_fireplaces: RatedSubsection,
    pub e6_built_in_fittings: RatedSubsection,
    pub e7_woodwork: RatedSubsection,
    pub e8_bathroom_fittings: RatedSubsection,
    pub e9_other: RatedSubsection,
}

impl SectionEData {
    pub fn subsections(&self) -> Vec<(&'static str, &RatedSubsection)> {
        vec![
            ("E1 Roof structure", &self.e1_roof_structure),
            ("E2 Ceilings", &self.e2_ceilings),
            ("E3 Walls and partitions", &self.e3_walls_partitions),
            ("E4 Floors", &self.e4_floors),
            ("E5 Fireplaces, chimney breasts and flues", &self.e5_fireplaces),
            ("E6 Built-in fittings", &self.e6_built_in_fittings),
            ("E7 Woodwork", &self.e7_woodwork),
            ("E8 Bathroom fittings", &self.e8_bathroom_fittings),
            ("E9 Other", &self.e9_other),
        ]
    }
}

// F. Services

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionFData {
    pub limitations_text: String,
    pub f1_electricity: RatedSubsection,
    pub f2_gas_oil: RatedSubsection,
    pub f3_water: RatedSubsection,
    pub f4_heating: RatedSubsection,
    pub f5_water_heating: RatedSubsection,
    pub f6_drainage: RatedSubsection,
    pub f7_common_services: RatedSubsection,
}

impl SectionFData {
    pub fn subsections(&self) -> Vec<(&'static str, &RatedSubsection)> {
        vec![
            ("F1 Electricity", &self.f1_electricity),
            ("F2 Gas/oil", &self.f2_gas_oil),
            ("F3 Water", &self.f3_water),
            ("F4 Heating", &self.f4_heating),
            ("F5 Water heating", &self.f5_water_heating),
            ("F6 Drainage", &self.f6_drainage),
            ("F7 Common services", &self.f7_common_services),
        ]
    }
}

// G. Grounds

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionGData {
    pub limitations_text: String,
    pub g1_garage: RatedSubsection,
    pub g2_outbuildings: RatedSubsection,
    pub g3_other: RatedSubsection,
}

impl Default for SectionGData {
    fn default() -> Self {
        Self {
            limitations_text: GROUNDS_LIMITATIONS.into(),
            g1_garage: Default::default(),
            g2_outbuildings: Default::default(),
            g3_other: Default::default(),
        }
    }
}

impl SectionGData {
    pub fn subsections(&self) -> Vec<(&'static str, &RatedSubsection)> {
        vec![
            ("G1 Garage", &self.g1_garage),
            ("G2 Permanent outbuildings and other structures", &self.g2_outbuildings),
            ("G3 Other", &self.g3_other),
        ]
    }
}

// H. Issues for your legal advisers

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionHData {
    pub h1_regulation: TextSubsection,
    pub h2_guarantees: TextSubsection,
    pub h3_other_matters: TextSubsection,
}

impl SectionHData {
    pub fn subsections(&self) -> Vec<(&'static str, &TextSubsection)> {
        vec![
            ("H1 Regulation", &self.h1_regulation),
            ("H2 Guarantees", &self.h2_guarantees),
            ("H3 Other Matters", &self.h3_other_matters),
        ]
    }
}

// I. Risks

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionIData {
    pub i1_risks_to_building: TextSubsection,
    pub i2_risks_to_grounds: TextSubsection,
    pub i3_risks_to_people: TextSubsection,
    pub i4_other_risks: TextSubsection,
}

impl SectionIData {
    pub fn subsections(&self) -> Vec<(&'static str, &TextSubsection)> {
        vec![
            ("I1 Risks to the building", &self.i1_risks_to_building),
            ("I2 Risks to the grounds", &self.i2_risks_to_grounds),
            ("I3 Risks to people", &self.i3_risks_to_people),
            ("I4 Other risks or hazards", &self.i4_other_risks),
        ]
    }
}

// J. Energy matters

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionJData {
    pub insulation: String,
    pub heating: String,
    pub lighting: String,
    pub ventilation: String,
    pub general: String,
}

// L. What to do now

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionLData {
    pub content: String,
}

/// Names one of the bespoke sub-records on [`Report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StructuredKey {
    #[serde(rename = "sectionAData")]
    SectionA,
    #[serde(rename = "sectionCData")]
    SectionC,
    #[serde(rename = "sectionDData")]
    SectionD,
    #[serde(rename = "sectionEData")]
    SectionE,
    #[serde(rename = "sectionFData")]
    SectionF,
    #[serde(rename = "sectionGData")]
    SectionG,
    #[serde(rename = "sectionHData")]
    SectionH,
    #[serde(rename = "sectionIData")]
    SectionI,
    #[serde(rename = "sectionJData")]
    SectionJ,
    #[serde(rename = "sectionLData")]
    SectionL,
}

impl StructuredKey {
    pub const ALL: [StructuredKey; 10] = [
        StructuredKey::SectionA,
        StructuredKey::SectionC,
        StructuredKey::SectionD,
        StructuredKey::SectionE,
        StructuredKey::SectionF,
        StructuredKey::SectionG,
        StructuredKey::SectionH,
        StructuredKey::SectionI,
        StructuredKey::SectionJ,
        StructuredKey::SectionL,
    ];

    pub fn field_name(self) -> &'static str {
        match self {
            StructuredKey::SectionA => "sectionAData",
            StructuredKey::SectionC => "sectionCData",
            StructuredKey::SectionD => "sectionDData",
            StructuredKey::SectionE => "sectionEData",
            StructuredKey::SectionF => "sectionFData",
            StructuredKey::SectionG => "sectionGData",
            StructuredKey::SectionH => "sectionHData",
            StructuredKey::SectionI => "sectionIData",
            StructuredKey::SectionJ => "sectionJData",
            StructuredKey::SectionL => "sectionLData",
        }
    }

    pub fn letter(self) -> char {
        // "sectionXData"
        self.field_name().chars().nth(7).unwrap_or('?')
    }
}

impl FromStr for StructuredKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        StructuredKey::ALL
            .into_iter()
            .find(|k| {
                k.field_name().eq_ignore_ascii_case(s)
                    || (s.len() == 1 && s.chars().all(|c| c.eq_ignore_ascii_case(&k.letter())))
            })
            .ok_or_else(|| format!("unknown structured section: {s}"))
    }
}

/// One survey report: metadata, generic section entries, the photo arena and
/// the bespoke per-section records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Report {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub property_address: String,
    #[serde(deserialize_with = "lenient")]
    pub client_name: String,
    #[serde(deserialize_with = "lenient")]
    pub inspection_date: String,
    #[serde(deserialize_with = "lenient")]
    pub rics_number: String,
    #[serde(deserialize_with = "lenient")]
    pub status: ReportStatus,
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub report_type: ReportType,
    #[serde(deserialize_with = "lenient")]
    pub include_valuation: bool,
    #[serde(deserialize_with = "lenient")]
    pub cover_photo: Option<PhotoId>,
    #[serde(deserialize_with = "section_entries")]
    pub sections: BTreeMap<String, SectionEntry>,
    /// Every photo referenced by a section list or the cover slot, by id.
    #[serde(deserialize_with = "photo_arena")]
    pub photos: BTreeMap<PhotoId, Photo>,
    #[serde(rename = "sectionAData", deserialize_with = "lenient_record")]
    pub section_a: SectionAData,
    #[serde(rename = "sectionCData", deserialize_with = "lenient_record")]
    pub section_c: SectionCData,
    #[serde(rename = "sectionDData", deserialize_with = "lenient_record")]
    pub section_d: SectionDData,
    #[serde(rename = "sectionEData", deserialize_with = "lenient_record")]
    pub section_e: SectionEData,
    #[serde(rename = "sectionFData", deserialize_with = "lenient_record")]
    pub section_f: SectionFData,
    #[serde(rename = "sectionGData", deserialize_with = "lenient_record")]
    pub section_g: SectionGData,
    #[serde(rename = "sectionHData", deserialize_with = "lenient_record")]
    pub section_h: SectionHData,
    #[serde(rename = "sectionIData", deserialize_with = "lenient_record")]
    pub section_i: SectionIData,
    #[serde(rename = "sectionJData", deserialize_with = "lenient_record")]
    pub section_j: SectionJData,
    #[serde(rename = "sectionLData", deserialize_with = "lenient_record")]
    pub section_l: SectionLData,
}

impl Report {
    /// Read a stored record. Only text that is not JSON, or JSON that is not
    /// an object, is an error; fields with the wrong shape read as their
    /// defaults, and photos embedded as `{id, url}` objects inside section
    /// lists or the cover slot are moved into the arena.
    pub fn from_stored(raw: &str) -> Result<Self, serde_json::Error> {
        let mut value: Value = serde_json::from_str(raw)?;
        lift_embedded_photos(&mut value);
        serde_json::from_value(value)
    }

    pub fn new(id: impl Into<String>, report_type: ReportType, today: &str) -> Self {
        let mut report = Report {
            id: id.into(),
            inspection_date: today.to_string(),
            report_type,
            ..Default::default()
        };
        report.section_a.inspection_date = today.to_string();
        report
    }

    /// Section entry, or the empty default when the section was never written.
    pub fn section(&self, section_id: &str) -> SectionEntry {
        self.sections.get(section_id).cloned().unwrap_or_default()
    }

    pub fn section_mut(&mut self, section_id: &str) -> &mut SectionEntry {
        self.sections.entry(section_id.to_string()).or_default()
    }

    pub fn photo(&self, id: &str) -> Option<&Photo> {
        self.photos.get(id)
    }

    pub fn section_photos(&self, section_id: &str) -> Vec<&Photo> {
        self.sections
            .get(section_id)
            .map(|s| s.photos.iter().filter_map(|id| self.photos.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn cover(&self) -> Option<&Photo> {
        self.cover_photo.as_deref().and_then(|id| self.photos.get(id))
    }

    pub fn register_photo(&mut self, photo: &Photo) {
        self.photos
            .entry(photo.id.clone())
            .or_insert_with(|| photo.clone());
    }

    pub fn is_photo_referenced(&self, id: &str) -> bool {
        self.cover_photo.as_deref() == Some(id)
            || self.sections.values().any(|s| s.photos.iter().any(|p| p == id))
    }

    /// Drop arena entries that no section or cover slot points at.
    pub fn prune_photos(&mut self) {
        let referenced: Vec<PhotoId> = self
            .photos
            .keys()
            .filter(|id| self.is_photo_referenced(id))
            .cloned()
            .collect();
        self.photos.retain(|id, _| referenced.contains(id));
    }

    pub fn metadata(&self, last_modified: i64) -> MetadataEntry {
        MetadataEntry {
            id: self.id.clone(),
            property_address: non_empty_or(&self.property_address, "No Address"),
            client_name: non_empty_or(&self.client_name, "No Client"),
            inspection_date: self.inspection_date.clone(),
            rics_number: self.rics_number.clone(),
            last_modified,
            status: self.status,
            report_type: self.report_type,
        }
    }

    /// Merge a JSON object into one of the bespoke sub-records. Nested objects
    /// are merged one level deep; keys the record does not have are skipped.
    /// On a shape mismatch the record is left untouched.
    pub fn merge_structured(
        &mut self,
        key: StructuredKey,
        patch: &Map<String, Value>,
    ) -> Result<(), serde_json::Error> {
        match key {
            StructuredKey::SectionA => merge_record(&mut self.section_a, patch),
            StructuredKey::SectionC => merge_record(&mut self.section_c, patch),
            StructuredKey::SectionD => merge_record(&mut self.section_d, patch),
            StructuredKey::SectionE => merge_record(&mut self.section_e, patch),
            StructuredKey::SectionF => merge_record(&mut self.section_f, patch),
            StructuredKey::SectionG => merge_record(&mut self.section_g, patch),
            StructuredKey::SectionH => merge_record(&mut self.section_h, patch),
            StructuredKey::SectionI => merge_record(&mut self.section_i, patch),
            StructuredKey::SectionJ => merge_record(&mut self.section_j, patch),
            StructuredKey::SectionL => merge_record(&mut self.section_l, patch),
        }
    }

    pub fn structured_value(&self, key: StructuredKey) -> Result<Value, serde_json::Error> {
        match key {
            StructuredKey::SectionA => serde_json::to_value(&self.section_a),
            StructuredKey::SectionC => serde_json::to_value(&self.section_c),
            StructuredKey::SectionD => serde_json::to_value(&self.section_d),
            StructuredKey::SectionE => serde_json::to_value(&self.section_e),
            StructuredKey::SectionF => serde_json::to_value(&self.section_f),
            StructuredKey::SectionG => serde_json::to_value(&self.section_g),
            StructuredKey::SectionH => serde_json::to_value(&self.section_h),
            StructuredKey::SectionI => serde_json::to_value(&self.section_i),
            StructuredKey::SectionJ => serde_json::to_value(&self.section_j),
            StructuredKey::SectionL => serde_json::to_value(&self.section_l),
        }
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn merge_record<T>(record: &mut T, patch: &Map<String, Value>) -> Result<(), serde_json::Error>
where
    T: Serialize + DeserializeOwned,
{
    let mut current = serde_json::to_value(&*record)?;
    if let Value::Object(fields) = &mut current {
        for (key, value) in patch {
            match (fields.get_mut(key), value) {
                (Some(Value::Object(existing)), Value::Object(nested)) => {
                    for (k, v) in nested {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                (Some(slot), _) => *slot = value.clone(),
                (None, _) => {}
            }
        }
    }
    *record = serde_json::from_value(current)?;
    Ok(())
}

/// Listing projection of a report, rebuilt on every save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    pub id: String,
    #[serde(default)]
    pub property_address: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub inspection_date: String,
    #[serde(default)]
    pub rics_number: String,
    #[serde(default, deserialize_with = "lenient")]
    pub last_modified: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub status: ReportStatus,
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub report_type: ReportType,
}

// Tolerant reads. Stored records are never migrated, so a field whose shape
// no longer matches falls back to its default instead of failing the load.

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    match T::deserialize(&value) {
        Ok(v) => Ok(v),
        Err(e) => {
            warn!("stored field unreadable, using default: {e}");
            Ok(T::default())
        }
    }
}

fn lenient_record<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Serialize + DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(read_record(&value))
}

/// Overlay the stored leaves onto the default record one at a time, keeping
/// each only if the record still deserializes with it.
fn read_record<T>(stored: &Value) -> T
where
    T: Serialize + DeserializeOwned + Default,
{
    if let Ok(record) = T::deserialize(stored) {
        return record;
    }
    let Ok(mut current) = serde_json::to_value(T::default()) else {
        return T::default();
    };
    let mut leaves = Vec::new();
    collect_leaves(&current, stored, "", &mut leaves);
    for (pointer, value) in leaves {
        let Some(slot) = current.pointer_mut(&pointer) else {
            continue;
        };
        let previous = std::mem::replace(slot, value);
        if T::deserialize(&current).is_err() {
            warn!(field = %pointer, "stored field unreadable, using default");
            if let Some(slot) = current.pointer_mut(&pointer) {
                *slot = previous;
            }
        }
    }
    T::deserialize(&current).unwrap_or_default()
}

fn collect_leaves(template: &Value, stored: &Value, prefix: &str, out: &mut Vec<(String, Value)>) {
    let (Value::Object(template), Value::Object(stored)) = (template, stored) else {
        return;
    };
    for (key, value) in stored {
        let Some(slot) = template.get(key) else {
            continue;
        };
        let pointer = format!("{prefix}/{}", key.replace('~', "~0").replace('/', "~1"));
        if slot.is_object() && value.is_object() {
            collect_leaves(slot, value, &pointer, out);
        } else {
            out.push((pointer, value.clone()));
        }
    }
}

fn section_entries<'de, D>(deserializer: D) -> Result<BTreeMap<String, SectionEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(entries) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|(id, entry)| match serde_json::from_value(entry) {
            Ok(entry) => Some((id, entry)),
            Err(e) => {
                warn!(section = %id, "stored section unreadable, dropped: {e}");
                None
            }
        })
        .collect())
}

fn photo_arena<'de, D>(deserializer: D) -> Result<BTreeMap<PhotoId, Photo>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(photos) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    Ok(photos
        .into_iter()
        .filter_map(|(id, photo)| serde_json::from_value::<Photo>(photo).ok().map(|p| (id, p)))
        .collect())
}

/// Photo ids in order. Anything that is not an id string is skipped.
fn photo_refs<'de, D>(deserializer: D) -> Result<Vec<PhotoId>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(id) => Some(id),
            _ => None,
        })
        .collect())
}

fn lift_embedded_photos(value: &mut Value) {
    let Value::Object(root) = value else {
        return;
    };
    let mut lifted = Vec::new();
    if let Some(Value::Object(sections)) = root.get_mut("sections") {
        for entry in sections.values_mut() {
            if let Some(Value::Array(slots)) = entry.get_mut("photos") {
                lifted.extend(slots.iter_mut().filter_map(take_embedded));
            }
        }
    }
    if let Some(slot) = root.get_mut("coverPhoto") {
        lifted.extend(take_embedded(slot));
    }
    if lifted.is_empty() {
        return;
    }

    let arena = root
        .entry("photos")
        .or_insert_with(|| Value::Object(Map::new()));
    if !arena.is_object() {
        *arena = Value::Object(Map::new());
    }
    if let Value::Object(arena) = arena {
        for photo in lifted {
            arena
                .entry(photo.id.clone())
                .or_insert_with(|| json!({ "id": photo.id, "url": photo.url }));
        }
    }
}

/// Replace an embedded `{id, url}` object with its id.
fn take_embedded(slot: &mut Value) -> Option<Photo> {
    if !slot.is_object() {
        return None;
    }
    let photo: Photo = serde_json::from_value(slot.clone()).ok()?;
    *slot = Value::String(photo.id.clone());
    Some(photo)
}
