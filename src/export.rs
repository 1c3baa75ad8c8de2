use crate::{
    config::Config,
    model::{RatedSubsection, Report, StructuredKey as K, TextSubsection},
    sections::{section_kind, visible_sections, SectionKind},
    util::ensure_dir,
};
use anyhow::{Context, Result};
use regex::Regex;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::info;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub markdown_path: Option<PathBuf>,
    pub text_path: Option<PathBuf>,
}

/// `<prefix><address>.<ext>` with the address made safe for a file name.
pub fn export_file_name(cfg: &Config, property_address: &str, ext: &str) -> Result<String> {
    let normalized: String = property_address.trim().nfkc().collect();
    let unsafe_chars = Regex::new(r"[^\p{L}\p{N}._-]+")?;
    let cleaned = unsafe_chars.replace_all(&normalized, "_");
    let cleaned = cleaned.trim_matches('_');
    let stem = if cleaned.is_empty() { "No_Address" } else { cleaned };
    Ok(format!("{}{}.{}", cfg.export.file_prefix, stem, ext))
}

pub fn render_markdown(cfg: &Config, report: &Report) -> Result<String> {
    let mut md = String::new();
    para(&mut md, &format!("# RICS Home Survey {}", report.report_type.label()))?;

    for section in visible_sections(report) {
        para(&mut md, &format!("## {section}"))?;
        match section_kind(section) {
            SectionKind::Cover => render_cover(cfg, report, &mut md)?,
            SectionKind::Freeform => {}
            SectionKind::RatedSubsections(_) | SectionKind::StructuredFields(_) => {
                render_structured(report, section, &mut md)?
            }
        }
        render_entry(cfg, report, section, &mut md)?;
    }

    Ok(normalize(&md))
}

fn render_cover(cfg: &Config, report: &Report, md: &mut String) -> fmt::Result {
    field(md, "Property address", &report.property_address)?;
    field(md, "Client", &report.client_name)?;
    field(md, "Inspection date", &report.inspection_date)?;
    field(md, "RICS number", &report.rics_number)?;
    field(md, "Status", report.status.as_str())?;
    if cfg.export.include_photos {
        if let Some(photo) = report.cover() {
            para(md, &format!("![cover]({})", photo.url))?;
        }
    }
    Ok(())
}

fn render_entry(cfg: &Config, report: &Report, section: &str, md: &mut String) -> fmt::Result {
    let Some(entry) = report.sections.get(section) else {
        return Ok(());
    };
    if let Some(rating) = entry.rating {
        para(md, &format!("**Condition rating:** {}", u8::from(rating)))?;
    }
    if !entry.content.is_empty() {
        para(md, &entry.content)?;
    }
    if cfg.export.include_photos {
        for photo in report.section_photos(section) {
            writeln!(md, "![photo {}]({})", photo.id, photo.url)?;
        }
        if !entry.photos.is_empty() {
            writeln!(md)?;
        }
    }
    Ok(())
}

fn render_structured(report: &Report, section: &str, md: &mut String) -> fmt::Result {
    let Some(key) = section_kind(section).structured_key() else {
        return Ok(());
    };
    match key {
        K::SectionA => {
            let a = &report.section_a;
            field(md, "Surveyor", &a.surveyor_name)?;
            field(md, "Surveyor RICS number", &a.surveyor_rics_number)?;
            field(md, "Company", &a.company_name)?;
            field(md, "Date of inspection", &a.inspection_date)?;
            field(md, "Report reference", &a.report_reference)?;
            field(md, "Related party disclosure", &a.related_party_disclosure)?;
            field(md, "Full address", &a.property_address)?;
            field(md, "Weather conditions", &a.weather_conditions)?;
            field(md, "Status of the property", &a.property_status)
        }
        K::SectionC => {
            let c = &report.section_c;
            field(md, "Type of property", &c.property_type)?;
            field(md, "Year built", &c.year_built)?;
            field(md, "Year extended", &c.year_extended)?;
            field(md, "Year converted", &c.year_converted)?;
            field(md, "Information relevant to flats", &c.flats_info)?;
            field(md, "Construction", &c.construction)?;
            field(md, "Means of escape", &c.means_of_escape)?;
            field(md, "EPC rating", &c.epc_rating)?;
            field(md, "EPC potential", &c.epc_potential)?;
            field(md, "Energy improvements", &c.energy_improvements)?;
            field(md, "Energy issues", &c.energy_issues)?;
            let services = flags(&[
                (c.gas_service, "gas"),
                (c.electric_service, "electricity"),
                (c.water_service, "water"),
                (c.drainage_service, "drainage"),
            ]);
            field(md, "Mains services", &services)?;
            let heating = flags(&[
                (c.heating_gas, "gas"),
                (c.heating_electric, "electric"),
                (c.heating_solid_fuel, "solid fuel"),
                (c.heating_oil, "oil"),
                (c.heating_none, "none"),
            ]);
            field(md, "Central heating", &heating)?;
            field(md, "Other services", &c.other_services)?;
            field(md, "Other energy matters", &c.other_energy_matters)
        }
        K::SectionD => rated(md, &report.section_d.limitations_text, report.section_d.subsections()),
        K::SectionE => rated(md, &report.section_e.limitations_text, report.section_e.subsections()),
        K::SectionF => rated(md, &report.section_f.limitations_text, report.section_f.subsections()),
        K::SectionG => rated(md, &report.section_g.limitations_text, report.section_g.subsections()),
        K::SectionH => texts(md, report.section_h.subsections()),
        K::SectionI => texts(md, report.section_i.subsections()),
        K::SectionJ => {
            let j = &report.section_j;
            field(md, "Insulation", &j.insulation)?;
            field(md, "Heating", &j.heating)?;
            field(md, "Lighting", &j.lighting)?;
            field(md, "Ventilation", &j.ventilation)?;
            field(md, "General", &j.general)
        }
        K::SectionL => {
            if report.section_l.content.is_empty() {
                return Ok(());
            }
            para(md, &report.section_l.content)
        }
    }
}

fn flags(set: &[(bool, &str)]) -> String {
    set.iter()
        .filter_map(|(on, name)| on.then_some(*name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn rated(md: &mut String, limitations: &str, subsections: Vec<(&str, &RatedSubsection)>) -> fmt::Result {
    if !limitations.is_empty() {
        para(md, limitations)?;
    }
    for (title, sub) in subsections {
        para(md, &format!("### {title}"))?;
        if let Some(rating) = sub.rating {
            field(md, "Condition rating", rating.as_str())?;
        }
        field(md, "Type and construction", &sub.type_construction)?;
        field(md, "Condition", &sub.condition)?;
        field(md, "Action", &sub.action)?;
    }
    Ok(())
}

fn texts(md: &mut String, subsections: Vec<(&str, &TextSubsection)>) -> fmt::Result {
    for (title, sub) in subsections {
        if sub.text.is_empty() {
            continue;
        }
        para(md, &format!("### {title}"))?;
        para(md, &sub.text)?;
    }
    Ok(())
}

fn field(md: &mut String, label: &str, value: &str) -> fmt::Result {
    if value.is_empty() {
        return Ok(());
    }
    para(md, &format!("**{label}:** {value}"))
}

/// One block followed by a blank line.
fn para(md: &mut String, text: &str) -> fmt::Result {
    writeln!(md, "{text}")?;
    writeln!(md)
}

fn normalize(md: &str) -> String {
    let mut out = md
        .replace("\r\n", "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    while out.contains("\n\n\n") {
        out = out.replace("\n\n\n", "\n\n");
    }
    out.push('\n');
    out
}

pub fn markdown_to_text(md: &str) -> Result<String> {
    let images = Regex::new(r"!\[[^\]]*\]\(([^)]*)\)")?;
    let headings = Regex::new(r"(?m)^#{1,6}\s+")?;
    let s = images.replace_all(md, "[photo: $1]");
    let s = headings.replace_all(&s, "");
    Ok(s.replace("**", ""))
}

/// Render and write the report under `out_dir`. Failures are returned to the
/// caller; nothing is silently dropped.
pub fn export_report(cfg: &Config, report: &Report, out_dir: &Path) -> Result<ExportOutput> {
    ensure_dir(out_dir)?;
    let markdown = render_markdown(cfg, report)?;

    let markdown_path = if cfg.export.write_markdown {
        let path = out_dir.join(export_file_name(cfg, &report.property_address, "md")?);
        std::fs::write(&path, &markdown)
            .with_context(|| format!("writing export: {}", path.display()))?;
        Some(path)
    } else {
        None
    };

    let text_path = if cfg.export.write_text {
        let path = out_dir.join(export_file_name(cfg, &report.property_address, "txt")?);
        std::fs::write(&path, markdown_to_text(&markdown)?)
            .with_context(|| format!("writing export: {}", path.display()))?;
        Some(path)
    } else {
        None
    };

    info!(
        id = %report.id,
        markdown = ?markdown_path,
        text = ?text_path,
        "report exported"
    );
    Ok(ExportOutput {
        markdown_path,
        text_path,
    })
}
