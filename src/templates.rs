use crate::model::ReportType;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

const BUILTIN_TEMPLATES: &str = include_str!("../templates/auto_text.toml");

/// Auto-text snippets for one report type, keyed by section title or field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    pub report_type: ReportType,
    entries: BTreeMap<String, Vec<String>>,
}

impl TemplateSet {
    pub fn get(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Source of template sets. The store asks for a set whenever the active
/// report's type is established (create or load).
pub trait TemplateProvider {
    fn template_set(&self, report_type: ReportType) -> TemplateSet;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateCatalog {
    #[serde(default)]
    common: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    level2: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    level3: BTreeMap<String, Vec<String>>,
}

impl TemplateCatalog {
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_TEMPLATES).with_context(|| "parsing built-in templates")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading templates: {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing templates: {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

impl TemplateProvider for TemplateCatalog {
    fn template_set(&self, report_type: ReportType) -> TemplateSet {
        let mut entries = self.common.clone();
        let specific = match report_type {
            ReportType::Level2 => &self.level2,
            ReportType::Level3 => &self.level3,
        };
        for (key, snippets) in specific {
            entries.insert(key.clone(), snippets.clone());
        }
        TemplateSet {
            report_type,
            entries,
        }
    }
}

/// Append a snippet the way the editor's auto-fill does: a blank line between
/// existing text and the new snippet.
pub fn append_auto_text(current: &str, snippet: &str) -> String {
    if current.is_empty() {
        snippet.to_string()
    } else {
        format!("{current}\n\n{snippet}")
    }
}
