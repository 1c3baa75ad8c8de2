//! The report state store.
//!
//! Holds the single open report, applies merge-style edits to it and defers
//! persistence through a debounced autosave. Every edit re-arms the timer;
//! only the state at the moment the timer fires is written.

use crate::{
    autosave::{Clock, Debouncer, SaveStatus, SystemClock},
    config::Config,
    model::{
        ConditionRating, MetadataEntry, Photo, Report, ReportStatus, ReportType, StructuredKey,
    },
    persistence::{KeyValueStore, Persistence},
    photos::PhotoPool,
    placement::{self, array_move, DragEvent, Placement},
    sections::COVER_SECTION,
    templates::{TemplateProvider, TemplateSet},
    util::{new_id, now_millis, today_iso_date},
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("report not found: {0}")]
    NotFound(String),
    #[error("no active report")]
    NoActiveReport,
    #[error("invalid patch for {key}: {reason}")]
    InvalidPatch { key: String, reason: String },
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Storage(err)
    }
}

/// Top-level scalar fields to merge; `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataPatch {
    pub property_address: Option<String>,
    pub client_name: Option<String>,
    pub inspection_date: Option<String>,
    pub rics_number: Option<String>,
    pub status: Option<ReportStatus>,
    pub include_valuation: Option<bool>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        *self == MetadataPatch::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SectionPatch {
    pub content: Option<String>,
    /// `Some(None)` clears the rating.
    #[serde(deserialize_with = "present")]
    pub rating: Option<Option<ConditionRating>>,
    pub photos: Option<Vec<Photo>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

pub struct ReportStore<S: KeyValueStore> {
    persistence: Persistence<S>,
    provider: Box<dyn TemplateProvider>,
    clock: Box<dyn Clock>,
    autosave: Debouncer,
    active: Option<Report>,
    templates: Option<TemplateSet>,
    active_section: String,
    pool: PhotoPool,
    write_failed: bool,
}

impl<S: KeyValueStore> ReportStore<S> {
    pub fn new(
        persistence: Persistence<S>,
        provider: Box<dyn TemplateProvider>,
        debounce: Duration,
    ) -> Result<Self, StoreError> {
        let pool = persistence.load_pool()?;
        debug!(photos = pool.len(), "photo library loaded");
        Ok(Self {
            persistence,
            provider,
            clock: Box::new(SystemClock),
            autosave: Debouncer::new(debounce),
            active: None,
            templates: None,
            active_section: COVER_SECTION.to_string(),
            pool,
            write_failed: false,
        })
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn active(&self) -> Option<&Report> {
        self.active.as_ref()
    }

    /// Template set for the open report's type.
    pub fn templates(&self) -> Option<&TemplateSet> {
        self.templates.as_ref()
    }

    pub fn pool(&self) -> &PhotoPool {
        &self.pool
    }

    pub fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    pub fn active_section(&self) -> &str {
        &self.active_section
    }

    pub fn select_section(&mut self, section_id: &str) {
        self.active_section = section_id.to_string();
    }

    pub fn list_reports(&self) -> Result<Vec<MetadataEntry>, StoreError> {
        Ok(self.persistence.list()?)
    }

    pub fn create_report(&mut self, report_type: ReportType) -> &Report {
        self.flush_before_switch();
        let report = Report::new(new_id(), report_type, &today_iso_date());
        info!(id = %report.id, report_type = %report_type, "report created");
        self.templates = Some(self.provider.template_set(report_type));
        self.active_section = COVER_SECTION.to_string();
        self.write_failed = false;
        self.autosave.schedule(self.clock.now());
        self.active.insert(report)
    }

    pub fn load_report(&mut self, id: &str) -> Result<&Report, StoreError> {
        let Some(report) = self.persistence.load(id)? else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        if self.active.as_ref().is_some_and(|r| r.id != id) {
            self.flush_before_switch();
        }
        info!(id = %report.id, report_type = %report.report_type, "report loaded");
        self.templates = Some(self.provider.template_set(report.report_type));
        self.active_section = COVER_SECTION.to_string();
        self.autosave.cancel();
        self.write_failed = false;
        Ok(self.active.insert(report))
    }

    pub fn update_metadata(&mut self, patch: MetadataPatch) -> Result<(), StoreError> {
        let report = self.active_mut()?;
        if let Some(v) = patch.property_address {
            report.property_address = v;
        }
        if let Some(v) = patch.client_name {
            report.client_name = v;
        }
        if let Some(v) = patch.inspection_date {
            report.inspection_date = v;
        }
        if let Some(v) = patch.rics_number {
            report.rics_number = v;
        }
        if let Some(v) = patch.status {
            report.status = v;
        }
        if let Some(v) = patch.include_valuation {
            report.include_valuation = v;
        }
        self.touch();
        Ok(())
    }

    /// Merge into the section's entry, creating it first if absent.
    pub fn update_section(&mut self, section_id: &str, patch: SectionPatch) -> Result<(), StoreError> {
        let report = self.active_mut()?;
        if let Some(photos) = &patch.photos {
            for photo in photos {
                report.register_photo(photo);
            }
        }
        let entry = report.section_mut(section_id);
        if let Some(content) = patch.content {
            entry.content = content;
        }
        if let Some(rating) = patch.rating {
            entry.rating = rating;
        }
        if let Some(photos) = patch.photos {
            entry.photos = photos.into_iter().map(|p| p.id).collect();
            report.prune_photos();
        }
        self.touch();
        Ok(())
    }

    /// Merge a JSON object into a bespoke section record, one level deep.
    pub fn update_structured_section(
        &mut self,
        key: StructuredKey,
        patch: &Value,
    ) -> Result<(), StoreError> {
        let Value::Object(fields) = patch else {
            return Err(StoreError::InvalidPatch {
                key: key.field_name().to_string(),
                reason: "patch must be a JSON object".to_string(),
            });
        };
        let report = self.active_mut()?;
        report
            .merge_structured(key, fields)
            .map_err(|e| StoreError::InvalidPatch {
                key: key.field_name().to_string(),
                reason: e.to_string(),
            })?;
        self.touch();
        Ok(())
    }

    /// Remove a report and its index entry. Unknown ids are not an error.
    pub fn delete_report(&mut self, id: &str) -> Result<(), StoreError> {
        let existed = self.persistence.delete(id)?;
        if self.active.as_ref().is_some_and(|r| r.id == id) {
            self.active = None;
            self.templates = None;
            self.autosave.cancel();
            self.write_failed = false;
        }
        info!(id, existed, "report deleted");
        Ok(())
    }

    /// Listing-view status change: rewrites the stored record and index entry
    /// immediately and keeps the open report in step.
    pub fn set_status(&mut self, id: &str, status: ReportStatus) -> Result<(), StoreError> {
        self.persistence.set_status(id, status)?;
        if let Some(report) = self.active.as_mut().filter(|r| r.id == id) {
            report.status = status;
            self.touch();
        }
        info!(id, status = %status, "status changed");
        Ok(())
    }

    /// Upload straight into a section. The photo also joins the library.
    pub fn add_section_photo(&mut self, section_id: &str, photo: Photo) -> Result<(), StoreError> {
        let report = self.active_mut()?;
        report.register_photo(&photo);
        report.section_mut(section_id).photos.push(photo.id.clone());
        self.pool.add(photo);
        self.persistence.save_pool(&self.pool)?;
        self.touch();
        Ok(())
    }

    /// Take a photo off one section. The library copy is untouched.
    pub fn remove_section_photo(&mut self, section_id: &str, photo_id: &str) -> Result<(), StoreError> {
        let report = self.active_mut()?;
        report.section_mut(section_id).photos.retain(|id| id != photo_id);
        report.prune_photos();
        self.touch();
        Ok(())
    }

    pub fn remove_cover_photo(&mut self) -> Result<(), StoreError> {
        let report = self.active_mut()?;
        report.cover_photo = None;
        report.prune_photos();
        self.touch();
        Ok(())
    }

    pub fn import_photos(
        &mut self,
        cfg: &Config,
        paths: &[impl AsRef<Path>],
    ) -> Result<Vec<Photo>, StoreError> {
        let added = self.pool.import_files(cfg, paths);
        if !added.is_empty() {
            self.persistence.save_pool(&self.pool)?;
        }
        Ok(added)
    }

    pub fn remove_pool_photo(&mut self, id: &str) -> Result<Option<Photo>, StoreError> {
        let removed = self.pool.remove(id);
        if removed.is_some() {
            self.persistence.save_pool(&self.pool)?;
        }
        Ok(removed)
    }

    /// Resolve a drag gesture against the active section and apply it.
    pub fn apply_drag(&mut self, event: &DragEvent) -> Result<Placement, StoreError> {
        let report = self.active.as_ref().ok_or(StoreError::NoActiveReport)?;
        let placement = placement::resolve(report, &self.pool, &self.active_section, event);
        if let Placement::Ignored { reason } = placement {
            debug!(?reason, active = %event.active, over = ?event.over, "drag ignored");
            return Ok(placement);
        }
        let report = self.active_mut()?;
        match &placement {
            Placement::Reorder { section, from, to } => {
                array_move(&mut report.section_mut(section).photos, *from, *to);
            }
            Placement::SetCover { photo } => {
                report.register_photo(photo);
                report.cover_photo = Some(photo.id.clone());
                report.prune_photos();
            }
            Placement::Assign { section, photo } => {
                report.register_photo(photo);
                report.section_mut(section).photos.push(photo.id.clone());
            }
            Placement::Ignored { .. } => {}
        }
        debug!(?placement, "drag applied");
        self.touch();
        Ok(placement)
    }

    pub fn save_status(&self) -> SaveStatus {
        if self.autosave.is_pending() {
            SaveStatus::Saving
        } else if self.write_failed {
            SaveStatus::Unsaved
        } else {
            SaveStatus::Saved
        }
    }

    /// Write the open report if its debounce deadline has passed.
    pub fn poll_autosave(&mut self) -> Result<bool, StoreError> {
        if !self.autosave.take_due(self.clock.now()) {
            return Ok(false);
        }
        self.write_active()?;
        Ok(true)
    }

    /// Write now if anything is pending or the last write failed.
    pub fn flush(&mut self) -> Result<bool, StoreError> {
        if !self.autosave.is_pending() && !self.write_failed {
            return Ok(false);
        }
        self.autosave.cancel();
        self.write_active()?;
        Ok(true)
    }

    fn flush_before_switch(&mut self) {
        if let Err(e) = self.flush() {
            warn!("pending changes of the previous report were not saved: {e}");
        }
    }

    fn active_mut(&mut self) -> Result<&mut Report, StoreError> {
        self.active.as_mut().ok_or(StoreError::NoActiveReport)
    }

    fn touch(&mut self) {
        self.autosave.schedule(self.clock.now());
    }

    fn write_active(&mut self) -> Result<(), StoreError> {
        let Some(report) = self.active.as_ref() else {
            return Ok(());
        };
        match self.persistence.save(report, now_millis()) {
            Ok(entry) => {
                self.write_failed = false;
                info!(id = %entry.id, status = %entry.status, "autosave written");
                Ok(())
            }
            Err(e) => {
                self.write_failed = true;
                error!(id = %report.id, "autosave failed: {e:#}");
                Err(e.into())
            }
        }
    }
}
