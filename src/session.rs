//! Replays an editing session from a JSON-lines script.
//!
//! Each line is one [`Action`], the same discrete events an interactive editor
//! would produce (keystrokes, clicks, drops). Time only moves on `wait`, so a
//! script exercises the autosave debounce deterministically.

use crate::{
    autosave::ManualClock,
    config::Config,
    model::{ReportStatus, ReportType, StructuredKey},
    persistence::KeyValueStore,
    placement::DragEvent,
    store::{MetadataPatch, ReportStore, SectionPatch, StoreError},
    templates::append_auto_text,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    Create {
        #[serde(rename = "type")]
        report_type: ReportType,
    },
    Open {
        id: String,
    },
    Metadata {
        #[serde(flatten)]
        patch: MetadataPatch,
    },
    Section {
        section: String,
        #[serde(flatten)]
        patch: SectionPatch,
    },
    /// Append the n-th auto-text snippet for `key` to a section's content.
    AutoText {
        section: String,
        key: String,
        index: usize,
    },
    Structured {
        key: StructuredKey,
        patch: serde_json::Value,
    },
    SelectSection {
        section: String,
    },
    Drag(DragEvent),
    ImportPhotos {
        paths: Vec<PathBuf>,
    },
    RemoveLibraryPhoto {
        id: String,
    },
    RemoveSectionPhoto {
        section: String,
        photo_id: String,
    },
    RemoveCoverPhoto,
    Status {
        id: String,
        status: ReportStatus,
    },
    Delete {
        id: String,
    },
    Wait {
        ms: u64,
    },
    Flush,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub actions: usize,
    pub ignored: usize,
    pub writes: usize,
    pub active_report: Option<String>,
}

pub struct Session<'a, S: KeyValueStore> {
    store: &'a mut ReportStore<S>,
    clock: ManualClock,
    cfg: &'a Config,
    summary: SessionSummary,
}

impl<'a, S: KeyValueStore> Session<'a, S> {
    /// `clock` must be the clock the store was built with.
    pub fn new(store: &'a mut ReportStore<S>, clock: ManualClock, cfg: &'a Config) -> Self {
        Self {
            store,
            clock,
            cfg,
            summary: SessionSummary::default(),
        }
    }

    pub fn run<R: BufRead>(mut self, script: R) -> Result<SessionSummary> {
        for (lineno, line) in script.lines().enumerate() {
            let line = line.with_context(|| "reading session script")?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let action: Action = serde_json::from_str(trimmed)
                .with_context(|| format!("parsing action on line {}", lineno + 1))?;
            self.apply(action)
                .with_context(|| format!("applying action on line {}", lineno + 1))?;
        }

        if self.store.flush()? {
            self.summary.writes += 1;
        }
        self.summary.active_report = self.store.active().map(|r| r.id.clone());
        info!(
            actions = self.summary.actions,
            ignored = self.summary.ignored,
            writes = self.summary.writes,
            "session finished"
        );
        Ok(self.summary)
    }

    pub fn apply(&mut self, action: Action) -> Result<()> {
        debug!(?action, "action");
        self.summary.actions += 1;
        let outcome = match action {
            Action::Create { report_type } => {
                self.store.create_report(report_type);
                Ok(())
            }
            Action::Open { id } => self.store.load_report(&id).map(|_| ()),
            Action::Metadata { patch } => self.store.update_metadata(patch),
            Action::Section { section, patch } => self.store.update_section(&section, patch),
            Action::AutoText {
                section,
                key,
                index,
            } => self.auto_text(&section, &key, index),
            Action::Structured { key, patch } => self.store.update_structured_section(key, &patch),
            Action::SelectSection { section } => {
                self.store.select_section(&section);
                Ok(())
            }
            Action::Drag(event) => self.store.apply_drag(&event).map(|placement| {
                if placement.is_ignored() {
                    self.summary.ignored += 1;
                }
            }),
            Action::ImportPhotos { paths } => {
                self.store.import_photos(self.cfg, paths.as_slice()).map(|_| ())
            }
            Action::RemoveLibraryPhoto { id } => self.store.remove_pool_photo(&id).map(|_| ()),
            Action::RemoveSectionPhoto { section, photo_id } => {
                self.store.remove_section_photo(&section, &photo_id)
            }
            Action::RemoveCoverPhoto => self.store.remove_cover_photo(),
            Action::Status { id, status } => self.store.set_status(&id, status),
            Action::Delete { id } => self.store.delete_report(&id),
            Action::Wait { ms } => {
                self.clock.advance(Duration::from_millis(ms));
                Ok(())
            }
            Action::Flush => self.store.flush().map(|wrote| {
                if wrote {
                    self.summary.writes += 1;
                }
            }),
        };

        match outcome {
            Ok(()) => {}
            Err(StoreError::NoActiveReport) => {
                debug!("no active report; action ignored");
                self.summary.ignored += 1;
            }
            Err(StoreError::NotFound(id)) => {
                warn!("report not found: {id}");
                self.summary.ignored += 1;
            }
            Err(e) => return Err(e.into()),
        }

        if self.store.poll_autosave()? {
            self.summary.writes += 1;
        }
        Ok(())
    }

    fn auto_text(&mut self, section: &str, key: &str, index: usize) -> Result<(), StoreError> {
        let Some(report) = self.store.active() else {
            return Err(StoreError::NoActiveReport);
        };
        let snippet = self
            .store
            .templates()
            .and_then(|t| t.get(key).get(index))
            .cloned()
            .ok_or_else(|| StoreError::InvalidPatch {
                key: key.to_string(),
                reason: format!("no auto-text snippet at index {index}"),
            })?;
        let content = append_auto_text(&report.section(section).content, &snippet);
        self.store.update_section(
            section,
            SectionPatch {
                content: Some(content),
                ..Default::default()
            },
        )
    }
}
