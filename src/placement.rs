//! Drag-and-drop resolution for photos.
//!
//! A gesture carries the dragged id (`active`) and the drop target id
//! (`over`). Depending on context either may be a photo id or a section /
//! cover-slot id. Resolution is evaluated in a fixed order: reorder inside the
//! active section, same-target no-op, then assignment from the pool.

use crate::{
    model::{Photo, Report},
    photos::PhotoPool,
    sections::COVER_SECTION,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragEvent {
    pub active: String,
    #[serde(default)]
    pub over: Option<String>,
}

impl DragEvent {
    pub fn new(active: impl Into<String>, over: impl Into<String>) -> Self {
        Self {
            active: active.into(),
            over: Some(over.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Placement {
    Reorder {
        section: String,
        from: usize,
        to: usize,
    },
    SetCover {
        photo: Photo,
    },
    Assign {
        section: String,
        photo: Photo,
    },
    Ignored {
        reason: IgnoreReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    NoTarget,
    SameTarget,
    AlreadyPlaced,
    UnknownSource,
}

impl Placement {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Placement::Ignored { .. })
    }
}

/// Decide what a drop means. Pure: nothing is mutated here.
pub fn resolve(
    report: &Report,
    pool: &PhotoPool,
    active_section: &str,
    event: &DragEvent,
) -> Placement {
    let Some(over) = event.over.as_deref() else {
        return Placement::Ignored {
            reason: IgnoreReason::NoTarget,
        };
    };

    if let Some(entry) = report.sections.get(active_section) {
        let from = entry.photos.iter().position(|id| *id == event.active);
        let to = entry.photos.iter().position(|id| id == over);
        if let (Some(from), Some(to)) = (from, to) {
            if from == to {
                return Placement::Ignored {
                    reason: IgnoreReason::SameTarget,
                };
            }
            return Placement::Reorder {
                section: active_section.to_string(),
                from,
                to,
            };
        }
    }

    if event.active == over {
        return Placement::Ignored {
            reason: IgnoreReason::SameTarget,
        };
    }

    let Some(photo) = pool.find(&event.active) else {
        return Placement::Ignored {
            reason: IgnoreReason::UnknownSource,
        };
    };

    if over == COVER_SECTION {
        return Placement::SetCover {
            photo: photo.clone(),
        };
    }

    let already_placed = report
        .sections
        .get(over)
        .is_some_and(|entry| entry.photos.iter().any(|id| *id == photo.id));
    if already_placed {
        return Placement::Ignored {
            reason: IgnoreReason::AlreadyPlaced,
        };
    }

    Placement::Assign {
        section: over.to_string(),
        photo: photo.clone(),
    }
}

/// Move one element from `from` to `to`; everything else keeps its relative
/// order. Out-of-range indices leave the list unchanged.
pub fn array_move<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from >= items.len() || to >= items.len() || from == to {
        return;
    }
    let item = items.remove(from);
    items.insert(to, item);
}
