use crate::{config::Config, model::Photo};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// The shared photo library. Placing a photo into a report copies a reference;
/// the pool itself only changes on import and explicit removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoPool {
    photos: Vec<Photo>,
}

impl PhotoPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, id: &str) -> Option<&Photo> {
        self.photos.iter().find(|p| p.id == id)
    }

    pub fn add(&mut self, photo: Photo) {
        if self.find(&photo.id).is_none() {
            self.photos.push(photo);
        }
    }

    /// Discard a photo from the library. Reports that already reference it
    /// keep their own copy.
    pub fn remove(&mut self, id: &str) -> Option<Photo> {
        let idx = self.photos.iter().position(|p| p.id == id)?;
        Some(self.photos.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Photo> {
        self.photos.iter()
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    /// Wrap each accepted image file as a new photo and add it to the pool.
    /// Files with other extensions, over the size limit, or unreadable are
    /// skipped with a warning, so the pool only ever gains whole imports.
    pub fn import_files(&mut self, cfg: &Config, paths: &[impl AsRef<Path>]) -> Vec<Photo> {
        let mut added = Vec::new();
        for path in paths {
            let path = path.as_ref();
            if !is_accepted_image(cfg, path) {
                warn!("skipping non-image file: {}", path.display());
                continue;
            }
            let len = match std::fs::metadata(path) {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            if cfg.photos.max_file_bytes > 0 && len > cfg.photos.max_file_bytes {
                warn!(
                    "skipping {}: {} bytes exceeds max_file_bytes {}",
                    path.display(),
                    len,
                    cfg.photos.max_file_bytes
                );
                continue;
            }
            match file_url(path) {
                Ok(url) => added.push(Photo::new(url)),
                Err(e) => warn!("skipping {}: {e:#}", path.display()),
            }
        }
        self.photos.extend(added.iter().cloned());
        info!("imported {} of {} photo(s)", added.len(), paths.len());
        added
    }
}

fn is_accepted_image(cfg: &Config, path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    cfg.photos
        .accepted_extensions
        .iter()
        .any(|e| e.eq_ignore_ascii_case(&ext))
}

/// Locally resolvable reference for an image file.
pub fn file_url(path: &Path) -> Result<String> {
    let canon = path
        .canonicalize()
        .with_context(|| format!("canonicalize photo: {}", path.display()))?;
    Ok(format!("file://{}", canon.display()))
}
