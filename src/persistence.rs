use crate::{
    model::{MetadataEntry, Report, ReportStatus},
    photos::PhotoPool,
    util::{ensure_dir, sha256_hex},
};
use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const REPORT_KEY_PREFIX: &str = "report-data-";
pub const METADATA_INDEX_KEY: &str = "survey-reports-metadata";
pub const PHOTO_LIBRARY_KEY: &str = "photo-library";

pub fn report_key(id: &str) -> String {
    format!("{REPORT_KEY_PREFIX}{id}")
}

/// String-keyed, string-valued local store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// One file per key. File names are the SHA-256 of the key so any key is a
/// valid path component.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: &Path) -> Result<Self> {
        ensure_dir(root)?;
        debug!("file store at {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sha256_hex(key.as_bytes())))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {key} from {}", path.display())),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    writes: BTreeMap<String, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls made for `key` so far.
    pub fn writes_for(&self, key: &str) -> usize {
        self.writes.get(key).copied().unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        *self.writes.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Report records plus the listing index, over any [`KeyValueStore`].
pub struct Persistence<S: KeyValueStore> {
    backend: S,
}

impl<S: KeyValueStore> Persistence<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Upsert the report and move its index entry to the front.
    pub fn save(&mut self, report: &Report, last_modified: i64) -> Result<MetadataEntry> {
        self.put_json(&report_key(&report.id), report)?;

        let entry = report.metadata(last_modified);
        let mut index = self.list()?;
        index.retain(|e| e.id != report.id);
        index.insert(0, entry.clone());
        self.put_json(METADATA_INDEX_KEY, &index)?;

        debug!(id = %report.id, entries = index.len(), "report saved");
        Ok(entry)
    }

    /// Fields with the wrong shape read as defaults; only a record that is
    /// not a JSON object fails.
    pub fn load(&self, id: &str) -> Result<Option<Report>> {
        let key = report_key(id);
        let Some(raw) = self.backend.get(&key)? else {
            return Ok(None);
        };
        let report = Report::from_stored(&raw)
            .with_context(|| format!("parsing stored JSON for {key}"))?;
        Ok(Some(report))
    }

    /// Remove the record and its index entry. Returns whether either existed.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let key = report_key(id);
        let had_record = self.backend.get(&key)?.is_some();
        self.backend.remove(&key)?;

        let mut index = self.list()?;
        let before = index.len();
        index.retain(|e| e.id != id);
        let had_entry = index.len() != before;
        if had_entry {
            self.put_json(METADATA_INDEX_KEY, &index)?;
        }
        Ok(had_record || had_entry)
    }

    /// The listing index, most recently saved first. A missing or unreadable
    /// index reads as empty.
    pub fn list(&self) -> Result<Vec<MetadataEntry>> {
        let Some(raw) = self.backend.get(METADATA_INDEX_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!("metadata index unreadable, treating as empty: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Change a stored report's status without touching `lastModified` or the
    /// index order. Returns the updated record, if one was stored.
    pub fn set_status(&mut self, id: &str, status: ReportStatus) -> Result<Option<Report>> {
        let updated = match self.load(id)? {
            Some(mut report) => {
                report.status = status;
                self.put_json(&report_key(id), &report)?;
                Some(report)
            }
            None => None,
        };

        let mut index = self.list()?;
        let mut touched = false;
        for entry in index.iter_mut().filter(|e| e.id == id) {
            entry.status = status;
            touched = true;
        }
        if touched {
            self.put_json(METADATA_INDEX_KEY, &index)?;
        }
        Ok(updated)
    }

    pub fn load_pool(&self) -> Result<PhotoPool> {
        Ok(self.get_json(PHOTO_LIBRARY_KEY)?.unwrap_or_default())
    }

    pub fn save_pool(&mut self, pool: &PhotoPool) -> Result<()> {
        self.put_json(PHOTO_LIBRARY_KEY, pool)
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.backend.get(key)? else {
            return Ok(None);
        };
        let value =
            serde_json::from_str(&raw).with_context(|| format!("parsing stored JSON for {key}"))?;
        Ok(Some(value))
    }

    fn put_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, &raw)
    }
}
