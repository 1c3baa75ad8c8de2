use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub autosave: Autosave,
    #[serde(default)]
    pub photos: Photos,
    #[serde(default)]
    pub templates: Templates,
    #[serde(default)]
    pub export: Export,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    /// Directory backing the key-value store.
    pub data_dir: String,
    pub export_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            data_dir: ".survey-desk".into(),
            export_dir: "exports".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Autosave {
    pub debounce_ms: u64,
}
impl Default for Autosave {
    fn default() -> Self {
        Self { debounce_ms: 2000 }
    }
}
impl Autosave {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photos {
    pub accepted_extensions: Vec<String>,
    /// 0 disables the limit.
    pub max_file_bytes: u64,
}
impl Default for Photos {
    fn default() -> Self {
        Self {
            accepted_extensions: ["jpg", "jpeg", "png", "gif", "webp", "heic", "bmp", "tif", "tiff"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_file_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Templates {
    /// Optional TOML file replacing the built-in auto-text sets.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Export {
    pub write_markdown: bool,
    pub write_text: bool,
    pub file_prefix: String,
    pub include_photos: bool,
}
impl Default for Export {
    fn default() -> Self {
        Self {
            write_markdown: true,
            write_text: false,
            file_prefix: "RICS_Home_Survey_Report_".into(),
            include_photos: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
