use crate::{
    autosave::ManualClock,
    config::Config,
    export::export_report,
    model::{ConditionRating, ReportStatus, ReportType, StructuredKey},
    persistence::{FileStore, Persistence},
    placement::DragEvent,
    session::Session,
    store::{MetadataPatch, ReportStore, SectionPatch},
    templates::{append_auto_text, TemplateCatalog, TemplateProvider},
    util::{ensure_dir, now_rfc3339},
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "survey-desk")]
#[command(about = "Local-first RICS home survey report authoring (sections, photos, autosave, export)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./survey-desk.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a new report and save it.
    New {
        #[arg(long, default_value = "level3")]
        r#type: ReportType,
    },
    /// List saved reports, most recently saved first.
    List {},
    Show {
        id: String,
        /// Print only one bespoke section record.
        #[arg(long)]
        structured: Option<StructuredKey>,
    },
    /// Update top-level report fields.
    Set {
        id: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        rics: Option<String>,
        #[arg(long)]
        status: Option<ReportStatus>,
        #[arg(long)]
        valuation: Option<bool>,
    },
    /// Edit a section's generic entry.
    Section {
        id: String,
        section: String,
        #[arg(long)]
        content: Option<String>,
        /// 1, 2 or 3; "none" clears the rating.
        #[arg(long)]
        rating: Option<String>,
        /// Append an auto-text snippet: `--auto-text <key>:<index>`.
        #[arg(long)]
        auto_text: Option<String>,
    },
    /// Merge a JSON object into a bespoke section record.
    Structured {
        id: String,
        key: StructuredKey,
        json: String,
    },
    #[command(subcommand)]
    Photos(PhotosCommand),
    /// Drop a photo onto a section, the cover slot, or another photo.
    Place {
        id: String,
        /// Dragged photo id.
        active: String,
        /// Drop target id (section title, "Front Cover" or photo id).
        over: String,
        /// Section whose photo list is on screen.
        #[arg(long, default_value = "Front Cover")]
        section: String,
    },
    /// Remove a photo from one section, or from the cover with "Front Cover".
    Unplace {
        id: String,
        section: String,
        photo_id: String,
    },
    Status {
        id: String,
        status: ReportStatus,
    },
    Delete {
        id: String,
    },
    /// Print the auto-text snippets for a report type.
    Templates {
        #[arg(long, default_value = "level3")]
        r#type: ReportType,
        #[arg(long)]
        key: Option<String>,
    },
    Export {
        id: String,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Replay a JSON-lines editing session.
    Session {
        script: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum PhotosCommand {
    /// Add image files to the shared photo library.
    Import { files: Vec<PathBuf> },
    List {},
    Remove { photo_id: String },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref())? {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::New { r#type } => new_report(&cfg, *r#type),
        Command::List {} => list(&cfg),
        Command::Show { id, structured } => show(&cfg, id, *structured),
        Command::Set {
            id,
            address,
            client,
            date,
            rics,
            status,
            valuation,
        } => {
            let patch = MetadataPatch {
                property_address: address.clone(),
                client_name: client.clone(),
                inspection_date: date.clone(),
                rics_number: rics.clone(),
                status: *status,
                include_valuation: *valuation,
            };
            if patch.is_empty() {
                warn!("nothing to update");
                return Ok(());
            }
            edit(&cfg, id, |store| Ok(store.update_metadata(patch)?))
        }
        Command::Section {
            id,
            section,
            content,
            rating,
            auto_text,
        } => edit_section(&cfg, id, section, content.as_deref(), rating.as_deref(), auto_text.as_deref()),
        Command::Structured { id, key, json } => {
            let patch: serde_json::Value =
                serde_json::from_str(json).with_context(|| "parsing structured patch JSON")?;
            edit(&cfg, id, |store| Ok(store.update_structured_section(*key, &patch)?))
        }
        Command::Photos(cmd) => photos(&cfg, cmd),
        Command::Place {
            id,
            active,
            over,
            section,
        } => edit(&cfg, id, |store| {
            store.select_section(section);
            let report_type = store
                .active()
                .map(|r| r.report_type)
                .ok_or_else(|| anyhow!("report not open: {id}"))?;
            if crate::sections::is_known_section(report_type, over)
                && !crate::sections::allows_photos(report_type, over)
            {
                warn!("{over:?} does not normally carry photos");
            }
            let placement = store.apply_drag(&DragEvent::new(active.as_str(), over.as_str()))?;
            println!("{}", serde_json::to_string_pretty(&placement)?);
            Ok(())
        }),
        Command::Unplace {
            id,
            section,
            photo_id,
        } => edit(&cfg, id, |store| {
            if section == crate::sections::COVER_SECTION {
                let is_cover = store
                    .active()
                    .is_some_and(|r| r.cover_photo.as_deref() == Some(photo_id.as_str()));
                if !is_cover {
                    return Err(anyhow!("{photo_id} is not the cover photo"));
                }
                Ok(store.remove_cover_photo()?)
            } else {
                Ok(store.remove_section_photo(section, photo_id)?)
            }
        }),
        Command::Status { id, status } => {
            let mut store = open_store(&cfg)?;
            store.set_status(id, *status)?;
            Ok(())
        }
        Command::Delete { id } => {
            let mut store = open_store(&cfg)?;
            store.delete_report(id)?;
            Ok(())
        }
        Command::Templates { r#type, key } => templates(&cfg, *r#type, key.as_deref()),
        Command::Export { id, out_dir } => export(&cfg, id, out_dir.as_deref()),
        Command::Session { script } => session(&cfg, script),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(p) = user {
        return Ok(Some(p.to_path_buf()));
    }
    let default = PathBuf::from("survey-desk.toml");
    if default.exists() {
        return Ok(Some(default));
    }
    let example = PathBuf::from("survey-desk.example.toml");
    if example.exists() {
        Ok(Some(example))
    } else {
        Ok(None)
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.paths.data_dir).join("survey-desk.log"))
}

fn template_provider(cfg: &Config) -> Result<Box<dyn TemplateProvider>> {
    let catalog = if cfg.templates.path.is_empty() {
        TemplateCatalog::builtin()?
    } else {
        TemplateCatalog::load(Path::new(&cfg.templates.path))?
    };
    Ok(Box::new(catalog))
}

fn open_store(cfg: &Config) -> Result<ReportStore<FileStore>> {
    let backend = FileStore::open(Path::new(&cfg.paths.data_dir))?;
    let store = ReportStore::new(
        Persistence::new(backend),
        template_provider(cfg)?,
        cfg.autosave.delay(),
    )?;
    Ok(store)
}

/// Open the report, apply one edit and write it out before exiting.
fn edit<F>(cfg: &Config, id: &str, apply: F) -> Result<()>
where
    F: FnOnce(&mut ReportStore<FileStore>) -> Result<()>,
{
    let mut store = open_store(cfg)?;
    store.load_report(id)?;
    apply(&mut store)?;
    store.flush()?;
    info!(id, status = ?store.save_status(), "edit saved");
    Ok(())
}

fn new_report(cfg: &Config, report_type: ReportType) -> Result<()> {
    let mut store = open_store(cfg)?;
    let id = store.create_report(report_type).id.clone();
    store.flush()?;
    println!("{id}");
    Ok(())
}

fn list(cfg: &Config) -> Result<()> {
    let store = open_store(cfg)?;
    let reports = store.list_reports()?;
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn show(cfg: &Config, id: &str, structured: Option<StructuredKey>) -> Result<()> {
    let mut store = open_store(cfg)?;
    let report = store.load_report(id)?;
    let out = match structured {
        Some(key) => report.structured_value(key)?,
        None => serde_json::to_value(report)?,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn edit_section(
    cfg: &Config,
    id: &str,
    section: &str,
    content: Option<&str>,
    rating: Option<&str>,
    auto_text: Option<&str>,
) -> Result<()> {
    let rating = match rating {
        None => None,
        Some("none") | Some("") => Some(None),
        Some(raw) => Some(Some(raw.parse::<ConditionRating>().map_err(|e| anyhow!(e))?)),
    };

    edit(cfg, id, |store| {
        let report = store.active().ok_or_else(|| anyhow!("report not open: {id}"))?;
        if !crate::sections::is_known_section(report.report_type, section) {
            warn!("{section:?} is not a section of a {} report", report.report_type.label());
        }
        if rating.is_some_and(|r| r.is_some())
            && !crate::sections::allows_ratings(report.report_type, section)
        {
            warn!("{section:?} does not normally carry a condition rating");
        }

        let mut next = content.map(str::to_string);
        if let Some(choice) = auto_text {
            let (key, index) = choice
                .rsplit_once(':')
                .ok_or_else(|| anyhow!("expected <key>:<index>, got {choice:?}"))?;
            let index: usize = index
                .parse()
                .with_context(|| format!("auto-text index: {index:?}"))?;
            let snippet = store
                .templates()
                .and_then(|t| t.get(key).get(index))
                .ok_or_else(|| anyhow!("no auto-text snippet {key:?} #{index}"))?;
            let base = next.unwrap_or_else(|| report.section(section).content);
            next = Some(append_auto_text(&base, snippet));
        }

        store.update_section(
            section,
            SectionPatch {
                content: next,
                rating,
                photos: None,
            },
        )?;
        Ok(())
    })
}

fn photos(cfg: &Config, cmd: &PhotosCommand) -> Result<()> {
    let mut store = open_store(cfg)?;
    match cmd {
        PhotosCommand::Import { files } => {
            let added = store.import_photos(cfg, files.as_slice())?;
            println!("{}", serde_json::to_string_pretty(&added)?);
        }
        PhotosCommand::List {} => {
            let photos: Vec<_> = store.pool().iter().collect();
            println!("{}", serde_json::to_string_pretty(&photos)?);
        }
        PhotosCommand::Remove { photo_id } => {
            if store.remove_pool_photo(photo_id)?.is_none() {
                warn!("photo not in library: {photo_id}");
            }
        }
    }
    Ok(())
}

fn templates(cfg: &Config, report_type: ReportType, key: Option<&str>) -> Result<()> {
    let set = template_provider(cfg)?.template_set(report_type);
    let keys: Vec<&str> = match key {
        Some(key) => vec![key],
        None => set.keys().collect(),
    };
    let out: serde_json::Map<String, serde_json::Value> = keys
        .into_iter()
        .map(|k| (k.to_string(), serde_json::json!(set.get(k))))
        .collect();
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn export(cfg: &Config, id: &str, out_override: Option<&Path>) -> Result<()> {
    let mut store = open_store(cfg)?;
    let report = store.load_report(id)?;
    let out_dir = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.export_dir));
    let output = export_report(cfg, report, &out_dir)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "id": id,
            "exported": now_rfc3339(),
            "markdown": output.markdown_path,
            "text": output.text_path,
        }))?
    );
    Ok(())
}

fn session(cfg: &Config, script: &Path) -> Result<()> {
    let file = std::fs::File::open(script)
        .with_context(|| format!("opening session script: {}", script.display()))?;
    let clock = ManualClock::new();
    let mut store = open_store(cfg)?.with_clock(Box::new(clock.clone()));
    let summary = Session::new(&mut store, clock, cfg).run(BufReader::new(file))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
