use std::time::Duration;
use survey_desk::config::Config;

#[test]
fn parse_example_config() {
    let raw = include_str!("../survey-desk.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.autosave.delay(), Duration::from_millis(2000));
    assert!(!cfg.paths.data_dir.is_empty());
    assert!(cfg.photos.accepted_extensions.iter().any(|e| e == "heic"));
    assert_eq!(cfg.export.file_prefix, "RICS_Home_Survey_Report_");
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[autosave]\ndebounce_ms = 500\n").expect("parse TOML");
    assert_eq!(cfg.autosave.debounce_ms, 500);
    assert_eq!(cfg.paths.export_dir, "exports");
    assert!(cfg.export.write_markdown);
    assert_eq!(cfg.logging.level, "info");
}
